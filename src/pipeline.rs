//! Pipeline orchestration
//!
//! This module provides the public API for flux-cohort. It drives every stage
//! for each individual of each configured cohort and writes the resulting
//! tables and a run summary.
//!
//! Output layout:
//!
//! ```text
//! <out>/cohorts/<cohort>.csv
//! <out>/cohorts/<cohort>/individuals/<student>.csv
//! <out>/cohorts/<cohort>/student_labels.csv
//! <out>/cohorts/<cohort>/reshaped[_day|_night].csv
//! <out>/corpus.csv
//! <out>/corpus_student_labels.csv
//! <out>/corpus_reshaped[_day|_night].csv
//! <out>/run_summary.json
//! ```
//!
//! The day and night tables are only written for half-day buckets.

use crate::aggregator::{Aggregator, CohortOrder};
use crate::aligner::Aligner;
use crate::config::{CohortSpec, PipelineConfig};
use crate::encoder::CsvEncoder;
use crate::error::PipelineError;
use crate::imputer::{FillReport, GapFiller};
use crate::labeler::{Labeler, StudentLabel};
use crate::reshape::{Reshaper, TimeOfDay};
use crate::resampler::Resampler;
use crate::schema::{ExportLoader, IndividualSources, MissingSource};
use crate::table::{CohortTable, CorpusTable, TableSchema};
use crate::types::{BucketWidth, IndividualTimeline, TimeGrid, TimelineRow};
use crate::FLUX_COHORT_VERSION;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the run summary written next to the tables
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Folder holding one table and one folder per cohort
pub const COHORTS_DIR: &str = "cohorts";

/// Folder of per-individual timelines inside a cohort folder
pub const INDIVIDUALS_DIR: &str = "individuals";

/// An individual left out of its cohort table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedIndividual {
    pub student_id: String,
    pub reason: String,
}

/// A source that was not found for one individual
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingSourceRecord {
    pub student_id: String,
    pub source: MissingSource,
}

/// What happened to one cohort during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortReport {
    pub cohort: String,
    pub processed: Vec<String>,
    pub skipped: Vec<SkippedIndividual>,
    pub missing_sources: Vec<MissingSourceRecord>,
    /// Cells written by mean imputation
    pub imputed_cells: usize,
}

impl CohortReport {
    /// Move a processed individual to the skipped list
    fn record_skipped(&mut self, student_id: &str, err: &PipelineError) {
        self.processed.retain(|id| id != student_id);
        self.missing_sources.retain(|record| record.student_id != student_id);
        self.skipped.push(SkippedIndividual {
            student_id: student_id.to_string(),
            reason: err.to_string(),
        });
    }
}

/// Outcome of processing one cohort
#[derive(Debug, Clone)]
pub struct CohortOutcome {
    pub timelines: Vec<IndividualTimeline>,
    pub report: CohortReport,
}

/// Machine-readable record of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parameters: PipelineConfig,
    pub cohorts: Vec<CohortReport>,
    /// Configured cohorts whose input folder was not found
    pub missing_cohorts: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

/// Batch pipeline built from one configuration
pub struct Pipeline {
    config: PipelineConfig,
    order: CohortOrder,
    aligner: Aligner,
    labeler: Labeler,
    reshaper: Reshaper,
    loader: ExportLoader,
    encoder: CsvEncoder,
}

impl Pipeline {
    /// # Errors
    /// Any configuration defect reported by [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            order: config.cohort_order()?,
            aligner: Aligner::new()
                .with_boundary(config.survey_boundary)
                .with_non_wear_threshold(config.non_wear_step_threshold),
            labeler: Labeler::new(config.depression_threshold)?,
            reshaper: Reshaper::new(config.reshape_steps),
            loader: ExportLoader::new(config.skip_patterns.clone()),
            encoder: CsvEncoder::new(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cohort_order(&self) -> &CohortOrder {
        &self.order
    }

    /// Resample, align, fill and label one individual.
    ///
    /// Pure: the same sources and grid always give the same timeline.
    pub fn process_individual(
        &self,
        grid: &TimeGrid,
        sources: &IndividualSources,
    ) -> Result<(IndividualTimeline, FillReport), PipelineError> {
        let resampled = Resampler::resample_streams(grid, &sources.features);

        let mut timeline =
            self.aligner
                .merge(&sources.student_id, grid, &resampled, &sources.survey)?;
        let report = GapFiller::fill(&mut timeline);
        self.labeler.label_rows(timeline.rows.iter_mut());

        Ok((timeline, report))
    }

    /// Load and process every student folder of a cohort.
    ///
    /// Failures of a single individual are logged and recorded; configuration
    /// errors abort the cohort.
    pub fn process_cohort(
        &self,
        cohort: &CohortSpec,
        cohort_dir: &Path,
    ) -> Result<CohortOutcome, PipelineError> {
        let span = tracing::info_span!("cohort", cohort = %cohort.name);
        let _guard = span.enter();

        let grid = cohort.grid(self.config.bucket_width)?;
        let mut report = CohortReport {
            cohort: cohort.name.clone(),
            ..Default::default()
        };
        let mut timelines = Vec::new();

        for student_dir in self.loader.discover_individuals(cohort_dir)? {
            let result = self
                .loader
                .load_individual(&student_dir)
                .and_then(|sources| {
                    let (timeline, fill) = self.process_individual(&grid, &sources)?;
                    Ok((sources, timeline, fill))
                });

            match result {
                Ok((sources, timeline, fill)) => {
                    report.missing_sources.extend(sources.missing.into_iter().map(|source| {
                        MissingSourceRecord {
                            student_id: sources.student_id.clone(),
                            source,
                        }
                    }));
                    report.imputed_cells += fill.filled;
                    report.processed.push(timeline.student_id.clone());
                    timelines.push(timeline);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let student_id = student_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    tracing::warn!(student = %student_id, error = %err, "skipping individual");
                    report.skipped.push(SkippedIndividual {
                        student_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            "cohort processed"
        );
        Ok(CohortOutcome { timelines, report })
    }

    /// Process every configured cohort under `input_root` and write all
    /// tables to `output_root`.
    pub fn run(&self, input_root: &Path, output_root: &Path) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, input = %input_root.display(), "starting run");

        fs::create_dir_all(output_root)?;
        let strategy = self.config.label_strategy;
        let schema = TableSchema::standard();
        let mut outputs = Vec::new();
        let mut reports = Vec::new();
        let mut missing_cohorts = Vec::new();
        let mut tables = Vec::new();

        for cohort in &self.config.cohorts {
            let cohort_dir = input_root.join(&cohort.name);
            if !cohort_dir.is_dir() {
                tracing::warn!(cohort = %cohort.name, "cohort folder not found");
                missing_cohorts.push(cohort.name.clone());
                continue;
            }

            let CohortOutcome {
                timelines,
                mut report,
            } = self.process_cohort(cohort, &cohort_dir)?;
            let cohorts_out = output_root.join(COHORTS_DIR);
            let cohort_out = cohorts_out.join(&cohort.name);

            let mut written = Vec::new();
            for timeline in timelines {
                let path = cohort_out
                    .join(INDIVIDUALS_DIR)
                    .join(format!("{}.csv", timeline.student_id));
                let result = create_file(&path).and_then(|file| {
                    self.encoder
                        .write_timeline(&cohort.name, &schema, &timeline, file)
                });
                match result {
                    Ok(()) => {
                        outputs.push(path);
                        written.push(timeline);
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        tracing::warn!(
                            cohort = %cohort.name,
                            student = %timeline.student_id,
                            error = %err,
                            "skipping individual"
                        );
                        report.record_skipped(&timeline.student_id, &err);
                    }
                }
            }

            let table = Aggregator::assemble_cohort(&cohort.name, written, schema.clone());
            outputs.push(self.write_cohort_tables(&table, &cohorts_out)?);
            let labels = self.labeler.summarize(table.iter_rows(), strategy);
            outputs.extend(self.write_label_tables(
                &labels,
                table.iter_rows(),
                &cohort_out.join("student_labels.csv"),
                &cohort_out.join("reshaped.csv"),
            )?);
            outputs.extend(self.write_time_of_day_tables(
                &labels,
                || table.iter_rows(),
                &cohort_out,
                "reshaped",
            )?);

            reports.push(report);
            tables.push(table);
        }

        let corpus = Aggregator::aggregate(tables, &self.order)?;
        let corpus_path = output_root.join("corpus.csv");
        self.encoder
            .write_rows(&corpus.schema, corpus.iter_rows(), create_file(&corpus_path)?)?;
        outputs.push(corpus_path);

        let mut labels = self.labeler.summarize(corpus.iter_rows(), strategy);
        Aggregator::sort_student_labels(&mut labels, &self.order)?;
        outputs.extend(self.write_label_tables(
            &labels,
            corpus.iter_rows(),
            &output_root.join("corpus_student_labels.csv"),
            &output_root.join("corpus_reshaped.csv"),
        )?);
        outputs.extend(self.write_time_of_day_tables(
            &labels,
            || corpus.iter_rows(),
            output_root,
            "corpus_reshaped",
        )?);

        let summary = RunSummary {
            run_id,
            version: FLUX_COHORT_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            parameters: self.config.clone(),
            cohorts: reports,
            missing_cohorts,
            outputs,
        };
        let summary_path = output_root.join(RUN_SUMMARY_FILE);
        let mut writer = create_file(&summary_path)?;
        serde_json::to_writer_pretty(&mut writer, &summary)?;
        writer.flush()?;
        tracing::info!(%run_id, path = %summary_path.display(), "run finished");

        Ok(summary)
    }

    fn write_cohort_tables(
        &self,
        table: &CohortTable,
        cohorts_out: &Path,
    ) -> Result<PathBuf, PipelineError> {
        let path = cohorts_out.join(format!("{}.csv", table.cohort));
        self.encoder
            .write_rows(&table.schema, table.iter_rows(), create_file(&path)?)?;
        tracing::debug!(path = %path.display(), rows = table.rows.len(), "wrote cohort table");
        Ok(path)
    }

    fn write_label_tables<'a>(
        &self,
        labels: &[StudentLabel],
        rows: impl Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
        labels_path: &Path,
        wide_path: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let strategy = self.config.label_strategy;
        self.encoder
            .write_student_labels(labels, strategy, create_file(labels_path)?)?;

        let wide = self.reshaper.reshape(rows, labels, &self.order)?;
        self.encoder.write_wide(
            &wide,
            strategy,
            self.reshaper.steps(),
            create_file(wide_path)?,
        )?;
        Ok(vec![labels_path.to_path_buf(), wide_path.to_path_buf()])
    }

    /// Day and night wide tables, written as `<stem>_day.csv` and
    /// `<stem>_night.csv` for half-day buckets only
    fn write_time_of_day_tables<'a, I>(
        &self,
        labels: &[StudentLabel],
        rows: impl Fn() -> I,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, PipelineError>
    where
        I: Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
    {
        if self.config.bucket_width != BucketWidth::HALF_DAY {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for part in TimeOfDay::ALL {
            let path = dir.join(format!("{}_{}.csv", stem, part));
            let wide = self
                .reshaper
                .reshape_time_of_day(rows(), labels, &self.order, part)?;
            self.encoder.write_wide(
                &wide,
                self.config.label_strategy,
                self.reshaper.steps(),
                create_file(&path)?,
            )?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Recompute the label columns of a stored table and write it to `output`.
/// Returns the number of labelled rows.
pub fn relabel_file(input: &Path, output: &Path, labeler: &Labeler) -> Result<usize, PipelineError> {
    let encoder = CsvEncoder::new();
    let mut table = encoder.read_table(BufReader::new(open_file(input)?))?;
    let labelled = labeler.relabel_corpus(&mut table);
    encoder.write_rows(&table.schema, table.iter_rows(), create_file(output)?)?;
    tracing::info!(path = %output.display(), labelled, "relabelled table");
    Ok(labelled)
}

/// Concatenate stored cohort tables into one corpus table at `output`
pub fn aggregate_files(
    inputs: &[PathBuf],
    order: &CohortOrder,
    output: &Path,
) -> Result<CorpusTable, PipelineError> {
    let encoder = CsvEncoder::new();
    let mut tables = Vec::new();
    for input in inputs {
        let table = encoder.read_table(BufReader::new(open_file(input)?))?;
        tables.extend(table.into_cohorts());
    }

    let corpus = Aggregator::aggregate(tables, order)?;
    encoder.write_rows(&corpus.schema, corpus.iter_rows(), create_file(output)?)?;
    tracing::info!(path = %output.display(), rows = corpus.rows.len(), "wrote corpus table");
    Ok(corpus)
}

fn open_file(path: &Path) -> Result<File, PipelineError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            PipelineError::SourceNotFound(path.display().to_string())
        }
        _ => PipelineError::Io(e),
    })
}

fn create_file(path: &Path) -> Result<BufWriter<File>, PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}
