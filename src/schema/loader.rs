//! Discovery and loading of per-student export folders
//!
//! Expected layout:
//!
//! ```text
//! <root>/<cohort>/<student>/Fitbit/[<month>/]<feature><YYYYMMDD>.csv
//! <root>/<cohort>/<student>/Survey/*.{csv,xlsx}
//! ```

use super::export::{
    parse_export_filename, read_feature_file, read_survey_file, read_survey_workbook,
};
use crate::error::PipelineError;
use crate::types::{Event, Feature, FeatureStreams, SurveyResponse};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const WEARABLE_DIR: &str = "Fitbit";
const SURVEY_DIR: &str = "Survey";

/// A source that was expected but not found for one individual
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum MissingSource {
    Feature(Feature),
    Survey,
}

/// Everything loaded for one individual
#[derive(Debug, Clone, Default)]
pub struct IndividualSources {
    pub student_id: String,
    pub features: FeatureStreams<Vec<Event>>,
    pub survey: Vec<SurveyResponse>,
    pub missing: Vec<MissingSource>,
}

/// Walks a cohort folder and reads each student's exports
#[derive(Debug, Clone)]
pub struct ExportLoader {
    skip_patterns: Vec<String>,
}

impl ExportLoader {
    pub fn new(skip_patterns: Vec<String>) -> Self {
        Self {
            skip_patterns: skip_patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.starts_with('.') || self.skip_patterns.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Student folders of a cohort, sorted by name
    pub fn discover_individuals(&self, cohort_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        if !cohort_dir.is_dir() {
            return Err(PipelineError::SourceNotFound(format!(
                "cohort folder {}",
                cohort_dir.display()
            )));
        }

        let mut students = Vec::new();
        for entry in fs::read_dir(cohort_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = file_name(&path);
            if self.is_skipped(&name) {
                tracing::debug!(folder = %path.display(), "skipping student folder");
                continue;
            }
            students.push(path);
        }
        students.sort();
        Ok(students)
    }

    /// Read all feature and survey files of one student folder.
    ///
    /// # Errors
    /// `NoData` when the folder holds no wearable export at all.
    pub fn load_individual(&self, student_dir: &Path) -> Result<IndividualSources, PipelineError> {
        let student_id = file_name(student_dir);
        let mut sources = IndividualSources {
            student_id: student_id.clone(),
            ..Default::default()
        };

        let mut files = Vec::new();
        collect_feature_files(&student_dir.join(WEARABLE_DIR), &mut files, 1)?;
        if files.is_empty() {
            return Err(PipelineError::NoData(student_id));
        }
        // day order, then path, so events keep a stable file order
        files.sort_by(|(a_date, a_path, _), (b_date, b_path, _)| {
            (a_date, a_path).cmp(&(b_date, b_path))
        });

        for (date, path, feature) in files {
            let file = File::open(&path)?;
            let events = read_feature_file(BufReader::new(file), feature, date)?;
            sources.features.get_mut(feature).extend(events);
        }

        for feature in Feature::ALL {
            if sources.features.get(feature).is_empty() {
                tracing::warn!(student = %student_id, feature = %feature, "feature source not found");
                sources.missing.push(MissingSource::Feature(feature));
            }
        }

        let survey_files = list_survey_files(&student_dir.join(SURVEY_DIR))?;
        if survey_files.is_empty() {
            tracing::warn!(student = %student_id, "survey source not found");
            sources.missing.push(MissingSource::Survey);
        }
        for (path, format) in survey_files {
            let responses = match format {
                SurveyFormat::Csv => read_survey_file(BufReader::new(File::open(&path)?))?,
                SurveyFormat::Workbook => read_survey_workbook(&path)?,
            };
            sources.survey.extend(responses);
        }

        Ok(sources)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Feature exports under `dir`, descending `depth` levels of month folders
fn collect_feature_files(
    dir: &Path,
    files: &mut Vec<(NaiveDate, PathBuf, Feature)>,
    depth: usize,
) -> Result<(), PipelineError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if depth > 0 {
                collect_feature_files(&path, files, depth - 1)?;
            }
            continue;
        }
        if let Some((feature, date)) = parse_export_filename(&file_name(&path))? {
            files.push((date, path, feature));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurveyFormat {
    Csv,
    Workbook,
}

/// Survey exports in `dir`, skipping hidden files and spreadsheet lock files
fn list_survey_files(dir: &Path) -> Result<Vec<(PathBuf, SurveyFormat)>, PipelineError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = file_name(&path);
        if !path.is_file() || name.starts_with('.') || name.starts_with("~$") {
            continue;
        }
        let format = match path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase()) {
            Some(ext) if ext == "csv" => SurveyFormat::Csv,
            Some(ext) if ext == "xlsx" => SurveyFormat::Workbook,
            _ => continue,
        };
        files.push((path, format));
    }
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files)
}
