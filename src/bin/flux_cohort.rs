//! flux-cohort CLI - Command-line interface for the cohort batch pipeline
//!
//! Commands:
//! - run: Process every configured cohort and write all tables
//! - relabel: Recompute label columns of a stored table
//! - aggregate: Concatenate stored cohort tables into one corpus table
//! - doctor: Diagnose configuration and input layout
//! - schema: Print table headers or the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use flux_cohort::schema::{parse_export_filename, ExportLoader};
use flux_cohort::table::TableSchema;
use flux_cohort::types::{BucketWidth, NumericColumn};
use flux_cohort::{
    aggregate_files, relabel_file, LabelStrategy, Labeler, Pipeline, PipelineConfig,
    PipelineError, SurveyBoundary, FLUX_COHORT_VERSION,
};

/// flux-cohort - Wearable and survey batch pipeline
#[derive(Parser)]
#[command(name = "flux-cohort")]
#[command(version = FLUX_COHORT_VERSION)]
#[command(about = "Resample, align, impute and label wearable study exports", long_about = None)]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every configured cohort and write all tables
    Run {
        /// Root folder holding one folder per cohort
        #[arg(short, long)]
        input: PathBuf,

        /// Output folder
        #[arg(short, long)]
        output: PathBuf,

        /// Resampling frequency (e.g. D, 12H)
        #[arg(long)]
        bucket_width: Option<BucketWidth>,

        /// CES-D score at or above which a row is labelled depressed
        #[arg(long)]
        threshold: Option<f64>,

        /// Handling of buckets before the first survey response
        #[arg(long)]
        boundary: Option<BoundaryArg>,

        /// Reduction of a student's scores into one summary label
        #[arg(long)]
        label_strategy: Option<StrategyArg>,

        /// Treat buckets with fewer steps as non-wear
        #[arg(long)]
        non_wear_steps: Option<f64>,

        /// Time steps per reshaped row
        #[arg(long)]
        reshape_steps: Option<usize>,
    },

    /// Recompute label columns of a stored cohort or corpus table
    Relabel {
        /// Table to relabel
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// New threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Concatenate stored cohort tables into one corpus table
    Aggregate {
        /// Cohort tables to combine
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Diagnose configuration and input layout
    Doctor {
        /// Root folder to inspect
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print table headers or the default configuration
    Schema {
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum BoundaryArg {
    /// Leading buckets take the first observed score
    Backfill,
    /// Leading buckets stay missing
    ForwardOnly,
}

impl From<BoundaryArg> for SurveyBoundary {
    fn from(arg: BoundaryArg) -> Self {
        match arg {
            BoundaryArg::Backfill => SurveyBoundary::Backfill,
            BoundaryArg::ForwardOnly => SurveyBoundary::ForwardOnly,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum StrategyArg {
    Mean,
    Max,
    Last,
}

impl From<StrategyArg> for LabelStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Mean => LabelStrategy::Mean,
            StrategyArg::Max => LabelStrategy::Max,
            StrategyArg::Last => LabelStrategy::Last,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Cohort and corpus table columns
    Table,
    /// Student summary label columns
    Labels,
    /// Reshaped table columns
    Wide,
    /// Default configuration as JSON
    Config,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let directive = std::env::var("FLUX_COHORT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn run(cli: Cli) -> Result<(), CohortCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            input,
            output,
            bucket_width,
            threshold,
            boundary,
            label_strategy,
            non_wear_steps,
            reshape_steps,
        } => {
            let mut config = load_config(config_path)?;
            if let Some(width) = bucket_width {
                config.bucket_width = width;
            }
            if let Some(threshold) = threshold {
                config.depression_threshold = threshold;
            }
            if let Some(boundary) = boundary {
                config.survey_boundary = boundary.into();
            }
            if let Some(strategy) = label_strategy {
                config.label_strategy = strategy.into();
            }
            if non_wear_steps.is_some() {
                config.non_wear_step_threshold = non_wear_steps;
            }
            if let Some(steps) = reshape_steps {
                config.reshape_steps = steps;
            }
            cmd_run(config, &input, &output)
        }

        Commands::Relabel {
            input,
            output,
            threshold,
        } => {
            let threshold = match threshold {
                Some(threshold) => threshold,
                None => load_config(config_path)?.depression_threshold,
            };
            let output = output.unwrap_or_else(|| input.clone());
            let labelled = relabel_file(&input, &output, &Labeler::new(threshold)?)?;
            println!("Relabelled {} rows into {}", labelled, output.display());
            Ok(())
        }

        Commands::Aggregate { inputs, output } => {
            let order = load_config(config_path)?.cohort_order()?;
            let corpus = aggregate_files(&inputs, &order, &output)?;
            println!("Wrote {} rows to {}", corpus.rows.len(), output.display());
            Ok(())
        }

        Commands::Doctor { input, json } => {
            cmd_doctor(config_path, load_config(config_path), input.as_deref(), json)
        }

        Commands::Schema { schema_type } => cmd_schema(schema_type, &load_config(config_path)?),
    }
}

fn cmd_run(config: PipelineConfig, input: &Path, output: &Path) -> Result<(), CohortCliError> {
    let pipeline = Pipeline::new(config)?;
    let summary = pipeline.run(input, output)?;

    for cohort in &summary.cohorts {
        println!(
            "{}: {} processed, {} skipped",
            cohort.cohort,
            cohort.processed.len(),
            cohort.skipped.len()
        );
    }
    for cohort in &summary.missing_cohorts {
        println!("{}: folder not found", cohort);
    }
    println!("Run {} wrote {} files", summary.run_id, summary.outputs.len());
    Ok(())
}

fn cmd_doctor(
    config_path: Option<&Path>,
    config: Result<PipelineConfig, PipelineError>,
    input: Option<&Path>,
    json: bool,
) -> Result<(), CohortCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("flux-cohort version {}", FLUX_COHORT_VERSION),
    });

    let config_source = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    let config = match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} valid ({} cohorts, bucket width {})",
                    config_source,
                    config.cohorts.len(),
                    config.bucket_width
                ),
            });
            config
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("{}: {}", config_source, e),
            });
            PipelineConfig::default()
        }
    };

    if let Some(root) = input {
        if root.is_dir() {
            let loader = ExportLoader::new(config.skip_patterns.clone());
            for cohort in &config.cohorts {
                checks.push(inspect_cohort(&loader, &root.join(&cohort.name), &cohort.name));
            }
        } else {
            checks.push(DoctorCheck {
                name: "input".to_string(),
                status: CheckStatus::Error,
                message: format!("{} is not a folder", root.display()),
            });
        }
    }

    let report = DoctorReport {
        version: FLUX_COHORT_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("flux-cohort Doctor Report");
        println!("=========================");
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CohortCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn inspect_cohort(loader: &ExportLoader, cohort_dir: &Path, name: &str) -> DoctorCheck {
    let students = match loader.discover_individuals(cohort_dir) {
        Ok(students) => students,
        Err(_) => {
            return DoctorCheck {
                name: name.to_string(),
                status: CheckStatus::Warning,
                message: "cohort folder not found".to_string(),
            }
        }
    };

    let mut exports = 0;
    let mut invalid = Vec::new();
    for student in &students {
        for path in export_candidates(&student.join("Fitbit")) {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match parse_export_filename(&file_name) {
                Ok(Some(_)) => exports += 1,
                Ok(None) => {}
                Err(e) => invalid.push(e.to_string()),
            }
        }
    }

    if invalid.is_empty() {
        DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: format!("{} students, {} feature exports", students.len(), exports),
        }
    } else {
        DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: format!(
                "{} students, {} invalid export names (first: {})",
                students.len(),
                invalid.len(),
                invalid[0]
            ),
        }
    }
}

/// Files directly under `dir` and one level of month folders below it
fn export_candidates(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Ok(nested) = fs::read_dir(&path) {
                files.extend(nested.flatten().map(|e| e.path()).filter(|p| p.is_file()));
            }
        } else {
            files.push(path);
        }
    }
    files
}

fn cmd_schema(schema_type: SchemaType, config: &PipelineConfig) -> Result<(), CohortCliError> {
    match schema_type {
        SchemaType::Table => {
            println!("Cohort and corpus tables");
            println!();
            for header in TableSchema::standard().headers() {
                println!("  {}", header);
            }
            println!();
            println!("Time is written as %Y-%m-%d %H:%M:%S; masks are 1 when the value was missing before imputation.");
        }
        SchemaType::Labels => {
            let strategy = config.label_strategy;
            println!("Student label tables");
            println!();
            println!("  Term");
            println!("  Student ID");
            println!("  {}", strategy.score_column());
            println!("  {}", strategy.label_column());
            println!("  {} Interpreted", strategy.label_column());
        }
        SchemaType::Wide => {
            let strategy = config.label_strategy;
            println!("Reshaped tables");
            println!();
            println!("  Student ID");
            println!("  Term");
            let features: Vec<_> = NumericColumn::ALL.iter().map(|c| c.display_name()).collect();
            println!("  Feature ({})", features.join(", "));
            println!("  1 .. {}", config.reshape_steps);
            println!("  {}", strategy.label_column());
            println!("  {} Interpreted", strategy.label_column());
            if config.bucket_width == BucketWidth::HALF_DAY {
                println!();
                println!("Half-day runs also write *_day.csv and *_night.csv; day buckets start between 06:00 and 18:00.");
            }
        }
        SchemaType::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}

// Error types

#[derive(Debug)]
enum CohortCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for CohortCliError {
    fn from(e: io::Error) -> Self {
        CohortCliError::Io(e)
    }
}

impl From<PipelineError> for CohortCliError {
    fn from(e: PipelineError) -> Self {
        CohortCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for CohortCliError {
    fn from(e: serde_json::Error) -> Self {
        CohortCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CohortCliError> for CliError {
    fn from(e: CohortCliError) -> Self {
        match e {
            CohortCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CohortCliError::Pipeline(e) => {
                let (code, hint) = match &e {
                    PipelineError::InvalidRange(_) => {
                        ("INVALID_RANGE", "Check cohort start and end dates")
                    }
                    PipelineError::SchemaMismatch(_) => (
                        "SCHEMA_MISMATCH",
                        "Run 'flux-cohort schema table' for the expected columns",
                    ),
                    PipelineError::UnknownCohort(_) => {
                        ("UNKNOWN_COHORT", "Add the cohort to cohort_order in the config")
                    }
                    PipelineError::SourceNotFound(_) => {
                        ("SOURCE_NOT_FOUND", "Check the input path")
                    }
                    PipelineError::ConfigError(_) | PipelineError::InvalidBucketWidth(_) => (
                        "CONFIG_ERROR",
                        "Run 'flux-cohort schema config' for a valid configuration",
                    ),
                    PipelineError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    PipelineError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    _ => ("PARSE_ERROR", "Check the input file format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CohortCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CohortCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
