//! Error types for flux-cohort

use thiserror::Error;

/// Errors that can occur while building cohort tables
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Missing survey score: {0}")]
    MissingScore(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unknown cohort: {0}")]
    UnknownCohort(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("No wearable data for individual {0}")]
    NoData(String),

    #[error("Invalid export filename: {0}")]
    InvalidFilename(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid bucket width: {0}")]
    InvalidBucketWidth(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to parse table: {0}")]
    ParseError(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the error points at a configuration defect rather than
    /// missing or malformed data for a single individual.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaMismatch(_)
                | PipelineError::UnknownCohort(_)
                | PipelineError::ConfigError(_)
                | PipelineError::InvalidRange(_)
                | PipelineError::InvalidBucketWidth(_)
        )
    }
}
