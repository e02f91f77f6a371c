//! flux-cohort - Batch engine for wearable and survey study data
//!
//! flux-cohort turns per-student wearable exports and self-report surveys into
//! aligned, labelled cohort tables through a deterministic pipeline:
//! source loading → resampling → alignment → gap filling → labelling →
//! cohort aggregation → reshaping.
//!
//! ## Modules
//!
//! - **Stages**: `resampler`, `aligner`, `imputer`, `labeler`, `aggregator`, `reshape`
//! - **Input**: `schema` (export formats and folder discovery)
//! - **Output**: `encoder` (CSV tables), `pipeline` (run orchestration and summary)

pub mod aggregator;
pub mod aligner;
pub mod config;
pub mod encoder;
pub mod error;
pub mod imputer;
pub mod labeler;
pub mod pipeline;
pub mod resampler;
pub mod reshape;
pub mod schema;
pub mod table;
pub mod types;

pub use aggregator::{Aggregator, CohortOrder, DEFAULT_COHORT_ORDER};
pub use aligner::{Aligner, SurveyBoundary};
pub use config::{CohortSpec, PipelineConfig};
pub use encoder::CsvEncoder;
pub use error::PipelineError;
pub use imputer::{mask_and_fill, FillReport, GapFiller};
pub use labeler::{LabelStrategy, Labeler, StudentLabel, DEFAULT_DEPRESSION_THRESHOLD};
pub use pipeline::{aggregate_files, relabel_file, Pipeline, RunSummary};
pub use resampler::{resample, Resampler};
pub use reshape::{Reshaper, TimeOfDay, WideRow};
pub use table::{CohortTable, Column, CorpusTable, TableSchema};

/// Crate version recorded in every run summary
pub const FLUX_COHORT_VERSION: &str = env!("CARGO_PKG_VERSION");
