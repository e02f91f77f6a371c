//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. The defaults reproduce the study's daily run.

use crate::aggregator::{CohortOrder, DEFAULT_COHORT_ORDER};
use crate::aligner::SurveyBoundary;
use crate::error::PipelineError;
use crate::labeler::{LabelStrategy, Labeler, DEFAULT_DEPRESSION_THRESHOLD};
use crate::reshape::DEFAULT_RESHAPE_STEPS;
use crate::types::{BucketWidth, TimeGrid};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Date range of one cohort; both ends are inclusive days
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortSpec {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CohortSpec {
    pub fn new(name: &str, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            name: name.to_string(),
            start_date,
            end_date,
        }
    }

    /// Grid from midnight of the start date to midnight after the end date.
    ///
    /// The end day is always covered in full, so a 12H grid over E1 has 186
    /// buckets where an end-exclusive date range would stop at 185.
    pub fn grid(&self, width: BucketWidth) -> Result<TimeGrid, PipelineError> {
        let end = self.end_date.succ_opt().ok_or_else(|| {
            PipelineError::InvalidRange(format!("end date of '{}' is out of range", self.name))
        })?;
        TimeGrid::new(
            self.start_date.and_time(NaiveTime::MIN),
            end.and_time(NaiveTime::MIN),
            width,
        )
    }
}

fn default_cohorts() -> Vec<CohortSpec> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
    vec![
        CohortSpec::new("E1 term", date(2020, 6, 15), date(2020, 9, 15)),
        CohortSpec::new("E2 term", date(2020, 6, 15), date(2020, 10, 26)),
        CohortSpec::new("E1+E2 term", date(2020, 6, 15), date(2020, 10, 16)),
        CohortSpec::new("Fall-1st cohort", date(2020, 9, 6), date(2020, 12, 18)),
        CohortSpec::new("Fall-2nd cohort", date(2020, 9, 7), date(2020, 12, 23)),
        CohortSpec::new("Spring-1st cohort", date(2021, 2, 15), date(2021, 5, 16)),
        CohortSpec::new("Spring-2nd cohort", date(2021, 4, 5), date(2021, 6, 28)),
    ]
}

/// Parameters of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resampling frequency, e.g. `D` or `12H`
    pub bucket_width: BucketWidth,
    /// Scores at or above this value are labelled depressed
    pub depression_threshold: f64,
    pub survey_boundary: SurveyBoundary,
    pub label_strategy: LabelStrategy,
    pub cohort_order: Vec<String>,
    pub cohorts: Vec<CohortSpec>,
    /// Buckets with fewer steps are treated as non-wear; off when unset
    pub non_wear_step_threshold: Option<f64>,
    /// Time steps per wide row
    pub reshape_steps: usize,
    /// Student folders whose name contains one of these are skipped
    pub skip_patterns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket_width: BucketWidth::DAILY,
            depression_threshold: DEFAULT_DEPRESSION_THRESHOLD,
            survey_boundary: SurveyBoundary::default(),
            label_strategy: LabelStrategy::default(),
            cohort_order: DEFAULT_COHORT_ORDER.iter().map(|s| s.to_string()).collect(),
            cohorts: default_cohorts(),
            non_wear_step_threshold: None,
            reshape_steps: DEFAULT_RESHAPE_STEPS,
            skip_patterns: vec![
                "invalid".to_string(),
                "plots".to_string(),
                "temporary".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn cohort(&self, name: &str) -> Option<&CohortSpec> {
        self.cohorts.iter().find(|c| c.name == name)
    }

    pub fn cohort_order(&self) -> Result<CohortOrder, PipelineError> {
        CohortOrder::new(self.cohort_order.clone())
    }

    /// Check the configuration for defects that would abort a run
    pub fn validate(&self) -> Result<(), PipelineError> {
        Labeler::new(self.depression_threshold)?;
        if self.reshape_steps == 0 {
            return Err(PipelineError::ConfigError(
                "reshape_steps must be at least 1".to_string(),
            ));
        }
        if let Some(threshold) = self.non_wear_step_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(PipelineError::ConfigError(format!(
                    "non_wear_step_threshold must be a non-negative number, got {}",
                    threshold
                )));
            }
        }

        let order = self.cohort_order()?;
        for (i, cohort) in self.cohorts.iter().enumerate() {
            if self.cohorts[..i].iter().any(|c| c.name == cohort.name) {
                return Err(PipelineError::ConfigError(format!(
                    "cohort '{}' is defined twice",
                    cohort.name
                )));
            }
            order.require(&cohort.name)?;
            validate_cohort_name(&cohort.name)?;
            if cohort.end_date < cohort.start_date {
                return Err(PipelineError::InvalidRange(format!(
                    "cohort '{}' ends on {} before it starts on {}",
                    cohort.name, cohort.end_date, cohort.start_date
                )));
            }
        }
        Ok(())
    }
}

/// Cohort names become folder and file names in the output tree
fn validate_cohort_name(name: &str) -> Result<(), PipelineError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || name.contains(['/', '\\']) {
        return Err(PipelineError::ConfigError(format!(
            "cohort name '{}' cannot be used as a folder name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.cohorts.len(), 7);
        assert_eq!(config.reshape_steps, 85);
        assert_eq!(config.depression_threshold, 10.0);
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json(
            r#"{
                "bucket_width": "12H",
                "depression_threshold": 16,
                "survey_boundary": "forward_only",
                "label_strategy": "max"
            }"#,
        )
        .unwrap();

        assert_eq!(config.bucket_width, BucketWidth::HALF_DAY);
        assert_eq!(config.depression_threshold, 16.0);
        assert_eq!(config.survey_boundary, SurveyBoundary::ForwardOnly);
        assert_eq!(config.label_strategy, LabelStrategy::Max);
    }

    #[test]
    fn test_cohort_missing_from_order() {
        let json = r#"{
            "cohort_order": ["A"],
            "cohorts": [
                {"name": "A", "start_date": "2020-01-01", "end_date": "2020-01-31"},
                {"name": "B", "start_date": "2020-02-01", "end_date": "2020-02-28"}
            ]
        }"#;
        let result = PipelineConfig::from_json(json);
        assert!(matches!(result, Err(PipelineError::UnknownCohort(_))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"reshape_steps": 0}"#),
            Err(PipelineError::ConfigError(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(r#"{"cohort_order": ["A", "A"], "cohorts": []}"#),
            Err(PipelineError::ConfigError(_))
        ));
        assert!(PipelineConfig::from_json(r#"{"bucket_width": "3X"}"#).is_err());
    }

    #[test]
    fn test_non_finite_threshold() {
        let config = PipelineConfig {
            depression_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_cohort_names_must_be_folder_names() {
        for name in ["E1/E2", "..", " ", "a\\b"] {
            let json = serde_json::json!({
                "cohort_order": [name],
                "cohorts": [{"name": name, "start_date": "2020-01-01", "end_date": "2020-01-31"}]
            });
            let result = PipelineConfig::from_json(&json.to_string());
            assert!(
                matches!(result, Err(PipelineError::ConfigError(_))),
                "'{}' should be rejected",
                name
            );
        }

        let json = r#"{
            "cohort_order": ["corpus"],
            "cohorts": [{"name": "corpus", "start_date": "2020-01-01", "end_date": "2020-01-31"}]
        }"#;
        assert!(PipelineConfig::from_json(json).is_ok());
    }

    #[test]
    fn test_grid_covers_inclusive_end_date() {
        let config = PipelineConfig::default();
        let e1 = config.cohort("E1 term").unwrap();

        let grid = e1.grid(BucketWidth::DAILY).unwrap();
        // 2020-06-15 ..= 2020-09-15
        assert_eq!(grid.len(), 93);

        let half_day = e1.grid(BucketWidth::HALF_DAY).unwrap();
        assert_eq!(half_day.len(), 186);
    }
}
