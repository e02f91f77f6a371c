//! Depression labels from CES-D scores
//!
//! A score at or above the threshold is `Depressed` (1), anything below is
//! `Not Depressed` (0). Only the state is stored on a row; the binary
//! interpretation is always derived from it.

use crate::error::PipelineError;
use crate::table::{CohortTable, CorpusTable};
use crate::types::{DepressionState, TimelineRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Cut-off used by the standard CES-D screening
pub const DEFAULT_DEPRESSION_THRESHOLD: f64 = 10.0;

/// Applies the threshold rule to scores and tables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Labeler {
    threshold: f64,
}

impl Default for Labeler {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DEPRESSION_THRESHOLD,
        }
    }
}

impl Labeler {
    /// # Errors
    /// `ConfigError` when the threshold is not a finite number.
    pub fn new(threshold: f64) -> Result<Self, PipelineError> {
        if !threshold.is_finite() {
            return Err(PipelineError::ConfigError(format!(
                "depression threshold must be a finite number, got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Label a single score.
    ///
    /// # Errors
    /// `MissingScore` when the score is absent or not a number.
    pub fn label(&self, score: Option<f64>) -> Result<DepressionState, PipelineError> {
        match score {
            Some(score) if score.is_finite() => Ok(if score >= self.threshold {
                DepressionState::Depressed
            } else {
                DepressionState::NotDepressed
            }),
            Some(score) => Err(PipelineError::MissingScore(format!(
                "score {} is not a number",
                score
            ))),
            None => Err(PipelineError::MissingScore("no CESD score".to_string())),
        }
    }

    /// Recompute the label of every row; rows without a score lose their label.
    /// Returns the number of labelled rows.
    pub fn label_rows<'a>(&self, rows: impl Iterator<Item = &'a mut TimelineRow>) -> usize {
        let mut labelled = 0;
        for row in rows {
            row.cesd_state = self.label(row.cesd.value()).ok();
            if row.cesd_state.is_some() {
                labelled += 1;
            }
        }
        labelled
    }

    /// Relabel a stored cohort table in place, adding label columns if absent
    pub fn relabel_cohort(&self, table: &mut CohortTable) -> usize {
        table.schema = std::mem::take(&mut table.schema).with_labels();
        self.label_rows(table.rows.iter_mut().map(|r| &mut r.row))
    }

    /// Relabel a stored corpus table in place, adding label columns if absent
    pub fn relabel_corpus(&self, table: &mut CorpusTable) -> usize {
        table.schema = std::mem::take(&mut table.schema).with_labels();
        self.label_rows(table.rows.iter_mut().map(|r| &mut r.row))
    }

    /// One summary label per (cohort, student) from the observed scores.
    ///
    /// Only distinct scores that were observed (mask 0) take part, in
    /// first-seen order. Students without an observed score are left out.
    pub fn summarize<'a>(
        &self,
        rows: impl Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
        strategy: LabelStrategy,
    ) -> Vec<StudentLabel> {
        let mut order: Vec<(&str, &str)> = Vec::new();
        let mut scores: HashMap<(&str, &str), Vec<f64>> = HashMap::new();

        for (cohort, student_id, row) in rows {
            let key = (cohort, student_id);
            let entry = scores.entry(key).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            if row.cesd.was_missing() {
                continue;
            }
            if let Some(score) = row.cesd.value() {
                if !entry.contains(&score) {
                    entry.push(score);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|key| {
                let score = strategy.reduce(scores.get(&key)?)?;
                let state = self.label(Some(score)).ok()?;
                Some(StudentLabel {
                    cohort: key.0.to_string(),
                    student_id: key.1.to_string(),
                    score,
                    state,
                })
            })
            .collect()
    }
}

/// How a student's distinct scores collapse into one summary score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStrategy {
    #[default]
    Mean,
    Max,
    Last,
}

impl LabelStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelStrategy::Mean => "Mean",
            LabelStrategy::Max => "Max",
            LabelStrategy::Last => "Last",
        }
    }

    /// Header of the summary score column, e.g. `CESD (Mean)`
    pub fn score_column(&self) -> String {
        format!("CESD ({})", self.as_str())
    }

    /// Header of the summary label column, e.g. `CESD (Mean) Label`
    pub fn label_column(&self) -> String {
        format!("CESD ({}) Label", self.as_str())
    }

    fn reduce(&self, scores: &[f64]) -> Option<f64> {
        if scores.is_empty() {
            return None;
        }
        match self {
            LabelStrategy::Mean => Some(scores.iter().sum::<f64>() / scores.len() as f64),
            LabelStrategy::Max => scores.iter().copied().reduce(f64::max),
            LabelStrategy::Last => scores.last().copied(),
        }
    }
}

impl fmt::Display for LabelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary label of one student in one cohort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentLabel {
    pub cohort: String,
    pub student_id: String,
    pub score: f64,
    pub state: DepressionState,
}
