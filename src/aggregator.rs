//! Cross-individual and cross-cohort aggregation
//!
//! Individual timelines are collected into one table per cohort, and cohort
//! tables are concatenated into the corpus in an explicit cohort order.

use crate::error::PipelineError;
use crate::labeler::StudentLabel;
use crate::table::{CohortTable, CorpusRow, CorpusTable, TableSchema};
use crate::types::IndividualTimeline;

/// Cohorts of the study in calendar order
pub const DEFAULT_COHORT_ORDER: [&str; 7] = [
    "E1 term",
    "E2 term",
    "E1+E2 term",
    "Fall-1st cohort",
    "Fall-2nd cohort",
    "Spring-1st cohort",
    "Spring-2nd cohort",
];

/// Explicit ordering of cohort names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortOrder {
    names: Vec<String>,
}

impl Default for CohortOrder {
    fn default() -> Self {
        Self {
            names: DEFAULT_COHORT_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CohortOrder {
    /// # Errors
    /// `ConfigError` when a name appears twice.
    pub fn new(names: Vec<String>) -> Result<Self, PipelineError> {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PipelineError::ConfigError(format!(
                    "cohort '{}' appears twice in the cohort order",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, cohort: &str) -> Option<usize> {
        self.names.iter().position(|name| name == cohort)
    }

    /// Position of `cohort`, or `UnknownCohort`
    pub fn require(&self, cohort: &str) -> Result<usize, PipelineError> {
        self.position(cohort)
            .ok_or_else(|| PipelineError::UnknownCohort(cohort.to_string()))
    }
}

/// Builds cohort and corpus tables
pub struct Aggregator;

impl Aggregator {
    /// Collect timelines into one cohort table sorted by (student, time)
    pub fn assemble_cohort(
        cohort: &str,
        timelines: Vec<IndividualTimeline>,
        schema: TableSchema,
    ) -> CohortTable {
        let mut table = CohortTable::new(cohort, schema);
        for timeline in timelines {
            table.push_timeline(timeline);
        }
        table
            .rows
            .sort_by(|a, b| (&a.student_id, a.row.time).cmp(&(&b.student_id, b.row.time)));
        table
    }

    /// Concatenate cohort tables into the corpus.
    ///
    /// # Errors
    /// `SchemaMismatch` when the tables do not share a schema, `UnknownCohort`
    /// when a table's cohort is missing from `order`.
    pub fn aggregate(
        tables: Vec<CohortTable>,
        order: &CohortOrder,
    ) -> Result<CorpusTable, PipelineError> {
        let schema = match tables.first() {
            Some(first) => first.schema.clone(),
            None => TableSchema::standard(),
        };

        for table in &tables {
            if table.schema != schema {
                return Err(PipelineError::SchemaMismatch(format!(
                    "cohort '{}' has columns [{}], expected [{}]",
                    table.cohort,
                    table.schema.headers().join(", "),
                    schema.headers().join(", ")
                )));
            }
            order.require(&table.cohort)?;
        }

        let mut keyed: Vec<(usize, CorpusRow)> = Vec::new();
        for table in tables {
            let position = order.require(&table.cohort)?;
            let cohort = table.cohort;
            keyed.extend(table.rows.into_iter().map(|r| {
                (
                    position,
                    CorpusRow {
                        cohort: cohort.clone(),
                        student_id: r.student_id,
                        row: r.row,
                    },
                )
            }));
        }
        keyed.sort_by(|(pa, a), (pb, b)| {
            (pa, &a.student_id, a.row.time).cmp(&(pb, &b.student_id, b.row.time))
        });

        Ok(CorpusTable {
            schema,
            rows: keyed.into_iter().map(|(_, row)| row).collect(),
        })
    }

    /// Sort summary labels by (cohort position, student)
    pub fn sort_student_labels(
        labels: &mut [StudentLabel],
        order: &CohortOrder,
    ) -> Result<(), PipelineError> {
        for label in labels.iter() {
            order.require(&label.cohort)?;
        }
        labels.sort_by_key(|label| (order.position(&label.cohort), label.student_id.clone()));
        Ok(())
    }
}
