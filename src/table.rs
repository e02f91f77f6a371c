//! Cohort and corpus tables
//!
//! A table is a column schema plus typed rows. The schema decides which
//! columns are written and is compared when cohort tables are concatenated.

use crate::types::{IndividualTimeline, TimelineRow};
use serde::{Deserialize, Serialize};

/// Columns of a cohort or corpus table, in their canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Time,
    StudentId,
    Term,
    HeartRate,
    HeartRateMask,
    Calories,
    CaloriesMask,
    CalState,
    CalStateInterpreted,
    Distance,
    DistanceMask,
    Steps,
    StepsMask,
    MinutesAsleep,
    MinutesAsleepMask,
    HoursAsleep,
    HoursAsleepMask,
    SleepState,
    SleepStateInterpreted,
    Stai,
    StaiMask,
    Cesd,
    CesdMask,
    CesdState,
    CesdStateInterpreted,
}

impl Column {
    pub const ALL: [Column; 25] = [
        Column::Time,
        Column::StudentId,
        Column::Term,
        Column::HeartRate,
        Column::HeartRateMask,
        Column::Calories,
        Column::CaloriesMask,
        Column::CalState,
        Column::CalStateInterpreted,
        Column::Distance,
        Column::DistanceMask,
        Column::Steps,
        Column::StepsMask,
        Column::MinutesAsleep,
        Column::MinutesAsleepMask,
        Column::HoursAsleep,
        Column::HoursAsleepMask,
        Column::SleepState,
        Column::SleepStateInterpreted,
        Column::Stai,
        Column::StaiMask,
        Column::Cesd,
        Column::CesdMask,
        Column::CesdState,
        Column::CesdStateInterpreted,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Time => "Time",
            Column::StudentId => "Student ID",
            Column::Term => "Term",
            Column::HeartRate => "Heart Rate (Mean)",
            Column::HeartRateMask => "Heart Rate Mask",
            Column::Calories => "Calories (Sum)",
            Column::CaloriesMask => "Calories Burned Mask",
            Column::CalState => "Cal_State",
            Column::CalStateInterpreted => "Cal_State_Interpreted",
            Column::Distance => "Distance (Sum)",
            Column::DistanceMask => "Distance Traveled Mask",
            Column::Steps => "Step (Sum)",
            Column::StepsMask => "Steps Taken Mask",
            Column::MinutesAsleep => "Minutes_Asleep",
            Column::MinutesAsleepMask => "Minutes_Asleep Mask",
            Column::HoursAsleep => "Hours_Asleep",
            Column::HoursAsleepMask => "Hours_Asleep Mask",
            Column::SleepState => "Sleep_State",
            Column::SleepStateInterpreted => "Sleep_State_Interpreted",
            Column::Stai => "STAI",
            Column::StaiMask => "STAI Score Mask",
            Column::Cesd => "CESD",
            Column::CesdMask => "CESD Score Mask",
            Column::CesdState => "CESD State",
            Column::CesdStateInterpreted => "CESD State Interpreted",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }

    /// Whether the column is derived by the labeler
    pub fn is_label(&self) -> bool {
        matches!(self, Column::CesdState | Column::CesdStateInterpreted)
    }
}

/// Ordered set of columns carried by a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl TableSchema {
    /// All columns including the label pair
    pub fn standard() -> Self {
        Self {
            columns: Column::ALL.to_vec(),
        }
    }

    /// All columns except the label pair
    pub fn unlabeled() -> Self {
        Self {
            columns: Column::ALL.into_iter().filter(|c| !c.is_label()).collect(),
        }
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn contains(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(Column::header).collect()
    }

    /// Append any missing label column at the end
    pub fn with_labels(mut self) -> Self {
        for column in [Column::CesdState, Column::CesdStateInterpreted] {
            if !self.contains(column) {
                self.columns.push(column);
            }
        }
        self
    }
}

/// One row of a cohort table
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    pub student_id: String,
    pub row: TimelineRow,
}

/// All individuals of one cohort, sorted by (student, time)
#[derive(Debug, Clone, PartialEq)]
pub struct CohortTable {
    pub cohort: String,
    pub schema: TableSchema,
    pub rows: Vec<CohortRow>,
}

impl CohortTable {
    pub fn new(cohort: impl Into<String>, schema: TableSchema) -> Self {
        Self {
            cohort: cohort.into(),
            schema,
            rows: Vec::new(),
        }
    }

    pub fn push_timeline(&mut self, timeline: IndividualTimeline) {
        let student_id = timeline.student_id;
        self.rows.extend(timeline.rows.into_iter().map(|row| CohortRow {
            student_id: student_id.clone(),
            row,
        }));
    }

    /// Distinct student ids in row order
    pub fn student_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for r in &self.rows {
            if !ids.contains(&r.student_id.as_str()) {
                ids.push(&r.student_id);
            }
        }
        ids
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = (&str, &str, &TimelineRow)> {
        self.rows
            .iter()
            .map(move |r| (self.cohort.as_str(), r.student_id.as_str(), &r.row))
    }
}

/// One row of the corpus table
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRow {
    pub cohort: String,
    pub student_id: String,
    pub row: TimelineRow,
}

/// Concatenation of cohort tables
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusTable {
    pub schema: TableSchema,
    pub rows: Vec<CorpusRow>,
}

impl CorpusTable {
    pub fn iter_rows(&self) -> impl Iterator<Item = (&str, &str, &TimelineRow)> {
        self.rows
            .iter()
            .map(|r| (r.cohort.as_str(), r.student_id.as_str(), &r.row))
    }

    /// Split back into one table per cohort, in first-seen order
    pub fn into_cohorts(self) -> Vec<CohortTable> {
        let mut tables: Vec<CohortTable> = Vec::new();
        for r in self.rows {
            let index = match tables.iter().position(|t| t.cohort == r.cohort) {
                Some(index) => index,
                None => {
                    tables.push(CohortTable::new(r.cohort.clone(), self.schema.clone()));
                    tables.len() - 1
                }
            };
            tables[index].rows.push(CohortRow {
                student_id: r.student_id,
                row: r.row,
            });
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_timeline(student: &str, days: u32) -> IndividualTimeline {
        let rows = (1..=days)
            .map(|d| {
                TimelineRow::empty(
                    NaiveDate::from_ymd_opt(2020, 9, d)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                )
            })
            .collect();
        IndividualTimeline {
            student_id: student.to_string(),
            rows,
        }
    }

    #[test]
    fn test_headers_round_trip() {
        for column in Column::ALL {
            assert_eq!(Column::from_header(column.header()), Some(column));
        }
        assert_eq!(Column::from_header("Mood"), None);
    }

    #[test]
    fn test_with_labels_appends_once() {
        let schema = TableSchema::unlabeled().with_labels();
        assert_eq!(schema, TableSchema::standard());
        assert_eq!(schema.clone().with_labels(), schema);
    }

    #[test]
    fn test_student_ids_are_distinct() {
        let mut table = CohortTable::new("E1 term", TableSchema::standard());
        table.push_timeline(make_timeline("s02", 2));
        table.push_timeline(make_timeline("s01", 3));

        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.student_ids(), vec!["s02", "s01"]);
    }

    #[test]
    fn test_corpus_splits_into_cohorts() {
        let time = NaiveDate::from_ymd_opt(2020, 9, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let row = |cohort: &str, student: &str| CorpusRow {
            cohort: cohort.to_string(),
            student_id: student.to_string(),
            row: TimelineRow::empty(time),
        };
        let corpus = CorpusTable {
            schema: TableSchema::standard(),
            rows: vec![row("E1 term", "a"), row("E2 term", "b"), row("E1 term", "c")],
        };

        let tables = corpus.into_cohorts();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].cohort, "E1 term");
        assert_eq!(tables[0].student_ids(), vec!["a", "c"]);
        assert_eq!(tables[1].student_ids(), vec!["b"]);
    }
}
