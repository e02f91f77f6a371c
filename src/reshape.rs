//! Wide per-student tables
//!
//! Each student contributes one row per numeric feature holding the first N
//! time-step values of the filled timeline and the student's summary label.
//! Half-day runs are also split into day and night tables.

use crate::aggregator::CohortOrder;
use crate::error::PipelineError;
use crate::labeler::StudentLabel;
use crate::types::{NumericColumn, TimelineRow};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Default number of time steps kept per wide row
pub const DEFAULT_RESHAPE_STEPS: usize = 85;

const DAY_START_HOUR: u32 = 6;
const NIGHT_START_HOUR: u32 = 18;

/// Part of the day a bucket starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 06:00 up to 18:00
    Day,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 2] = [TimeOfDay::Day, TimeOfDay::Night];

    pub fn of(time: NaiveDateTime) -> Self {
        if (DAY_START_HOUR..NIGHT_START_HOUR).contains(&time.hour()) {
            TimeOfDay::Day
        } else {
            TimeOfDay::Night
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Day => "day",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One feature of one student laid out over time steps
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub student_id: String,
    pub cohort: String,
    pub feature: NumericColumn,
    /// Exactly `steps` cells; short timelines are padded with `None`
    pub values: Vec<Option<f64>>,
    pub label: Option<StudentLabel>,
}

/// Turns long timelines into wide rows
#[derive(Debug, Clone, Copy)]
pub struct Reshaper {
    steps: usize,
}

impl Default for Reshaper {
    fn default() -> Self {
        Self::new(DEFAULT_RESHAPE_STEPS)
    }
}

impl Reshaper {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Reshape rows given as (cohort, student, row), sorted by
    /// (cohort position, student, feature).
    pub fn reshape<'a>(
        &self,
        rows: impl Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
        labels: &[StudentLabel],
        order: &CohortOrder,
    ) -> Result<Vec<WideRow>, PipelineError> {
        let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
        let mut students: Vec<((&str, &str), Vec<&TimelineRow>)> = Vec::new();
        for (cohort, student_id, row) in rows {
            let key = (cohort, student_id);
            let slot = *slots.entry(key).or_insert_with(|| {
                students.push((key, Vec::new()));
                students.len() - 1
            });
            students[slot].1.push(row);
        }

        let labels: HashMap<(&str, &str), &StudentLabel> = labels
            .iter()
            .map(|label| ((label.cohort.as_str(), label.student_id.as_str()), label))
            .collect();

        let mut keyed = Vec::new();
        for ((cohort, student_id), mut timeline) in students {
            let position = order.require(cohort)?;
            timeline.sort_by_key(|row| row.time);
            let label = labels
                .get(&(cohort, student_id))
                .map(|label| (*label).clone());

            for (feature_index, feature) in NumericColumn::ALL.into_iter().enumerate() {
                let mut values: Vec<Option<f64>> = timeline
                    .iter()
                    .take(self.steps)
                    .map(|row| feature.wide_value(row))
                    .collect();
                values.resize(self.steps, None);

                keyed.push((
                    (position, student_id.to_string(), feature_index),
                    WideRow {
                        student_id: student_id.to_string(),
                        cohort: cohort.to_string(),
                        feature,
                        values,
                        label: label.clone(),
                    },
                ));
            }
        }

        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    /// Reshape only the buckets that start in `part` of the day
    pub fn reshape_time_of_day<'a>(
        &self,
        rows: impl Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
        labels: &[StudentLabel],
        order: &CohortOrder,
        part: TimeOfDay,
    ) -> Result<Vec<WideRow>, PipelineError> {
        let rows = rows.filter(move |(_, _, row)| TimeOfDay::of(row.time) == part);
        self.reshape(rows, labels, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::table::TableSchema;
    use crate::types::{DepressionState, IndividualTimeline, MaskedValue};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_timeline(student: &str, steps: &[f64]) -> IndividualTimeline {
        let rows = steps
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let time = NaiveDate::from_ymd_opt(2021, 2, 15 + i as u32)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                let mut row = TimelineRow::empty(time);
                row.steps = MaskedValue::observe(Some(*v));
                row.heart_rate = MaskedValue::observe(Some(70.0));
                row
            })
            .collect();
        IndividualTimeline {
            student_id: student.to_string(),
            rows,
        }
    }

    #[test]
    fn test_reshape_pads_and_truncates() {
        let table = Aggregator::assemble_cohort(
            "Spring-1st cohort",
            vec![
                make_timeline("s02", &[1.0, 2.0, 3.0, 4.0]),
                make_timeline("s01", &[5.0]),
            ],
            TableSchema::standard(),
        );
        let labels = vec![StudentLabel {
            cohort: "Spring-1st cohort".to_string(),
            student_id: "s02".to_string(),
            score: 18.0,
            state: DepressionState::Depressed,
        }];

        let rows = Reshaper::new(3)
            .reshape(table.iter_rows(), &labels, &CohortOrder::default())
            .unwrap();

        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].student_id, "s01");
        assert_eq!(rows[0].feature, NumericColumn::HeartRate);
        assert_eq!(rows[0].values, vec![Some(70.0), None, None]);
        assert_eq!(rows[3].feature, NumericColumn::Steps);
        assert_eq!(rows[3].values, vec![Some(5.0), None, None]);
        assert!(rows[3].label.is_none());
        assert_eq!(rows[4].feature, NumericColumn::MinutesAsleep);

        assert_eq!(rows[8].student_id, "s02");
        assert_eq!(rows[8].feature, NumericColumn::Steps);
        assert_eq!(rows[8].values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(rows[8].label.as_ref().map(|l| l.state), Some(DepressionState::Depressed));
        // calories were never observed
        assert_eq!(rows[6].values, vec![None, None, None]);
    }

    #[test]
    fn test_sleep_is_reshaped_in_hours() {
        let mut timeline = make_timeline("s01", &[1.0, 2.0]);
        timeline.rows[0].minutes_asleep = MaskedValue::observe(Some(420.0));
        let table = Aggregator::assemble_cohort("E1 term", vec![timeline], TableSchema::standard());

        let rows = Reshaper::new(2)
            .reshape(table.iter_rows(), &[], &CohortOrder::default())
            .unwrap();

        let sleep = rows
            .iter()
            .find(|r| r.feature == NumericColumn::MinutesAsleep)
            .unwrap();
        assert_eq!(sleep.feature.display_name(), "Hours Slept");
        assert_eq!(sleep.values, vec![Some(7.0), None]);
    }

    #[test]
    fn test_time_of_day_boundaries() {
        let at = |hour, minute| {
            NaiveDate::from_ymd_opt(2020, 6, 15)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap()
        };
        assert_eq!(TimeOfDay::of(at(0, 0)), TimeOfDay::Night);
        assert_eq!(TimeOfDay::of(at(5, 59)), TimeOfDay::Night);
        assert_eq!(TimeOfDay::of(at(6, 0)), TimeOfDay::Day);
        assert_eq!(TimeOfDay::of(at(12, 0)), TimeOfDay::Day);
        assert_eq!(TimeOfDay::of(at(18, 0)), TimeOfDay::Night);
    }

    #[test]
    fn test_half_day_split_into_day_and_night() {
        let rows = (0..4)
            .map(|i| {
                let time = NaiveDate::from_ymd_opt(2020, 6, 15 + i / 2)
                    .unwrap()
                    .and_hms_opt(12 * (i % 2), 0, 0)
                    .unwrap();
                let mut row = TimelineRow::empty(time);
                row.steps = MaskedValue::observe(Some(f64::from(i + 1)));
                row
            })
            .collect();
        let timeline = IndividualTimeline {
            student_id: "s01".to_string(),
            rows,
        };
        let table = Aggregator::assemble_cohort("E1 term", vec![timeline], TableSchema::standard());
        let reshaper = Reshaper::new(3);
        let order = CohortOrder::default();
        let steps = |rows: Vec<WideRow>| {
            rows.into_iter()
                .find(|r| r.feature == NumericColumn::Steps)
                .map(|r| r.values)
                .unwrap()
        };

        let day = reshaper
            .reshape_time_of_day(table.iter_rows(), &[], &order, TimeOfDay::Day)
            .unwrap();
        let night = reshaper
            .reshape_time_of_day(table.iter_rows(), &[], &order, TimeOfDay::Night)
            .unwrap();

        assert_eq!(steps(day), vec![Some(2.0), Some(4.0), None]);
        assert_eq!(steps(night), vec![Some(1.0), Some(3.0), None]);
    }

    #[test]
    fn test_interleaved_rows_group_by_student() {
        let mut first = make_timeline("s01", &[1.0, 2.0]);
        let second = make_timeline("s02", &[9.0, 8.0]);
        first.rows.reverse();
        let rows: Vec<(&str, &str, &TimelineRow)> = vec![
            ("E1 term", "s02", &second.rows[1]),
            ("E1 term", "s01", &first.rows[0]),
            ("E1 term", "s02", &second.rows[0]),
            ("E1 term", "s01", &first.rows[1]),
        ];

        let wide = Reshaper::new(2)
            .reshape(rows.into_iter(), &[], &CohortOrder::default())
            .unwrap();

        let steps: Vec<_> = wide
            .iter()
            .filter(|r| r.feature == NumericColumn::Steps)
            .map(|r| (r.student_id.as_str(), r.values.clone()))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("s01", vec![Some(1.0), Some(2.0)]),
                ("s02", vec![Some(9.0), Some(8.0)]),
            ]
        );
    }

    #[test]
    fn test_reshape_rejects_unknown_cohort() {
        let table = Aggregator::assemble_cohort(
            "Winter cohort",
            vec![make_timeline("s01", &[1.0])],
            TableSchema::standard(),
        );

        let result = Reshaper::default().reshape(table.iter_rows(), &[], &CohortOrder::default());
        assert!(matches!(result, Err(PipelineError::UnknownCohort(_))));
    }
}
