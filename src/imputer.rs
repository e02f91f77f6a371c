//! Gap filling for wearable columns
//!
//! Missing heart rate, calories, distance, steps and minutes asleep are
//! replaced by the mean of the individual's observed values. Masks are never touched here; they were
//! fixed when the timeline was aligned.

use crate::types::{IndividualTimeline, MaskedValue, NumericColumn};
use serde::Serialize;

/// Outcome of filling one timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FillReport {
    /// Number of cells that received a value
    pub filled: usize,
    /// Columns without any observed value, left missing
    pub empty_columns: Vec<NumericColumn>,
}

/// Mean imputation over an individual's numeric columns
pub struct GapFiller;

impl GapFiller {
    /// Fill every numeric column of `timeline` in place.
    ///
    /// Running it twice changes nothing the second time.
    pub fn fill(timeline: &mut IndividualTimeline) -> FillReport {
        let mut report = FillReport::default();

        for column in NumericColumn::ALL {
            let mean = observed_mean(timeline.rows.iter().map(|row| row.numeric(column)));
            match mean {
                Some(mean) => {
                    for row in timeline.rows.iter_mut() {
                        if row.numeric_mut(column).fill(mean) {
                            report.filled += 1;
                        }
                    }
                }
                None => report.empty_columns.push(column),
            }
        }

        report
    }
}

/// Column-level contract: masks of the raw values plus the filled values
pub fn mask_and_fill(values: &[Option<f64>]) -> (Vec<u8>, Vec<Option<f64>>) {
    let mut cells: Vec<MaskedValue> = values.iter().map(|v| MaskedValue::observe(*v)).collect();
    if let Some(mean) = observed_mean(cells.iter()) {
        for cell in cells.iter_mut() {
            cell.fill(mean);
        }
    }
    (
        cells.iter().map(MaskedValue::mask).collect(),
        cells.iter().map(MaskedValue::value).collect(),
    )
}

fn observed_mean<'a>(cells: impl Iterator<Item = &'a MaskedValue>) -> Option<f64> {
    let (sum, count) = cells
        .filter(|cell| !cell.was_missing())
        .filter_map(|cell| cell.value())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimelineRow;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_timeline(steps: &[Option<f64>]) -> IndividualTimeline {
        let rows = steps
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let time = NaiveDate::from_ymd_opt(2020, 6, 1 + i as u32)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                let mut row = TimelineRow::empty(time);
                row.steps = MaskedValue::observe(*v);
                row
            })
            .collect();
        IndividualTimeline {
            student_id: "s01".to_string(),
            rows,
        }
    }

    #[test]
    fn test_mask_and_fill_contract() {
        let (masks, filled) = mask_and_fill(&[Some(500.0), None, Some(800.0)]);

        assert_eq!(masks, vec![0, 1, 0]);
        assert_eq!(filled, vec![Some(500.0), Some(650.0), Some(800.0)]);
    }

    #[test]
    fn test_all_missing_column_stays_missing() {
        let (masks, filled) = mask_and_fill(&[None, None]);

        assert_eq!(masks, vec![1, 1]);
        assert_eq!(filled, vec![None, None]);
    }

    #[test]
    fn test_fill_timeline() {
        let mut timeline = make_timeline(&[Some(500.0), None, Some(800.0)]);

        let report = GapFiller::fill(&mut timeline);

        let steps: Vec<_> = timeline.rows.iter().map(|r| r.steps.value()).collect();
        let masks: Vec<_> = timeline.rows.iter().map(|r| r.steps.mask()).collect();
        assert_eq!(steps, vec![Some(500.0), Some(650.0), Some(800.0)]);
        assert_eq!(masks, vec![0, 1, 0]);
        assert_eq!(report.filled, 1);
        assert_eq!(
            report.empty_columns,
            vec![
                NumericColumn::HeartRate,
                NumericColumn::Calories,
                NumericColumn::Distance,
                NumericColumn::MinutesAsleep,
            ]
        );
    }

    #[test]
    fn test_minutes_asleep_take_the_individual_mean() {
        let mut timeline = make_timeline(&[Some(1.0), Some(1.0), Some(1.0)]);
        let minutes = [Some(420.0), None, Some(480.0)];
        for (row, value) in timeline.rows.iter_mut().zip(minutes) {
            row.minutes_asleep = MaskedValue::observe(value);
        }

        let report = GapFiller::fill(&mut timeline);

        let filled: Vec<_> = timeline.rows.iter().map(|r| r.minutes_asleep.value()).collect();
        assert_eq!(filled, vec![Some(420.0), Some(450.0), Some(480.0)]);
        assert_eq!(timeline.rows[1].minutes_asleep.mask(), 1);
        assert_eq!(timeline.rows[1].hours_asleep(), Some(7.5));
        assert!(!report.empty_columns.contains(&NumericColumn::MinutesAsleep));
    }

    #[test]
    fn test_fill_is_idempotent() {
        let mut timeline = make_timeline(&[Some(10.0), None, None, Some(40.0)]);
        GapFiller::fill(&mut timeline);
        let once = timeline.clone();

        let report = GapFiller::fill(&mut timeline);

        assert_eq!(timeline, once);
        assert_eq!(report.filled, 0);
    }
}
