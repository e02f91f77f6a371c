//! Alignment of resampled feature streams and survey responses
//!
//! The aligner joins every resampled feature onto one row per bucket, takes
//! the missingness masks and carries the most recent survey scores forward.

use crate::error::PipelineError;
use crate::types::{
    Aggregate, IndividualTimeline, MaskedValue, ResampledRow, ResampledStreams, SurveyResponse,
    TimeGrid, TimelineRow,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What happens to buckets before the first observed survey score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyBoundary {
    /// Leading buckets take the first observed score
    #[default]
    Backfill,
    /// Leading buckets stay missing
    ForwardOnly,
}

/// Survey scores carried along the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurveyScore {
    Cesd,
    Stai,
}

impl SurveyScore {
    const ALL: [SurveyScore; 2] = [SurveyScore::Cesd, SurveyScore::Stai];

    fn of(self, response: &SurveyResponse) -> Option<f64> {
        match self {
            SurveyScore::Cesd => response.cesd,
            SurveyScore::Stai => response.stai,
        }
    }

    fn cell(self, row: &TimelineRow) -> &MaskedValue {
        match self {
            SurveyScore::Cesd => &row.cesd,
            SurveyScore::Stai => &row.stai,
        }
    }

    fn cell_mut(self, row: &mut TimelineRow) -> &mut MaskedValue {
        match self {
            SurveyScore::Cesd => &mut row.cesd,
            SurveyScore::Stai => &mut row.stai,
        }
    }
}

/// Joins feature streams and survey responses into a timeline
#[derive(Debug, Clone)]
pub struct Aligner {
    boundary: SurveyBoundary,
    non_wear_step_threshold: Option<f64>,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new()
    }
}

impl Aligner {
    pub fn new() -> Self {
        Self {
            boundary: SurveyBoundary::default(),
            non_wear_step_threshold: None,
        }
    }

    pub fn with_boundary(mut self, boundary: SurveyBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Treat buckets with fewer steps than `threshold` as non-wear
    pub fn with_non_wear_threshold(mut self, threshold: Option<f64>) -> Self {
        self.non_wear_step_threshold = threshold;
        self
    }

    /// Outer-join the resampled streams and the survey series on bucket start.
    ///
    /// Masks are taken from the joined values before any carry or fill.
    pub fn merge(
        &self,
        student_id: &str,
        grid: &TimeGrid,
        streams: &ResampledStreams,
        survey: &[SurveyResponse],
    ) -> Result<IndividualTimeline, PipelineError> {
        if grid.is_empty() {
            return Err(PipelineError::InvalidRange(format!(
                "grid for {} has no buckets",
                student_id
            )));
        }

        let mut keys: BTreeSet<NaiveDateTime> = grid.bucket_starts().collect();
        for (_, rows) in streams.features.iter() {
            keys.extend(rows.iter().map(|r| r.bucket_start));
        }
        keys.extend(streams.minutes_asleep.iter().map(|r| r.bucket_start));
        let mut rows: BTreeMap<NaiveDateTime, TimelineRow> = keys
            .into_iter()
            .map(|time| (time, TimelineRow::empty(time)))
            .collect();

        self.place_features(&mut rows, streams);

        let mut rows: Vec<TimelineRow> = rows.into_values().collect();
        for score in SurveyScore::ALL {
            let (seed, scores) = bucket_survey(grid, survey, score);
            for row in rows.iter_mut() {
                *score.cell_mut(row) = MaskedValue::observe(scores.get(&row.time).copied());
            }
            self.carry_scores(&mut rows, seed, score);
        }

        Ok(IndividualTimeline {
            student_id: student_id.to_string(),
            rows,
        })
    }

    fn place_features(
        &self,
        rows: &mut BTreeMap<NaiveDateTime, TimelineRow>,
        streams: &ResampledStreams,
    ) {
        let number = |r: &ResampledRow| r.value.as_ref().and_then(Aggregate::as_number);
        let features = &streams.features;

        for r in &features.steps {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.steps = MaskedValue::observe(number(r));
            }
        }
        for r in &features.heart_rate {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.heart_rate = MaskedValue::observe(number(r));
            }
        }
        for r in &features.distance {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.distance = MaskedValue::observe(number(r));
            }
        }
        for r in &features.calories {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.calories = MaskedValue::observe(number(r));
                row.cal_state = r.state.clone();
                row.cal_state_interpreted = r.interpreted.clone();
            }
        }
        for r in &features.sleep {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.sleep_state = r
                    .value
                    .as_ref()
                    .and_then(Aggregate::as_category)
                    .map(str::to_string);
                row.sleep_state_interpreted = r.interpreted.clone();
            }
        }
        for r in &streams.minutes_asleep {
            if let Some(row) = rows.get_mut(&r.bucket_start) {
                row.minutes_asleep = MaskedValue::observe(number(r));
            }
        }

        if let Some(threshold) = self.non_wear_step_threshold {
            for row in rows.values_mut() {
                if row.steps.value().is_some_and(|steps| steps < threshold) {
                    blank_wearables(row);
                }
            }
        }
    }

    fn carry_scores(&self, rows: &mut [TimelineRow], seed: Option<f64>, score: SurveyScore) {
        let mut carry = seed;
        for row in rows.iter_mut() {
            let cell = score.cell_mut(row);
            match cell.value() {
                Some(value) => carry = Some(value),
                None => {
                    if let Some(value) = carry {
                        cell.fill(value);
                    }
                }
            }
        }

        if self.boundary == SurveyBoundary::Backfill {
            let first = rows
                .iter()
                .map(|row| score.cell(row))
                .find(|cell| !cell.was_missing())
                .and_then(|cell| cell.value());
            if let Some(value) = first {
                for row in rows.iter_mut() {
                    let cell = score.cell_mut(row);
                    if !cell.was_missing() {
                        break;
                    }
                    cell.fill(value);
                }
            }
        }
    }
}

fn blank_wearables(row: &mut TimelineRow) {
    row.heart_rate = MaskedValue::observe(None);
    row.calories = MaskedValue::observe(None);
    row.cal_state = None;
    row.cal_state_interpreted = None;
    row.distance = MaskedValue::observe(None);
    row.steps = MaskedValue::observe(None);
    row.minutes_asleep = MaskedValue::observe(None);
    row.sleep_state = None;
    row.sleep_state_interpreted = None;
}

/// Split responses into the carry seed (latest scored response before the
/// range) and the latest scored response per in-range bucket.
fn bucket_survey(
    grid: &TimeGrid,
    survey: &[SurveyResponse],
    score: SurveyScore,
) -> (Option<f64>, BTreeMap<NaiveDateTime, f64>) {
    let mut seed: Option<(NaiveDateTime, f64)> = None;
    let mut latest: BTreeMap<NaiveDateTime, (NaiveDateTime, f64)> = BTreeMap::new();

    for response in survey {
        let Some(score) = score.of(response).filter(|s| s.is_finite()) else {
            continue;
        };
        if response.timestamp < grid.start() {
            if seed.map_or(true, |(ts, _)| response.timestamp >= ts) {
                seed = Some((response.timestamp, score));
            }
            continue;
        }
        let Some(index) = grid.bucket_index(response.timestamp) else {
            continue;
        };
        let bucket = grid.bucket_start(index);
        let replace = latest
            .get(&bucket)
            .map_or(true, |(ts, _)| response.timestamp >= *ts);
        if replace {
            latest.insert(bucket, (response.timestamp, score));
        }
    }

    (
        seed.map(|(_, score)| score),
        latest.into_iter().map(|(bucket, (_, score))| (bucket, score)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resampler::Resampler;
    use crate::types::{BucketWidth, Event, FeatureStreams};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(d: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 6, d)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn make_grid(days: u32) -> TimeGrid {
        TimeGrid::new(at(1, 0), at(1 + days, 0), BucketWidth::DAILY).unwrap()
    }

    fn make_streams(grid: &TimeGrid, raw: FeatureStreams<Vec<Event>>) -> ResampledStreams {
        Resampler::resample_streams(grid, &raw)
    }

    fn response(d: u32, hour: u32, score: f64) -> SurveyResponse {
        SurveyResponse::new(at(d, hour), Some(score))
    }

    fn cesd(timeline: &IndividualTimeline) -> (Vec<Option<f64>>, Vec<u8>) {
        (
            timeline.rows.iter().map(|r| r.cesd.value()).collect(),
            timeline.rows.iter().map(|r| r.cesd.mask()).collect(),
        )
    }

    #[test]
    fn test_every_bucket_appears_once() {
        let grid = make_grid(3);
        let raw = FeatureStreams {
            steps: vec![Event::numeric(at(1, 8), 500.0)],
            heart_rate: vec![Event::numeric(at(3, 8), 72.0)],
            ..Default::default()
        };
        let streams = make_streams(&grid, raw);

        let timeline = Aligner::new().merge("s01", &grid, &streams, &[]).unwrap();

        let times: Vec<_> = timeline.rows.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![at(1, 0), at(2, 0), at(3, 0)]);
        assert_eq!(timeline.rows[0].steps.value(), Some(500.0));
        assert_eq!(timeline.rows[0].heart_rate.mask(), 1);
        assert_eq!(timeline.rows[2].heart_rate.value(), Some(72.0));
        assert_eq!(timeline.rows[2].steps.mask(), 1);
    }

    #[test]
    fn test_off_grid_rows_are_joined_in() {
        let grid = make_grid(2);
        let mut streams = make_streams(&grid, FeatureStreams::default());
        let mut extra = ResampledRow::empty(at(1, 12));
        extra.value = Some(Aggregate::Number(7.0));
        streams.features.distance.push(extra);

        let timeline = Aligner::new().merge("s01", &grid, &streams, &[]).unwrap();

        assert_eq!(timeline.rows.len(), 3);
        assert_eq!(timeline.rows[1].time, at(1, 12));
        assert_eq!(timeline.rows[1].distance.value(), Some(7.0));
    }

    #[test]
    fn test_backfill_fills_leading_buckets() {
        let grid = make_grid(3);
        let streams = make_streams(&grid, FeatureStreams::default());
        let survey = vec![response(2, 9, 12.0)];

        let timeline = Aligner::new()
            .with_boundary(SurveyBoundary::Backfill)
            .merge("s01", &grid, &streams, &survey)
            .unwrap();

        assert_eq!(
            cesd(&timeline),
            (vec![Some(12.0), Some(12.0), Some(12.0)], vec![1, 0, 1])
        );
    }

    #[test]
    fn test_forward_only_leaves_leading_buckets_missing() {
        let grid = make_grid(3);
        let streams = make_streams(&grid, FeatureStreams::default());
        let survey = vec![response(2, 9, 12.0)];

        let timeline = Aligner::new()
            .with_boundary(SurveyBoundary::ForwardOnly)
            .merge("s01", &grid, &streams, &survey)
            .unwrap();

        assert_eq!(cesd(&timeline), (vec![None, Some(12.0), Some(12.0)], vec![1, 0, 1]));
    }

    #[test]
    fn test_prior_response_seeds_carry() {
        let grid = make_grid(3);
        let streams = make_streams(&grid, FeatureStreams::default());
        let survey = vec![
            SurveyResponse::new(at(1, 0) - chrono::Duration::days(10), Some(4.0)),
            response(3, 10, 20.0),
            // at the range end, ignored
            response(4, 0, 30.0),
        ];

        let timeline = Aligner::new()
            .with_boundary(SurveyBoundary::ForwardOnly)
            .merge("s01", &grid, &streams, &survey)
            .unwrap();

        assert_eq!(
            cesd(&timeline),
            (vec![Some(4.0), Some(4.0), Some(20.0)], vec![1, 1, 0])
        );
    }

    #[test]
    fn test_latest_response_in_bucket_wins() {
        let grid = make_grid(1);
        let streams = make_streams(&grid, FeatureStreams::default());
        let survey = vec![response(1, 20, 9.0), response(1, 8, 15.0)];

        let timeline = Aligner::new().merge("s01", &grid, &streams, &survey).unwrap();

        assert_eq!(cesd(&timeline), (vec![Some(9.0)], vec![0]));
    }

    #[test]
    fn test_non_wear_buckets_are_blanked() {
        let grid = make_grid(2);
        let raw = FeatureStreams {
            steps: vec![Event::numeric(at(1, 8), 120.0), Event::numeric(at(2, 8), 4000.0)],
            heart_rate: vec![Event::numeric(at(1, 8), 65.0), Event::numeric(at(2, 8), 80.0)],
            sleep: vec![Event::categorical(at(1, 2), "asleep"), Event::categorical(at(2, 2), "1")],
            ..Default::default()
        };
        let streams = make_streams(&grid, raw);

        let timeline = Aligner::new()
            .with_non_wear_threshold(Some(250.0))
            .merge("s01", &grid, &streams, &[])
            .unwrap();

        let first = &timeline.rows[0];
        assert_eq!(first.steps.value(), None);
        assert_eq!(first.steps.mask(), 1);
        assert_eq!(first.heart_rate.mask(), 1);
        assert_eq!(first.sleep_state, None);
        assert_eq!(first.minutes_asleep.value(), None);
        assert_eq!(first.minutes_asleep.mask(), 1);
        assert_eq!(timeline.rows[1].heart_rate.value(), Some(80.0));
        assert_eq!(timeline.rows[1].minutes_asleep.value(), Some(1.0));
    }

    #[test]
    fn test_sleep_and_calorie_states_are_placed() {
        let grid = make_grid(1);
        let raw = FeatureStreams {
            calories: vec![Event::numeric(at(1, 3), 1.2)
                .with_state(Some("1".to_string()), Some("LIGHT".to_string()))],
            sleep: vec![Event::categorical(at(1, 2), "2").with_state(None, Some("ASLEEP".to_string()))],
            ..Default::default()
        };
        let streams = make_streams(&grid, raw);

        let timeline = Aligner::new().merge("s01", &grid, &streams, &[]).unwrap();
        let row = &timeline.rows[0];

        assert_eq!(row.cal_state.as_deref(), Some("1"));
        assert_eq!(row.cal_state_interpreted.as_deref(), Some("LIGHT"));
        assert_eq!(row.sleep_state.as_deref(), Some("2"));
        assert_eq!(row.sleep_state_interpreted.as_deref(), Some("ASLEEP"));
    }

    #[test]
    fn test_stai_is_carried_like_cesd() {
        let grid = make_grid(4);
        let streams = make_streams(&grid, FeatureStreams::default());
        let survey = vec![
            SurveyResponse::new(at(2, 9), Some(12.0)).with_stai(Some(41.0)),
            SurveyResponse::new(at(4, 9), Some(18.0)),
        ];

        let timeline = Aligner::new().merge("s01", &grid, &streams, &survey).unwrap();

        let stai: Vec<_> = timeline.rows.iter().map(|r| r.stai.value()).collect();
        let masks: Vec<_> = timeline.rows.iter().map(|r| r.stai.mask()).collect();
        assert_eq!(stai, vec![Some(41.0), Some(41.0), Some(41.0), Some(41.0)]);
        assert_eq!(masks, vec![1, 0, 1, 1]);
        assert_eq!(
            cesd(&timeline),
            (vec![Some(12.0), Some(12.0), Some(12.0), Some(18.0)], vec![1, 0, 1, 0])
        );
    }

    #[test]
    fn test_minutes_asleep_are_placed_with_masks() {
        let grid = make_grid(2);
        let raw = FeatureStreams {
            sleep: vec![
                Event::categorical(at(1, 1), "2").with_state(None, Some("ASLEEP".to_string())),
                Event::categorical(at(1, 2), "2").with_state(None, Some("ASLEEP".to_string())),
            ],
            ..Default::default()
        };
        let streams = make_streams(&grid, raw);

        let timeline = Aligner::new().merge("s01", &grid, &streams, &[]).unwrap();

        assert_eq!(timeline.rows[0].minutes_asleep.value(), Some(2.0));
        assert_eq!(timeline.rows[0].minutes_asleep.mask(), 0);
        assert_eq!(timeline.rows[0].hours_asleep(), Some(2.0 / 60.0));
        assert_eq!(timeline.rows[1].minutes_asleep.value(), None);
        assert_eq!(timeline.rows[1].minutes_asleep.mask(), 1);
    }
}
