//! Resampling of irregular feature series onto a fixed time grid
//!
//! Every bucket of the grid produces exactly one row. Values are reduced with
//! the feature's reducer, and the secondary state columns always reduce by
//! mode.

use crate::error::PipelineError;
use crate::types::{
    Aggregate, BucketWidth, Event, FeatureStreams, Reducer, ResampledRow, ResampledStreams,
    TimeGrid,
};
use chrono::NaiveDateTime;

/// Collapses irregular events into fixed-width buckets
pub struct Resampler;

impl Resampler {
    /// Resample `events` onto an existing grid.
    ///
    /// Events outside the grid range are dropped. Events keep their original
    /// order inside a bucket, which decides mode ties.
    pub fn resample_on(grid: &TimeGrid, events: &[Event], reducer: Reducer) -> Vec<ResampledRow> {
        let mut buckets: Vec<Vec<&Event>> = vec![Vec::new(); grid.len()];
        for event in events {
            if let Some(index) = grid.bucket_index(event.timestamp) {
                buckets[index].push(event);
            }
        }

        buckets
            .iter()
            .enumerate()
            .map(|(index, bucket)| ResampledRow {
                bucket_start: grid.bucket_start(index),
                value: reduce(reducer, bucket),
                state: mode_of(bucket.iter().filter_map(|e| e.state.as_deref())),
                interpreted: mode_of(bucket.iter().filter_map(|e| e.interpreted.as_deref())),
            })
            .collect()
    }

    /// Minutes classified asleep per bucket.
    ///
    /// Sleep exports log one stage per minute, so each asleep event counts one
    /// minute. A bucket without any staged sleep event stays missing.
    pub fn minutes_asleep(grid: &TimeGrid, events: &[Event]) -> Vec<ResampledRow> {
        let mut minutes: Vec<Option<f64>> = vec![None; grid.len()];
        for event in events {
            let (Some(index), Some(asleep)) = (grid.bucket_index(event.timestamp), sleep_stage(event))
            else {
                continue;
            };
            let total = minutes[index].get_or_insert(0.0);
            if asleep {
                *total += 1.0;
            }
        }

        minutes
            .into_iter()
            .enumerate()
            .map(|(index, total)| ResampledRow {
                value: total.map(Aggregate::Number),
                ..ResampledRow::empty(grid.bucket_start(index))
            })
            .collect()
    }

    /// Resample every raw stream of one individual onto `grid`
    pub fn resample_streams(grid: &TimeGrid, raw: &FeatureStreams<Vec<Event>>) -> ResampledStreams {
        ResampledStreams {
            features: raw.map(|feature, events| Self::resample_on(grid, events, feature.reducer())),
            minutes_asleep: Self::minutes_asleep(grid, &raw.sleep),
        }
    }
}

/// Whether a sleep event is an asleep stage, or `None` when it carries no stage.
///
/// The interpreted label wins; a raw stage of `1` is asleep in the classic
/// stage coding.
fn sleep_stage(event: &Event) -> Option<bool> {
    if let Some(interpreted) = event.interpreted.as_deref() {
        return Some(interpreted.trim().eq_ignore_ascii_case("asleep"));
    }
    let stage = event.value.as_category()?.trim();
    Some(stage == "1" || stage.eq_ignore_ascii_case("asleep"))
}

/// Resample one feature series onto `[range_start, range_end)`.
///
/// # Errors
/// `InvalidRange` when `range_end` is not after `range_start`.
pub fn resample(
    events: &[Event],
    width: BucketWidth,
    reducer: Reducer,
    range_start: NaiveDateTime,
    range_end: NaiveDateTime,
) -> Result<Vec<ResampledRow>, PipelineError> {
    let grid = TimeGrid::new(range_start, range_end, width)?;
    Ok(Resampler::resample_on(&grid, events, reducer))
}

fn reduce(reducer: Reducer, bucket: &[&Event]) -> Option<Aggregate> {
    match reducer {
        Reducer::Sum => {
            let mut numbers = bucket.iter().filter_map(|e| e.value.as_number()).peekable();
            // an all-missing bucket stays missing instead of summing to zero
            numbers.peek()?;
            Some(Aggregate::Number(numbers.sum()))
        }
        Reducer::Mean => {
            let (sum, count) = bucket
                .iter()
                .filter_map(|e| e.value.as_number())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| Aggregate::Number(sum / count as f64))
        }
        Reducer::Mode => {
            mode_of(bucket.iter().filter_map(|e| e.value.as_category())).map(Aggregate::Category)
        }
    }
}

/// Most frequent value; ties go to the value seen first
fn mode_of<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}
