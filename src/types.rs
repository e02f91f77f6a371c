//! Core types for the flux-cohort pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw events, the time grid, resampled rows, feature stream records
//! and the aligned per-individual timeline.

use crate::error::PipelineError;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wearable feature streams exported per individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Steps,
    HeartRate,
    Distance,
    Sleep,
    Calories,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Steps,
        Feature::HeartRate,
        Feature::Distance,
        Feature::Sleep,
        Feature::Calories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Steps => "steps",
            Feature::HeartRate => "heart_rate",
            Feature::Distance => "distance",
            Feature::Sleep => "sleep",
            Feature::Calories => "calories",
        }
    }

    /// Reducer used when collapsing a bucket of this feature's events.
    /// The assignment is fixed and not configurable per run.
    pub fn reducer(&self) -> Reducer {
        match self {
            Feature::Steps | Feature::Distance | Feature::Calories => Reducer::Sum,
            Feature::HeartRate => Reducer::Mean,
            Feature::Sleep => Reducer::Mode,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation applied to all events that fall into one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Sum,
    Mean,
    Mode,
}

/// Unit of a bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl WidthUnit {
    fn seconds(&self) -> i64 {
        match self {
            WidthUnit::Second => 1,
            WidthUnit::Minute => 60,
            WidthUnit::Hour => 3_600,
            WidthUnit::Day => 86_400,
            WidthUnit::Week => 604_800,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            WidthUnit::Second => "S",
            WidthUnit::Minute => "min",
            WidthUnit::Hour => "H",
            WidthUnit::Day => "D",
            WidthUnit::Week => "W",
        }
    }
}

/// Fixed bucket width, written as a frequency string such as `D`, `12H` or `30min`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketWidth {
    count: u32,
    unit: WidthUnit,
}

impl BucketWidth {
    pub const DAILY: BucketWidth = BucketWidth {
        count: 1,
        unit: WidthUnit::Day,
    };

    pub const HALF_DAY: BucketWidth = BucketWidth {
        count: 12,
        unit: WidthUnit::Hour,
    };

    pub fn new(count: u32, unit: WidthUnit) -> Result<Self, PipelineError> {
        if count == 0 {
            return Err(PipelineError::InvalidBucketWidth(
                "bucket width must be positive".to_string(),
            ));
        }
        Ok(Self { count, unit })
    }

    pub fn num_seconds(&self) -> i64 {
        self.count as i64 * self.unit.seconds()
    }

    fn num_milliseconds(&self) -> i64 {
        self.num_seconds() * 1_000
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.num_seconds())
    }
}

impl FromStr for BucketWidth {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<u32>().map_err(|e| {
                PipelineError::InvalidBucketWidth(format!("'{}': {}", s, e))
            })?
        };

        let unit = match unit.trim() {
            "S" | "s" => WidthUnit::Second,
            "T" | "min" => WidthUnit::Minute,
            "H" | "h" => WidthUnit::Hour,
            "D" | "d" => WidthUnit::Day,
            "W" | "w" => WidthUnit::Week,
            other => {
                return Err(PipelineError::InvalidBucketWidth(format!(
                    "unsupported unit '{}' in '{}'",
                    other, s
                )))
            }
        };

        Self::new(count, unit)
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl TryFrom<String> for BucketWidth {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BucketWidth> for String {
    fn from(width: BucketWidth) -> Self {
        width.to_string()
    }
}

/// Half-open time range partitioned into fixed-width buckets.
///
/// Bucket `i` covers `[start + i * width, start + (i + 1) * width)`, clipped to
/// `end`. The final partial bucket is part of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    start: NaiveDateTime,
    end: NaiveDateTime,
    width: BucketWidth,
}

impl TimeGrid {
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        width: BucketWidth,
    ) -> Result<Self, PipelineError> {
        if end <= start {
            return Err(PipelineError::InvalidRange(format!(
                "range end {} is not after range start {}",
                end, start
            )));
        }
        Ok(Self { start, end, width })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn width(&self) -> BucketWidth {
        self.width
    }

    /// Number of buckets: `ceil((end - start) / width)`
    pub fn len(&self) -> usize {
        let span = (self.end - self.start).num_milliseconds();
        let width = self.width.num_milliseconds();
        ((span + width - 1) / width) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_start(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::milliseconds(self.width.num_milliseconds() * index as i64)
    }

    pub fn bucket_starts(&self) -> impl Iterator<Item = NaiveDateTime> {
        let grid = *self;
        (0..grid.len()).map(move |i| grid.bucket_start(i))
    }

    /// Bucket containing `timestamp`, or `None` outside `[start, end)`
    pub fn bucket_index(&self, timestamp: NaiveDateTime) -> Option<usize> {
        if timestamp < self.start || timestamp >= self.end {
            return None;
        }
        let offset = (timestamp - self.start).num_milliseconds();
        Some((offset / self.width.num_milliseconds()) as usize)
    }
}

/// Value carried by a raw event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventValue {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl EventValue {
    /// Coerce raw text to a number; unparseable or non-finite text becomes `Missing`
    pub fn numeric(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => EventValue::Numeric(value),
            _ => EventValue::Missing,
        }
    }

    pub fn categorical(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            EventValue::Missing
        } else {
            EventValue::Categorical(trimmed.to_string())
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            EventValue::Numeric(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            EventValue::Categorical(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// One timestamped reading from a wearable export
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: NaiveDateTime,
    pub value: EventValue,
    /// Activity or sleep state reported next to the reading
    pub state: Option<String>,
    /// Vendor interpretation of the state (e.g. "ASLEEP")
    pub interpreted: Option<String>,
}

impl Event {
    pub fn numeric(timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            timestamp,
            value: EventValue::Numeric(value),
            state: None,
            interpreted: None,
        }
    }

    pub fn categorical(timestamp: NaiveDateTime, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: EventValue::Categorical(value.into()),
            state: None,
            interpreted: None,
        }
    }

    pub fn with_state(mut self, state: Option<String>, interpreted: Option<String>) -> Self {
        self.state = state;
        self.interpreted = interpreted;
        self
    }
}

/// One survey submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub timestamp: NaiveDateTime,
    /// CES-D depression score
    pub cesd: Option<f64>,
    /// STAI state anxiety score
    pub stai: Option<f64>,
}

impl SurveyResponse {
    pub fn new(timestamp: NaiveDateTime, cesd: Option<f64>) -> Self {
        Self {
            timestamp,
            cesd,
            stai: None,
        }
    }

    pub fn with_stai(mut self, stai: Option<f64>) -> Self {
        self.stai = stai;
        self
    }
}

/// Reduced value of one bucket
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Number(f64),
    Category(String),
}

impl Aggregate {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Aggregate::Number(value) => Some(*value),
            Aggregate::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Aggregate::Category(value) => Some(value.as_str()),
            Aggregate::Number(_) => None,
        }
    }
}

/// One bucket of a resampled feature series
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledRow {
    pub bucket_start: NaiveDateTime,
    pub value: Option<Aggregate>,
    pub state: Option<String>,
    pub interpreted: Option<String>,
}

impl ResampledRow {
    pub fn empty(bucket_start: NaiveDateTime) -> Self {
        Self {
            bucket_start,
            value: None,
            state: None,
            interpreted: None,
        }
    }

    /// Turn the bucket back into a single event stamped at the bucket start
    pub fn to_event(&self) -> Event {
        let value = match &self.value {
            Some(Aggregate::Number(v)) => EventValue::Numeric(*v),
            Some(Aggregate::Category(c)) => EventValue::Categorical(c.clone()),
            None => EventValue::Missing,
        };
        Event {
            timestamp: self.bucket_start,
            value,
            state: self.state.clone(),
            interpreted: self.interpreted.clone(),
        }
    }
}

/// One named slot per wearable feature.
///
/// Used both for the raw event streams of an individual and for their
/// resampled counterparts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureStreams<T> {
    pub steps: T,
    pub heart_rate: T,
    pub distance: T,
    pub sleep: T,
    pub calories: T,
}

impl<T> FeatureStreams<T> {
    pub fn get(&self, feature: Feature) -> &T {
        match feature {
            Feature::Steps => &self.steps,
            Feature::HeartRate => &self.heart_rate,
            Feature::Distance => &self.distance,
            Feature::Sleep => &self.sleep,
            Feature::Calories => &self.calories,
        }
    }

    pub fn get_mut(&mut self, feature: Feature) -> &mut T {
        match feature {
            Feature::Steps => &mut self.steps,
            Feature::HeartRate => &mut self.heart_rate,
            Feature::Distance => &mut self.distance,
            Feature::Sleep => &mut self.sleep,
            Feature::Calories => &mut self.calories,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Feature, &T) -> U) -> FeatureStreams<U> {
        FeatureStreams {
            steps: f(Feature::Steps, &self.steps),
            heart_rate: f(Feature::HeartRate, &self.heart_rate),
            distance: f(Feature::Distance, &self.distance),
            sleep: f(Feature::Sleep, &self.sleep),
            calories: f(Feature::Calories, &self.calories),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, &T)> {
        Feature::ALL.into_iter().map(move |feature| (feature, self.get(feature)))
    }
}

/// Resampled series of one individual, ready for alignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResampledStreams {
    pub features: FeatureStreams<Vec<ResampledRow>>,
    /// Minutes classified asleep per bucket, derived from the sleep stream
    pub minutes_asleep: Vec<ResampledRow>,
}

/// Numeric cell with a missingness mask.
///
/// The mask is fixed when the value is observed. Filling only writes into a
/// missing value and never touches the mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedValue {
    value: Option<f64>,
    missing: bool,
}

impl Default for MaskedValue {
    fn default() -> Self {
        Self::observe(None)
    }
}

impl MaskedValue {
    pub fn observe(value: Option<f64>) -> Self {
        let value = value.filter(|v| v.is_finite());
        Self {
            missing: value.is_none(),
            value,
        }
    }

    /// Rebuild a cell from a stored value and its stored mask
    pub(crate) fn restore(value: Option<f64>, missing: bool) -> Self {
        Self { value, missing }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// 1 if the value was absent before any fill, 0 otherwise
    pub fn mask(&self) -> u8 {
        u8::from(self.missing)
    }

    pub fn was_missing(&self) -> bool {
        self.missing
    }

    pub fn is_imputed(&self) -> bool {
        self.missing && self.value.is_some()
    }

    /// Write `value` into an empty cell. Returns whether anything changed.
    pub fn fill(&mut self, value: f64) -> bool {
        if self.value.is_none() && value.is_finite() {
            self.value = Some(value);
            true
        } else {
            false
        }
    }
}

/// Depression risk derived from a CES-D score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepressionState {
    #[serde(rename = "Depressed")]
    Depressed,
    #[serde(rename = "Not Depressed")]
    NotDepressed,
}

impl DepressionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepressionState::Depressed => "Depressed",
            DepressionState::NotDepressed => "Not Depressed",
        }
    }

    /// Binary encoding: 1 for `Depressed`, 0 otherwise
    pub fn interpretation(&self) -> u8 {
        match self {
            DepressionState::Depressed => 1,
            DepressionState::NotDepressed => 0,
        }
    }

    pub fn from_interpretation(code: u8) -> Option<Self> {
        match code {
            1 => Some(DepressionState::Depressed),
            0 => Some(DepressionState::NotDepressed),
            _ => None,
        }
    }
}

impl FromStr for DepressionState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Depressed" => Ok(DepressionState::Depressed),
            "Not Depressed" => Ok(DepressionState::NotDepressed),
            other => Err(PipelineError::ParseError(format!(
                "unknown depression state '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DepressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeline columns that are mean-imputed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericColumn {
    HeartRate,
    Calories,
    Distance,
    Steps,
    MinutesAsleep,
}

impl NumericColumn {
    pub const ALL: [NumericColumn; 5] = [
        NumericColumn::HeartRate,
        NumericColumn::Calories,
        NumericColumn::Distance,
        NumericColumn::Steps,
        NumericColumn::MinutesAsleep,
    ];

    pub fn feature(&self) -> Feature {
        match self {
            NumericColumn::HeartRate => Feature::HeartRate,
            NumericColumn::Calories => Feature::Calories,
            NumericColumn::Distance => Feature::Distance,
            NumericColumn::Steps => Feature::Steps,
            NumericColumn::MinutesAsleep => Feature::Sleep,
        }
    }

    /// Name used for the feature column of reshaped tables
    pub fn display_name(&self) -> &'static str {
        match self {
            NumericColumn::HeartRate => "Heart Rate",
            NumericColumn::Calories => "Calories Burned",
            NumericColumn::Distance => "Distance Traveled",
            NumericColumn::Steps => "Steps Taken",
            NumericColumn::MinutesAsleep => "Hours Slept",
        }
    }

    /// Value carried into reshaped tables. Sleep is reported in hours.
    pub fn wide_value(&self, row: &TimelineRow) -> Option<f64> {
        match self {
            NumericColumn::MinutesAsleep => row.hours_asleep(),
            column => row.numeric(*column).value(),
        }
    }
}

/// One bucket of an individual's aligned timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    pub time: NaiveDateTime,
    pub heart_rate: MaskedValue,
    pub calories: MaskedValue,
    pub cal_state: Option<String>,
    pub cal_state_interpreted: Option<String>,
    pub distance: MaskedValue,
    pub steps: MaskedValue,
    pub minutes_asleep: MaskedValue,
    pub sleep_state: Option<String>,
    pub sleep_state_interpreted: Option<String>,
    pub stai: MaskedValue,
    pub cesd: MaskedValue,
    pub cesd_state: Option<DepressionState>,
}

impl TimelineRow {
    pub fn empty(time: NaiveDateTime) -> Self {
        Self {
            time,
            heart_rate: MaskedValue::default(),
            calories: MaskedValue::default(),
            cal_state: None,
            cal_state_interpreted: None,
            distance: MaskedValue::default(),
            steps: MaskedValue::default(),
            minutes_asleep: MaskedValue::default(),
            sleep_state: None,
            sleep_state_interpreted: None,
            stai: MaskedValue::default(),
            cesd: MaskedValue::default(),
            cesd_state: None,
        }
    }

    pub fn numeric(&self, column: NumericColumn) -> &MaskedValue {
        match column {
            NumericColumn::HeartRate => &self.heart_rate,
            NumericColumn::Calories => &self.calories,
            NumericColumn::Distance => &self.distance,
            NumericColumn::Steps => &self.steps,
            NumericColumn::MinutesAsleep => &self.minutes_asleep,
        }
    }

    pub fn numeric_mut(&mut self, column: NumericColumn) -> &mut MaskedValue {
        match column {
            NumericColumn::HeartRate => &mut self.heart_rate,
            NumericColumn::Calories => &mut self.calories,
            NumericColumn::Distance => &mut self.distance,
            NumericColumn::Steps => &mut self.steps,
            NumericColumn::MinutesAsleep => &mut self.minutes_asleep,
        }
    }

    pub fn hours_asleep(&self) -> Option<f64> {
        self.minutes_asleep.value().map(|minutes| minutes / 60.0)
    }

    pub fn cesd_interpretation(&self) -> Option<u8> {
        self.cesd_state.map(|state| state.interpretation())
    }
}

/// Aligned, filled and labelled rows for one individual
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualTimeline {
    pub student_id: String,
    pub rows: Vec<TimelineRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_bucket_width_parsing() {
        assert_eq!("D".parse::<BucketWidth>().unwrap(), BucketWidth::DAILY);
        assert_eq!("12H".parse::<BucketWidth>().unwrap(), BucketWidth::HALF_DAY);
        assert_eq!("30min".parse::<BucketWidth>().unwrap().num_seconds(), 1_800);
        assert_eq!("W".parse::<BucketWidth>().unwrap().num_seconds(), 604_800);
        assert!("0H".parse::<BucketWidth>().is_err());
        assert!("3M".parse::<BucketWidth>().is_err());
        assert!("".parse::<BucketWidth>().is_err());
    }

    #[test]
    fn test_bucket_width_serde() {
        let width: BucketWidth = serde_json::from_str("\"12H\"").unwrap();
        assert_eq!(width, BucketWidth::HALF_DAY);
        assert_eq!(serde_json::to_string(&BucketWidth::DAILY).unwrap(), "\"1D\"");
    }

    #[test]
    fn test_grid_includes_partial_bucket() {
        // 2.5 days at daily width -> 3 buckets, the last one partial
        let grid = TimeGrid::new(at(1, 0), at(3, 12), BucketWidth::DAILY).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.bucket_start(2), at(3, 0));
        assert_eq!(grid.bucket_index(at(3, 11)), Some(2));
        assert_eq!(grid.bucket_index(at(3, 12)), None);
        assert_eq!(grid.bucket_index(at(1, 0)), Some(0));
    }

    #[test]
    fn test_grid_rejects_empty_range() {
        let result = TimeGrid::new(at(2, 0), at(2, 0), BucketWidth::DAILY);
        assert!(matches!(result, Err(PipelineError::InvalidRange(_))));

        let result = TimeGrid::new(at(3, 0), at(2, 0), BucketWidth::DAILY);
        assert!(matches!(result, Err(PipelineError::InvalidRange(_))));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(EventValue::numeric(" 42 "), EventValue::Numeric(42.0));
        assert_eq!(EventValue::numeric("n/a"), EventValue::Missing);
        assert_eq!(EventValue::numeric("NaN"), EventValue::Missing);
        assert_eq!(EventValue::categorical("  "), EventValue::Missing);
    }

    #[test]
    fn test_masked_value_fill_keeps_mask() {
        let mut observed = MaskedValue::observe(Some(3.0));
        assert!(!observed.fill(9.0));
        assert_eq!(observed.value(), Some(3.0));
        assert_eq!(observed.mask(), 0);

        let mut missing = MaskedValue::observe(None);
        assert_eq!(missing.mask(), 1);
        assert!(missing.fill(9.0));
        assert_eq!(missing.value(), Some(9.0));
        assert_eq!(missing.mask(), 1);
        assert!(missing.is_imputed());
    }

    #[test]
    fn test_depression_state_round_trips_through_interpretation() {
        for state in [DepressionState::Depressed, DepressionState::NotDepressed] {
            assert_eq!(
                DepressionState::from_interpretation(state.interpretation()),
                Some(state)
            );
            assert_eq!(state.as_str().parse::<DepressionState>().unwrap(), state);
        }
        assert_eq!(DepressionState::from_interpretation(2), None);
    }

    #[test]
    fn test_sleep_is_reshaped_in_hours() {
        let mut row = TimelineRow::empty(at(1, 0));
        row.minutes_asleep = MaskedValue::observe(Some(450.0));
        row.steps = MaskedValue::observe(Some(1200.0));

        assert_eq!(NumericColumn::MinutesAsleep.wide_value(&row), Some(7.5));
        assert_eq!(NumericColumn::Steps.wide_value(&row), Some(1200.0));
        assert_eq!(NumericColumn::HeartRate.wide_value(&row), None);
    }

    #[test]
    fn test_feature_reducers_are_fixed() {
        assert_eq!(Feature::Steps.reducer(), Reducer::Sum);
        assert_eq!(Feature::Distance.reducer(), Reducer::Sum);
        assert_eq!(Feature::Calories.reducer(), Reducer::Sum);
        assert_eq!(Feature::HeartRate.reducer(), Reducer::Mean);
        assert_eq!(Feature::Sleep.reducer(), Reducer::Mode);
    }
}
