//! Wearable and survey export files
//!
//! Fitbit exports one CSV per feature and day, named `<feature><YYYYMMDD>.csv`.
//! Survey exports (CSV or `.xlsx`) carry a `StartDate` timestamp per row, a
//! `CESD` score and either a `STAI` total or the `STAI_St_*` item columns.

use crate::error::PipelineError;
use crate::types::{Event, EventValue, Feature, SurveyResponse};
use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// Prefixes of vendor summary exports that are never loaded
pub const SUMMARY_PREFIXES: [&str; 4] = [
    "heartsummary",
    "stepssummary",
    "sleepsummary",
    "activiessummary",
];

/// Prefixes that mark a file as a feature export
const FEATURE_PREFIXES: [&str; 5] = ["heart", "step", "distance", "sleep", "calories"];

const TIMESTAMP_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

const TIME_FORMATS: [&str; 4] = ["%H:%M:%S", "%I:%M:%S %p", "%H:%M", "%I:%M %p"];

fn export_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?P<prefix>[a-z]+)(?P<date>\d*)\.csv$")
            .expect("export filename pattern is a valid regex")
    })
}

fn feature_for_prefix(prefix: &str) -> Option<Feature> {
    match prefix.to_ascii_lowercase().as_str() {
        "heart" => Some(Feature::HeartRate),
        "step" | "steps" => Some(Feature::Steps),
        "distance" => Some(Feature::Distance),
        "sleep" => Some(Feature::Sleep),
        "calories" => Some(Feature::Calories),
        _ => None,
    }
}

/// Parse a wearable export filename into its feature and day.
///
/// Returns `Ok(None)` for files that are not feature exports (summaries,
/// notes, other vendors). A CSV named after a feature that does not follow
/// `<feature><YYYYMMDD>.csv` exactly is an error.
pub fn parse_export_filename(name: &str) -> Result<Option<(Feature, NaiveDate)>, PipelineError> {
    let lower = name.to_ascii_lowercase();
    if !lower.ends_with(".csv") || SUMMARY_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return Ok(None);
    }
    if !FEATURE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return Ok(None);
    }

    let Some(captures) = export_filename_pattern().captures(name) else {
        return Err(PipelineError::InvalidFilename(format!(
            "{}: expected <feature><YYYYMMDD>.csv",
            name
        )));
    };
    let prefix = captures.name("prefix").map(|m| m.as_str()).unwrap_or_default();
    let Some(feature) = feature_for_prefix(prefix) else {
        return Err(PipelineError::InvalidFilename(format!(
            "{}: unknown feature '{}'",
            name, prefix
        )));
    };

    let digits = captures.name("date").map(|m| m.as_str()).unwrap_or_default();
    if digits.len() != 8 {
        return Err(PipelineError::InvalidFilename(format!(
            "{}: expected an 8-digit YYYYMMDD date",
            name
        )));
    }
    let date = NaiveDate::parse_from_str(digits, "%Y%m%d")
        .map_err(|e| PipelineError::InvalidFilename(format!("{}: {}", name, e)))?;

    Ok(Some((feature, date)))
}

/// Parse a full timestamp, accepting a bare date as midnight
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, PipelineError> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }
    Err(PipelineError::DateParseError(format!(
        "unrecognized timestamp '{}'",
        raw
    )))
}

/// Time of day of a `Time` cell, which may or may not carry a date
fn parse_time_of_day(raw: &str) -> Result<NaiveTime, PipelineError> {
    let trimmed = raw.trim();
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, format) {
            return Ok(time);
        }
    }
    parse_timestamp(trimmed).map(|ts| ts.time())
}

/// One row of a feature export; only the feature's own columns are present
#[derive(Debug, Deserialize)]
struct ExportRecord {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Heart Rate", default)]
    heart_rate: Option<String>,
    #[serde(rename = "Step", alias = "Steps", default)]
    steps: Option<String>,
    #[serde(rename = "Distance", default)]
    distance: Option<String>,
    #[serde(rename = "Calories", default)]
    calories: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "Interpreted", default)]
    interpreted: Option<String>,
}

fn non_empty(cell: Option<String>) -> Option<String> {
    cell.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Read one daily feature export.
///
/// Every `Time` value is moved onto `date`, keeping its time of day. Rows
/// keep their file order.
pub fn read_feature_file<R: Read>(
    reader: R,
    feature: Feature,
    date: NaiveDate,
) -> Result<Vec<Event>, PipelineError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut events = Vec::new();

    for record in csv_reader.deserialize::<ExportRecord>() {
        let record = record?;
        let timestamp = date.and_time(parse_time_of_day(&record.time)?);
        let raw = |cell: &Option<String>| cell.as_deref().unwrap_or_default().to_string();

        let event = match feature {
            Feature::HeartRate => Event {
                timestamp,
                value: EventValue::numeric(&raw(&record.heart_rate)),
                state: None,
                interpreted: None,
            },
            Feature::Steps => Event {
                timestamp,
                value: EventValue::numeric(&raw(&record.steps)),
                state: None,
                interpreted: None,
            },
            Feature::Distance => Event {
                timestamp,
                value: EventValue::numeric(&raw(&record.distance)),
                state: None,
                interpreted: None,
            },
            Feature::Calories => Event {
                timestamp,
                value: EventValue::numeric(&raw(&record.calories)),
                state: non_empty(record.state),
                interpreted: non_empty(record.interpreted),
            },
            Feature::Sleep => Event {
                timestamp,
                value: EventValue::categorical(&raw(&record.state)),
                state: None,
                interpreted: non_empty(record.interpreted),
            },
        };
        events.push(event);
    }

    Ok(events)
}

const START_DATE_COLUMN: &str = "StartDate";
const CESD_COLUMN: &str = "CESD";
const STAI_TOTAL_COLUMN: &str = "STAI";
const STAI_ITEM_MARKER: &str = "STAI_St_";

/// Column positions of a survey export, resolved from its header row
#[derive(Debug, Clone, PartialEq)]
struct SurveyLayout {
    start_date: usize,
    cesd: Option<usize>,
    /// The `STAI` total when present, otherwise every `STAI_St_*` item
    stai: Vec<usize>,
}

impl SurveyLayout {
    fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self, PipelineError> {
        let name = |header: &S| header.as_ref().trim_start_matches('\u{feff}').trim().to_string();
        let position = |wanted: &str| headers.iter().position(|h| name(h) == wanted);

        let start_date = position(START_DATE_COLUMN).ok_or_else(|| {
            PipelineError::ParseError(format!(
                "survey export has no '{}' column",
                START_DATE_COLUMN
            ))
        })?;
        let stai = match position(STAI_TOTAL_COLUMN) {
            Some(total) => vec![total],
            None => headers
                .iter()
                .enumerate()
                .filter(|(_, h)| name(*h).contains(STAI_ITEM_MARKER))
                .map(|(index, _)| index)
                .collect(),
        };

        Ok(Self {
            start_date,
            cesd: position(CESD_COLUMN),
            stai,
        })
    }

    /// Parse one data row. Rows without a start date yield `None`.
    fn response<S: AsRef<str>>(&self, cells: &[S]) -> Result<Option<SurveyResponse>, PipelineError> {
        let cell = |index: usize| cells.get(index).map(|c| c.as_ref().trim()).unwrap_or_default();
        let number = |index: usize| EventValue::numeric(cell(index)).as_number();

        let start = cell(self.start_date);
        if start.is_empty() {
            return Ok(None);
        }

        let items: Vec<f64> = self.stai.iter().filter_map(|&index| number(index)).collect();
        // a zero total means the inventory was not answered
        let stai = (!items.is_empty())
            .then(|| items.iter().sum::<f64>())
            .filter(|total| *total != 0.0);

        Ok(Some(
            SurveyResponse::new(parse_timestamp(start)?, self.cesd.and_then(number)).with_stai(stai),
        ))
    }
}

/// Read a CSV survey export. Rows with an unreadable `StartDate` are an
/// error; an unreadable score is treated as missing.
pub fn read_survey_file<R: Read>(reader: R) -> Result<Vec<SurveyResponse>, PipelineError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let layout = SurveyLayout::from_headers(&headers)?;

    let mut responses = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().collect();
        if let Some(response) = layout.response(&cells)? {
            responses.push(response);
        }
    }

    Ok(responses)
}

/// Read the first worksheet of an `.xlsx` survey export with the same column
/// rules as [`read_survey_file`].
pub fn read_survey_workbook(path: &Path) -> Result<Vec<SurveyResponse>, PipelineError> {
    let spreadsheet_error =
        |err: XlsxError| PipelineError::Spreadsheet(format!("{}: {}", path.display(), err));

    let mut workbook: Xlsx<_> = open_workbook(path).map_err(spreadsheet_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            PipelineError::Spreadsheet(format!("{}: workbook has no worksheet", path.display()))
        })?
        .map_err(spreadsheet_error)?;

    read_survey_rows(range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<String>>()))
}

/// Survey rows with the header row first
fn read_survey_rows(
    mut rows: impl Iterator<Item = Vec<String>>,
) -> Result<Vec<SurveyResponse>, PipelineError> {
    let Some(headers) = rows.next() else {
        return Ok(Vec::new());
    };
    let layout = SurveyLayout::from_headers(&headers)?;

    let mut responses = Vec::new();
    for cells in rows {
        if let Some(response) = layout.response(&cells)? {
            responses.push(response);
        }
    }
    Ok(responses)
}

/// Text of a worksheet cell as it would appear in a CSV export
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::DateTime(value) => value
            .as_datetime()
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}
