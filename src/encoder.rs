//! CSV encoding of pipeline tables
//!
//! Headers are stable and written in schema order. Timestamps use
//! `%Y-%m-%d %H:%M:%S`, missing cells are empty and masks are `0`/`1`.

use crate::error::PipelineError;
use crate::labeler::{LabelStrategy, StudentLabel};
use crate::reshape::WideRow;
use crate::schema::parse_timestamp;
use crate::table::{Column, CorpusRow, CorpusTable, TableSchema};
use crate::types::{DepressionState, IndividualTimeline, MaskedValue, TimelineRow};
use std::io::{Read, Write};

/// Timestamp format of every `Time` cell
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads and writes cohort, corpus, label and wide tables
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvEncoder;

impl CsvEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Write rows given as (cohort, student, row) under `schema`
    pub fn write_rows<'a, W: Write>(
        &self,
        schema: &TableSchema,
        rows: impl Iterator<Item = (&'a str, &'a str, &'a TimelineRow)>,
        writer: W,
    ) -> Result<(), PipelineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(schema.headers())?;
        for (cohort, student_id, row) in rows {
            let record: Vec<String> = schema
                .columns()
                .iter()
                .map(|column| cell(*column, cohort, student_id, row))
                .collect();
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write one individual's timeline
    pub fn write_timeline<W: Write>(
        &self,
        cohort: &str,
        schema: &TableSchema,
        timeline: &IndividualTimeline,
        writer: W,
    ) -> Result<(), PipelineError> {
        let rows = timeline
            .rows
            .iter()
            .map(|row| (cohort, timeline.student_id.as_str(), row));
        self.write_rows(schema, rows, writer)
    }

    /// Read a cohort or corpus table back into typed rows.
    ///
    /// # Errors
    /// `SchemaMismatch` for unknown or missing key headers, `ParseError` for
    /// unreadable cells or a label that disagrees with its interpretation.
    pub fn read_table<R: Read>(&self, reader: R) -> Result<CorpusTable, PipelineError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut columns = Vec::new();
        for header in csv_reader.headers()?.iter() {
            let column = Column::from_header(header).ok_or_else(|| {
                PipelineError::SchemaMismatch(format!("unknown column '{}'", header))
            })?;
            columns.push(column);
        }
        for required in [Column::Time, Column::StudentId, Column::Term] {
            if !columns.contains(&required) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "missing column '{}'",
                    required.header()
                )));
            }
        }

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = parse_row(&columns, &record).map_err(|e| match e {
                PipelineError::ParseError(msg) => {
                    PipelineError::ParseError(format!("data row {}: {}", line + 1, msg))
                }
                other => other,
            })?;
            rows.push(row);
        }

        Ok(CorpusTable {
            schema: TableSchema::from_columns(columns),
            rows,
        })
    }

    /// Write per-student summary labels
    pub fn write_student_labels<W: Write>(
        &self,
        labels: &[StudentLabel],
        strategy: LabelStrategy,
        writer: W,
    ) -> Result<(), PipelineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let label_column = strategy.label_column();
        csv_writer.write_record([
            Column::Term.header().to_string(),
            Column::StudentId.header().to_string(),
            strategy.score_column(),
            label_column.clone(),
            format!("{} Interpreted", label_column),
        ])?;
        for label in labels {
            csv_writer.write_record([
                label.cohort.clone(),
                label.student_id.clone(),
                label.score.to_string(),
                label.state.as_str().to_string(),
                label.state.interpretation().to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write wide rows with `steps` time-step columns
    pub fn write_wide<W: Write>(
        &self,
        rows: &[WideRow],
        strategy: LabelStrategy,
        steps: usize,
        writer: W,
    ) -> Result<(), PipelineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let label_column = strategy.label_column();

        let mut header = vec![
            Column::StudentId.header().to_string(),
            Column::Term.header().to_string(),
            "Feature".to_string(),
        ];
        header.extend((1..=steps).map(|step| step.to_string()));
        header.push(label_column.clone());
        header.push(format!("{} Interpreted", label_column));
        csv_writer.write_record(&header)?;

        for row in rows {
            let mut record = vec![
                row.student_id.clone(),
                row.cohort.clone(),
                row.feature.display_name().to_string(),
            ];
            record.extend((0..steps).map(|i| number(row.values.get(i).copied().flatten())));
            let state = row.label.as_ref().map(|label| label.state);
            record.push(state.map(|s| s.as_str().to_string()).unwrap_or_default());
            record.push(
                state
                    .map(|s| s.interpretation().to_string())
                    .unwrap_or_default(),
            );
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn cell(column: Column, cohort: &str, student_id: &str, row: &TimelineRow) -> String {
    match column {
        Column::Time => row.time.format(TIME_FORMAT).to_string(),
        Column::StudentId => student_id.to_string(),
        Column::Term => cohort.to_string(),
        Column::HeartRate => number(row.heart_rate.value()),
        Column::HeartRateMask => row.heart_rate.mask().to_string(),
        Column::Calories => number(row.calories.value()),
        Column::CaloriesMask => row.calories.mask().to_string(),
        Column::CalState => text(&row.cal_state),
        Column::CalStateInterpreted => text(&row.cal_state_interpreted),
        Column::Distance => number(row.distance.value()),
        Column::DistanceMask => row.distance.mask().to_string(),
        Column::Steps => number(row.steps.value()),
        Column::StepsMask => row.steps.mask().to_string(),
        Column::MinutesAsleep => number(row.minutes_asleep.value()),
        Column::MinutesAsleepMask => row.minutes_asleep.mask().to_string(),
        Column::HoursAsleep => number(row.hours_asleep()),
        Column::HoursAsleepMask => row.minutes_asleep.mask().to_string(),
        Column::SleepState => text(&row.sleep_state),
        Column::SleepStateInterpreted => text(&row.sleep_state_interpreted),
        Column::Stai => number(row.stai.value()),
        Column::StaiMask => row.stai.mask().to_string(),
        Column::Cesd => number(row.cesd.value()),
        Column::CesdMask => row.cesd.mask().to_string(),
        Column::CesdState => row
            .cesd_state
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        Column::CesdStateInterpreted => row
            .cesd_interpretation()
            .map(|i| i.to_string())
            .unwrap_or_default(),
    }
}

/// Cells of one masked column gathered while reading a row
#[derive(Default)]
struct MaskedCells {
    value: Option<f64>,
    missing: Option<bool>,
}

impl MaskedCells {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.missing.is_none()
    }

    fn build(self) -> MaskedValue {
        match self.missing {
            Some(missing) => MaskedValue::restore(self.value, missing),
            None => MaskedValue::observe(self.value),
        }
    }
}

fn parse_number(column: Column, raw: &str) -> Result<Option<f64>, PipelineError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| {
        PipelineError::ParseError(format!("'{}' is not a number in '{}'", raw, column.header()))
    })
}

fn parse_mask(column: Column, raw: &str) -> Result<Option<bool>, PipelineError> {
    match raw {
        "" => Ok(None),
        "0" | "0.0" => Ok(Some(false)),
        "1" | "1.0" => Ok(Some(true)),
        other => Err(PipelineError::ParseError(format!(
            "'{}' is not a mask in '{}'",
            other,
            column.header()
        ))),
    }
}

fn optional_text(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn parse_row(columns: &[Column], record: &csv::StringRecord) -> Result<CorpusRow, PipelineError> {
    let mut time = None;
    let mut student_id = String::new();
    let mut cohort = String::new();
    let mut heart_rate = MaskedCells::default();
    let mut calories = MaskedCells::default();
    let mut distance = MaskedCells::default();
    let mut steps = MaskedCells::default();
    let mut minutes_asleep = MaskedCells::default();
    let mut hours_asleep = MaskedCells::default();
    let mut stai = MaskedCells::default();
    let mut cesd = MaskedCells::default();
    let mut state: Option<DepressionState> = None;
    let mut interpretation: Option<u8> = None;
    let mut row = TimelineRow::empty(chrono::NaiveDateTime::default());

    for (column, raw) in columns.iter().copied().zip(record.iter()) {
        match column {
            Column::Time => {
                let ts = parse_timestamp(raw).map_err(|e| PipelineError::ParseError(e.to_string()))?;
                time = Some(ts);
            }
            Column::StudentId => student_id = raw.to_string(),
            Column::Term => cohort = raw.to_string(),
            Column::HeartRate => heart_rate.value = parse_number(column, raw)?,
            Column::HeartRateMask => heart_rate.missing = parse_mask(column, raw)?,
            Column::Calories => calories.value = parse_number(column, raw)?,
            Column::CaloriesMask => calories.missing = parse_mask(column, raw)?,
            Column::CalState => row.cal_state = optional_text(raw),
            Column::CalStateInterpreted => row.cal_state_interpreted = optional_text(raw),
            Column::Distance => distance.value = parse_number(column, raw)?,
            Column::DistanceMask => distance.missing = parse_mask(column, raw)?,
            Column::Steps => steps.value = parse_number(column, raw)?,
            Column::StepsMask => steps.missing = parse_mask(column, raw)?,
            Column::MinutesAsleep => minutes_asleep.value = parse_number(column, raw)?,
            Column::MinutesAsleepMask => minutes_asleep.missing = parse_mask(column, raw)?,
            Column::HoursAsleep => hours_asleep.value = parse_number(column, raw)?,
            Column::HoursAsleepMask => hours_asleep.missing = parse_mask(column, raw)?,
            Column::SleepState => row.sleep_state = optional_text(raw),
            Column::SleepStateInterpreted => row.sleep_state_interpreted = optional_text(raw),
            Column::Stai => stai.value = parse_number(column, raw)?,
            Column::StaiMask => stai.missing = parse_mask(column, raw)?,
            Column::Cesd => cesd.value = parse_number(column, raw)?,
            Column::CesdMask => cesd.missing = parse_mask(column, raw)?,
            Column::CesdState => {
                state = if raw.is_empty() { None } else { Some(raw.parse()?) }
            }
            Column::CesdStateInterpreted => {
                interpretation = parse_mask(column, raw)?.map(u8::from);
            }
        }
    }

    row.time = time.ok_or_else(|| PipelineError::ParseError("empty 'Time' cell".to_string()))?;
    row.heart_rate = heart_rate.build();
    row.calories = calories.build();
    row.distance = distance.build();
    row.steps = steps.build();
    // hours are derived from minutes; they only stand in when minutes are absent
    if minutes_asleep.is_empty() {
        minutes_asleep = MaskedCells {
            value: hours_asleep.value.map(|hours| hours * 60.0),
            missing: hours_asleep.missing,
        };
    }
    row.minutes_asleep = minutes_asleep.build();
    row.stai = stai.build();
    row.cesd = cesd.build();
    row.cesd_state = match (state, interpretation) {
        (Some(state), Some(code)) if state.interpretation() != code => {
            return Err(PipelineError::ParseError(format!(
                "CESD State '{}' disagrees with interpretation {}",
                state, code
            )))
        }
        (Some(state), _) => Some(state),
        (None, Some(code)) => DepressionState::from_interpretation(code),
        (None, None) => None,
    };

    Ok(CorpusRow {
        cohort,
        student_id,
        row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NumericColumn;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_timeline() -> IndividualTimeline {
        let time = |d| {
            NaiveDate::from_ymd_opt(2020, 6, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let mut first = TimelineRow::empty(time(15));
        first.steps = MaskedValue::observe(Some(500.0));
        first.heart_rate = MaskedValue::observe(Some(71.5));
        first.minutes_asleep = MaskedValue::observe(Some(450.0));
        first.sleep_state = Some("2".to_string());
        first.stai = MaskedValue::observe(Some(41.0));
        first.cesd = MaskedValue::observe(Some(12.0));
        first.cesd_state = Some(DepressionState::Depressed);

        let mut second = TimelineRow::empty(time(16));
        second.steps = MaskedValue::observe(None);
        second.steps.fill(500.0);
        second.stai = MaskedValue::observe(None);
        second.stai.fill(41.0);
        second.cesd = MaskedValue::observe(None);
        second.cesd.fill(12.0);
        second.cesd_state = Some(DepressionState::Depressed);

        IndividualTimeline {
            student_id: "s01".to_string(),
            rows: vec![first, second],
        }
    }

    fn encode(timeline: &IndividualTimeline, schema: &TableSchema) -> String {
        let mut buffer = Vec::new();
        CsvEncoder::new()
            .write_timeline("E1 term", schema, timeline, &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_header_order() {
        let csv = encode(&make_timeline(), &TableSchema::standard());
        let header = csv.lines().next().unwrap();

        assert_eq!(
            header,
            "Time,Student ID,Term,Heart Rate (Mean),Heart Rate Mask,Calories (Sum),\
             Calories Burned Mask,Cal_State,Cal_State_Interpreted,Distance (Sum),\
             Distance Traveled Mask,Step (Sum),Steps Taken Mask,Minutes_Asleep,\
             Minutes_Asleep Mask,Hours_Asleep,Hours_Asleep Mask,Sleep_State,\
             Sleep_State_Interpreted,STAI,STAI Score Mask,CESD,CESD Score Mask,CESD State,\
             CESD State Interpreted"
        );
    }

    #[test]
    fn test_cells() {
        let csv = encode(&make_timeline(), &TableSchema::standard());
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(
            lines[1],
            "2020-06-15 00:00:00,s01,E1 term,71.5,0,,1,,,,1,500,0,450,0,7.5,0,2,,41,0,12,0,Depressed,1"
        );
        assert_eq!(
            lines[2],
            "2020-06-16 00:00:00,s01,E1 term,,1,,1,,,,1,500,1,,1,,1,,,41,1,12,1,Depressed,1"
        );
    }

    #[test]
    fn test_read_back_keeps_masks() {
        let timeline = make_timeline();
        let csv = encode(&timeline, &TableSchema::standard());

        let table = CsvEncoder::new().read_table(csv.as_bytes()).unwrap();

        assert_eq!(table.schema, TableSchema::standard());
        let rows: Vec<_> = table.rows.iter().map(|r| r.row.clone()).collect();
        assert_eq!(rows, timeline.rows);
        assert_eq!(table.rows[1].row.numeric(NumericColumn::Steps).mask(), 1);
        assert_eq!(table.rows[0].cohort, "E1 term");
    }

    #[test]
    fn test_unlabeled_schema_omits_label_columns() {
        let csv = encode(&make_timeline(), &TableSchema::unlabeled());
        let table = CsvEncoder::new().read_table(csv.as_bytes()).unwrap();

        assert_eq!(table.schema, TableSchema::unlabeled());
        assert_eq!(table.rows[0].row.cesd_state, None);
    }

    #[test]
    fn test_hours_asleep_stand_in_for_missing_minutes() {
        let csv = "Time,Student ID,Term,Hours_Asleep,Hours_Asleep Mask\n\
                   2020-06-15 00:00:00,s01,E1 term,7.5,0\n\
                   2020-06-16 00:00:00,s01,E1 term,6,1\n";

        let table = CsvEncoder::new().read_table(csv.as_bytes()).unwrap();

        let first = &table.rows[0].row;
        assert_eq!(first.minutes_asleep.value(), Some(450.0));
        assert_eq!(first.minutes_asleep.mask(), 0);
        let second = &table.rows[1].row;
        assert_eq!(second.minutes_asleep.value(), Some(360.0));
        assert!(second.minutes_asleep.is_imputed());
    }

    #[test]
    fn test_unknown_header() {
        let csv = "Time,Student ID,Term,Mood\n2020-06-15 00:00:00,s01,E1 term,happy\n";
        let result = CsvEncoder::new().read_table(csv.as_bytes());
        assert!(matches!(result, Err(PipelineError::SchemaMismatch(_))));
    }

    #[test]
    fn test_label_disagreement() {
        let csv = "Time,Student ID,Term,CESD,CESD State,CESD State Interpreted\n\
                   2020-06-15 00:00:00,s01,E1 term,12,Depressed,0\n";
        let result = CsvEncoder::new().read_table(csv.as_bytes());
        assert!(matches!(result, Err(PipelineError::ParseError(_))));
    }

    #[test]
    fn test_wide_header() {
        let mut buffer = Vec::new();
        CsvEncoder::new()
            .write_wide(&[], LabelStrategy::Mean, 3, &mut buffer)
            .unwrap();
        let csv = String::from_utf8(buffer).unwrap();

        assert_eq!(
            csv.trim_end(),
            "Student ID,Term,Feature,1,2,3,CESD (Mean) Label,CESD (Mean) Label Interpreted"
        );
    }
}
