//! Reader for handheld spectrometer exports. Each row is one reading:
//! a block of metadata columns followed by per-element columns of the form
//! `Fe Concentration`, `Fe Error1s`, `Fe Compound`, and so on.
//!
//! Metadata stays as raw strings here and is interpreted by the transform
//! worker (number parsing, date+time composition, empty-string optionals),
//! but the fields the interpretation cannot do without are validated per
//! row, so an unreadable reading is dropped here as a [`RowIssue`] and is
//! never counted toward a transform job.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use crate::errors::ParserError;
use crate::model::{ElementReading, RowIssue, XrfReading};
use crate::table::{optional_f64, Columns};

#[derive(Debug, Default)]
pub struct XrfUpload {
    pub readings: Vec<XrfReading>,
    pub issues: Vec<RowIssue>,
}

const META_COLUMNS: [&str; 12] = [
    "instrument",
    "reading",
    "date",
    "time",
    "latitude",
    "longitude",
    "method",
    "factor",
    "label",
    "collimation",
    "units",
    "info",
];

#[derive(Debug, Clone, Copy)]
enum ElementField {
    Compound,
    CompoundLevel,
    CompoundError,
    Concentration,
    Error1s,
}

struct MetaColumns {
    reading: usize,
    date: usize,
    time: usize,
    latitude: usize,
    longitude: usize,
}

/// The metadata the transform worker cannot interpret around: the reading
/// number, the date+time pair, and the coordinates. Mirrors the parsing the
/// worker performs so bad rows are caught while line numbers still exist.
fn validate_meta(record: &csv::StringRecord, cols: &MetaColumns) -> Result<(), String> {
    let reading = record[cols.reading].trim();
    if reading.parse::<i64>().is_err() {
        return Err(format!("unreadable reading number '{reading}'"));
    }
    let date = record[cols.date].trim();
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(format!("unreadable date '{date}'"));
    }
    let time = record[cols.time].trim();
    if NaiveTime::parse_from_str(time, "%H:%M:%S").is_err() {
        return Err(format!("unreadable time '{time}'"));
    }
    if record[cols.latitude].trim().parse::<f64>().is_err()
        || record[cols.longitude].trim().parse::<f64>().is_err()
    {
        return Err("unreadable coordinates".to_string());
    }
    Ok(())
}

fn element_column(name: &str) -> Option<(String, ElementField)> {
    let (symbol, field) = name.split_once(' ')?;
    let field = match field.trim() {
        "Compound" => ElementField::Compound,
        "Compound Level" => ElementField::CompoundLevel,
        "Compound Error" => ElementField::CompoundError,
        "Concentration" => ElementField::Concentration,
        "Error1s" => ElementField::Error1s,
        _ => return None,
    };
    Some((symbol.to_string(), field))
}

pub fn parse_xrf_csv(file: &str, text: &str) -> Result<XrfUpload, ParserError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = Columns::new(reader.headers().map_err(|source| ParserError::Csv {
        file: file.to_string(),
        source,
    })?);

    let instrument_col = columns.require(file, "instrument")?;
    let meta_cols = MetaColumns {
        reading: columns.require(file, "reading")?,
        date: columns.require(file, "date")?,
        time: columns.require(file, "time")?,
        latitude: columns.require(file, "latitude")?,
        longitude: columns.require(file, "longitude")?,
    };

    let mut element_columns: Vec<(String, ElementField, usize)> = Vec::new();
    for (name, i) in columns.names() {
        if META_COLUMNS.contains(&name) {
            continue;
        }
        if let Some((symbol, field)) = element_column(name) {
            element_columns.push((symbol, field, i));
        }
    }

    let meta = |record: &csv::StringRecord, name: &str| -> String {
        columns
            .get(name)
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string()
    };

    let mut out = XrfUpload::default();
    for (offset, record) in reader.records().enumerate() {
        let line = offset + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                out.issues.push(RowIssue::new(file, line, err.to_string()));
                continue;
            }
        };
        if record.len() != columns.width() {
            out.issues.push(RowIssue::new(
                file,
                line,
                format!("expected {} fields, found {}", columns.width(), record.len()),
            ));
            continue;
        }
        if let Err(reason) = validate_meta(&record, &meta_cols) {
            out.issues.push(RowIssue::new(file, line, reason));
            continue;
        }

        let mut elements: BTreeMap<String, ElementReading> = BTreeMap::new();
        for (symbol, field, i) in &element_columns {
            let cell = record.get(*i).unwrap_or_default();
            let entry = elements.entry(symbol.clone()).or_default();
            match field {
                ElementField::Compound => {
                    let trimmed = cell.trim();
                    if !trimmed.is_empty() {
                        entry.compound = Some(trimmed.to_string());
                    }
                }
                ElementField::CompoundLevel => entry.compound_level = optional_f64(cell),
                ElementField::CompoundError => entry.compound_error = optional_f64(cell),
                ElementField::Concentration => entry.concentration = optional_f64(cell),
                ElementField::Error1s => entry.error1s = optional_f64(cell),
            }
        }

        out.readings.push(XrfReading {
            instrument: record[instrument_col].to_string(),
            reading: record[meta_cols.reading].to_string(),
            date: record[meta_cols.date].to_string(),
            time: record[meta_cols.time].to_string(),
            latitude: record[meta_cols.latitude].to_string(),
            longitude: record[meta_cols.longitude].to_string(),
            method: meta(&record, "method"),
            factor: meta(&record, "factor"),
            label: meta(&record, "label"),
            collimation: meta(&record, "collimation"),
            units: meta(&record, "units"),
            info: meta(&record, "info"),
            elements,
        });
    }

    Ok(out)
}
