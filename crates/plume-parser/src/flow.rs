//! Reader for the mobile tracker's bulk export: a zip archive holding
//! `user_positions*.csv` (the position log) and `user_measures*.csv`
//! (timestamp-keyed measurements without coordinates).

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::errors::ParserError;
use crate::model::{FlowMeasure, PositionSample, RowIssue};
use crate::table::{optional_f64, optional_i64, Columns};

const POSITIONS_PREFIX: &str = "user_positions";
const MEASURES_PREFIX: &str = "user_measures";

#[derive(Debug, Default)]
pub struct FlowArchive {
    pub spatial: Vec<PositionSample>,
    pub measures: Vec<FlowMeasure>,
    pub issues: Vec<RowIssue>,
}

pub fn parse_flow_archive(bytes: &[u8]) -> Result<FlowArchive, ParserError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();

    let mut out = FlowArchive::default();
    let mut saw_positions = false;

    for name in &names {
        if !matches_entry(name, POSITIONS_PREFIX) {
            continue;
        }
        saw_positions = true;
        let text = read_entry(&mut archive, name)?;
        parse_positions(name, &text, &mut out)?;
    }
    if !saw_positions {
        return Err(ParserError::MissingEntry {
            pattern: "user_positions*.csv",
        });
    }

    for name in &names {
        if !matches_entry(name, MEASURES_PREFIX) {
            continue;
        }
        let text = read_entry(&mut archive, name)?;
        parse_measures(name, &text, &mut out)?;
    }

    Ok(out)
}

fn matches_entry(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix) && name.ends_with(".csv")
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, ParserError> {
    let mut entry = archive.by_name(name)?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|_| ParserError::Encoding(name.to_string()))?;
    Ok(text)
}

fn parse_positions(file: &str, text: &str, out: &mut FlowArchive) -> Result<(), ParserError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = Columns::new(reader.headers().map_err(|source| ParserError::Csv {
        file: file.to_string(),
        source,
    })?);
    let ts_col = columns.require(file, "timestamp")?;
    let lat_col = columns.require(file, "latitude")?;
    let lon_col = columns.require(file, "longitude")?;

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
        let Some(timestamp) = optional_i64(&record[ts_col]) else {
            out.issues
                .push(RowIssue::new(file, line, "unreadable timestamp"));
            continue;
        };
        let (Some(latitude), Some(longitude)) =
            (optional_f64(&record[lat_col]), optional_f64(&record[lon_col]))
        else {
            out.issues
                .push(RowIssue::new(file, line, "unreadable coordinates"));
            continue;
        };
        out.spatial.push(PositionSample {
            timestamp,
            latitude,
            longitude,
        });
    }

    Ok(())
}

fn parse_measures(file: &str, text: &str, out: &mut FlowArchive) -> Result<(), ParserError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = Columns::new(reader.headers().map_err(|source| ParserError::Csv {
        file: file.to_string(),
        source,
    })?);
    let ts_col = columns.require(file, "timestamp")?;
    let no2_col = columns.require(file, "NO2 (ppb)")?;
    let voc_col = columns.require(file, "VOC (ppb)")?;
    let pm10_col = columns.require(file, "pm 10 (ug/m3)")?;
    let pm25_col = columns.require(file, "pm 2.5 (ug/m3)")?;
    let pm1_col = columns.require(file, "pm 1 (ug/m3)")?;
    // Older exports predate the AQI column.
    let aqi_col = columns.get("AQI");

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
        let Some(timestamp) = optional_i64(&record[ts_col]) else {
            out.issues
                .push(RowIssue::new(file, line, "unreadable timestamp"));
            continue;
        };
        out.measures.push(FlowMeasure {
            timestamp,
            no2: optional_f64(&record[no2_col]),
            voc: optional_f64(&record[voc_col]),
            pm10: optional_f64(&record[pm10_col]),
            pm25: optional_f64(&record[pm25_col]),
            pm1: optional_f64(&record[pm1_col]),
            aqi: aqi_col.and_then(|col| optional_i64(&record[col])),
        });
    }

    Ok(())
}
