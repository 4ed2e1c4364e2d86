//! Reader for wearable badge exports: a flat CSV where every row names the
//! sensor stream it belongs to. Rows are grouped into per-stream sessions so
//! the caller can resolve one sensor identity per stream before submitting
//! the transform job.

use std::collections::HashMap;

use crate::errors::ParserError;
use crate::model::{AirBeamRawReading, AirBeamSession, RowIssue, SensorDescriptor};
use crate::table::{optional_f64, optional_i64, Columns};

#[derive(Debug, Default)]
pub struct AirBeamUpload {
    pub sessions: Vec<AirBeamSession>,
    pub issues: Vec<RowIssue>,
}

pub fn parse_airbeam_csv(file: &str, text: &str) -> Result<AirBeamUpload, ParserError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = Columns::new(reader.headers().map_err(|source| ParserError::Csv {
        file: file.to_string(),
        source,
    })?);
    let package_col = columns.require(file, "sensor_package")?;
    let type_col = columns.require(file, "measurement_type")?;
    let unit_col = columns.require(file, "unit")?;
    let ts_col = columns.require(file, "timestamp")?;
    let lat_col = columns.require(file, "latitude")?;
    let lon_col = columns.require(file, "longitude")?;
    let value_col = columns.require(file, "value")?;

    let mut out = AirBeamUpload::default();
    let mut session_index: HashMap<SensorDescriptor, usize> = HashMap::new();

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
        let descriptor = SensorDescriptor {
            package: record[package_col].trim().to_string(),
            measurement_type: record[type_col].trim().to_string(),
            unit: record[unit_col].trim().to_string(),
        };
        if descriptor.package.is_empty() || descriptor.measurement_type.is_empty() {
            out.issues
                .push(RowIssue::new(file, line, "missing sensor identity"));
            continue;
        }
        let (Some(timestamp_ms), Some(latitude), Some(longitude), Some(value)) = (
            optional_i64(&record[ts_col]),
            optional_f64(&record[lat_col]),
            optional_f64(&record[lon_col]),
            optional_f64(&record[value_col]),
        ) else {
            out.issues
                .push(RowIssue::new(file, line, "unreadable reading fields"));
            continue;
        };

        let reading = AirBeamRawReading {
            timestamp_ms,
            latitude,
            longitude,
            value,
        };
        match session_index.get(&descriptor) {
            Some(&i) => out.sessions[i].readings.push(reading),
            None => {
                session_index.insert(descriptor.clone(), out.sessions.len());
                out.sessions.push(AirBeamSession {
                    descriptor,
                    readings: vec![reading],
                });
            }
        }
    }

    Ok(out)
}
