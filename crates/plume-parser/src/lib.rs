//! Parsers for the three supported sensor-platform exports: the mobile
//! tracker's zip archive (Flow), the wearable badge CSV (AirBeam), and the
//! handheld spectrometer CSV (XRF).
//!
//! Rows that cannot be read are dropped, never rejected wholesale, but every
//! drop is recorded as a [`RowIssue`] so data loss stays observable.

pub mod airbeam;
pub mod errors;
pub mod flow;
pub mod model;
mod table;
pub mod xrf;


pub use airbeam::{parse_airbeam_csv, AirBeamUpload};
pub use errors::ParserError;
pub use flow::{parse_flow_archive, FlowArchive};
pub use model::{
    AirBeamRawReading, AirBeamSession, ElementReading, FlowMeasure, PositionSample, RowIssue,
    SensorDescriptor, XrfReading,
};
pub use xrf::{parse_xrf_csv, XrfUpload};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// A fully parsed upload, tagged by sensor family.
#[derive(Debug)]
pub enum ParsedUpload {
    Flow(FlowArchive),
    AirBeam(AirBeamUpload),
    Xrf(XrfUpload),
}

impl ParsedUpload {
    /// Number of rows the transform job will be asked to process.
    pub fn row_count(&self) -> usize {
        match self {
            ParsedUpload::Flow(archive) => archive.measures.len(),
            ParsedUpload::AirBeam(upload) => {
                upload.sessions.iter().map(|s| s.readings.len()).sum()
            }
            ParsedUpload::Xrf(upload) => upload.readings.len(),
        }
    }

    pub fn issues(&self) -> &[RowIssue] {
        match self {
            ParsedUpload::Flow(archive) => &archive.issues,
            ParsedUpload::AirBeam(upload) => &upload.issues,
            ParsedUpload::Xrf(upload) => &upload.issues,
        }
    }
}

/// Sniffs the export format and dispatches to the family parser. Flow
/// exports are zip archives; the two CSV families are told apart by their
/// header row.
pub fn parse_upload(filename: &str, bytes: &[u8]) -> Result<ParsedUpload, ParserError> {
    if bytes.starts_with(&ZIP_MAGIC) {
        return Ok(ParsedUpload::Flow(parse_flow_archive(bytes)?));
    }
    let text =
        std::str::from_utf8(bytes).map_err(|_| ParserError::Encoding(filename.to_string()))?;
    let header = text.lines().next().unwrap_or_default();
    if header.contains("instrument") {
        Ok(ParsedUpload::Xrf(parse_xrf_csv(filename, text)?))
    } else if header.contains("sensor_package") {
        Ok(ParsedUpload::AirBeam(parse_airbeam_csv(filename, text)?))
    } else {
        Err(ParserError::UnrecognizedFormat(filename.to_string()))
    }
}
