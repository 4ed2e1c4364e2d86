use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of the mobile tracker's position log, keyed by unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// A raw Flow measurement row. Carries no coordinates of its own; the
/// transform resolves a position for it from the position log.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowMeasure {
    pub timestamp: i64,
    pub no2: Option<f64>,
    pub voc: Option<f64>,
    pub pm10: Option<f64>,
    pub pm25: Option<f64>,
    pub pm1: Option<f64>,
    pub aqi: Option<i64>,
}

/// Composite natural key identifying one logical AirBeam sensor stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub package: String,
    pub measurement_type: String,
    pub unit: String,
}

/// A raw AirBeam reading before a sensor identity has been attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirBeamRawReading {
    /// Milliseconds since the unix epoch, as exported by the badge.
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// All readings from one sensor stream within one uploaded export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirBeamSession {
    pub descriptor: SensorDescriptor,
    pub readings: Vec<AirBeamRawReading>,
}

/// One spectrometer reading exactly as exported: metadata fields are kept
/// as strings and interpreted by the transform worker, matching the split
/// between export parsing and shaping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct XrfReading {
    pub instrument: String,
    pub reading: String,
    pub date: String,
    pub time: String,
    pub latitude: String,
    pub longitude: String,
    pub method: String,
    pub factor: String,
    pub label: String,
    pub collimation: String,
    pub units: String,
    pub info: String,
    pub elements: BTreeMap<String, ElementReading>,
}

/// Per-element quantities reported by the spectrometer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementReading {
    pub compound: Option<String>,
    pub compound_level: Option<f64>,
    pub compound_error: Option<f64>,
    pub concentration: Option<f64>,
    /// Error at one standard deviation.
    pub error1s: Option<f64>,
}

/// A row that was dropped during parsing, retained so callers can observe
/// data loss instead of it disappearing silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub file: String,
    pub line: usize,
    pub reason: String,
}

impl RowIssue {
    pub fn new(file: &str, line: usize, reason: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            reason: reason.into(),
        }
    }
}
