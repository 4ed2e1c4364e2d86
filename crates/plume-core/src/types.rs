// crates/plume-core/src/types.rs

use std::collections::BTreeMap;
use std::fmt;

use plume_parser::{ElementReading, FlowMeasure, PositionSample, XrfReading};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFamily {
    Flow,
    AirBeam,
    Xrf,
}

impl SensorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorFamily::Flow => "flow",
            SensorFamily::AirBeam => "airbeam",
            SensorFamily::Xrf => "xrf",
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved location, held at 4-decimal fixed precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Canonical mobile-tracker measurement. Coordinates are always derived from
/// the position index, never copied from the raw measurement row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub no2: Option<i64>,
    pub voc: Option<i64>,
    pub pm10: Option<i64>,
    pub pm25: Option<i64>,
    pub pm1: Option<i64>,
    pub aqi: Option<i64>,
}

/// A badge reading after the storage gateway has assigned its sensor
/// identity but before shaping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirBeamReading {
    pub sensor: i64,
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// Canonical badge measurement, keyed by (sensor, timestamp, position).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirBeamRecord {
    pub sensor: i64,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub value: i64,
}

/// Canonical spectrometer reading, keyed by (instrument, reading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XrfRecord {
    pub instrument: String,
    pub reading: i64,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub method: Option<String>,
    pub factor: Option<String>,
    pub label: Option<String>,
    pub collimation: Option<String>,
    pub units: Option<String>,
    pub info: Option<String>,
    pub elements: BTreeMap<String, ElementReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Flow(FlowRecord),
    AirBeam(AirBeamRecord),
    Xrf(XrfRecord),
}

/// Position log plus raw measurements, as one flow transform job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPayload {
    pub spatial: Vec<PositionSample>,
    pub measures: Vec<FlowMeasure>,
}

/// One logical transform job, tagged by sensor family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TransformRequest {
    Flow(FlowPayload),
    AirBeam(Vec<AirBeamReading>),
    Xrf(Vec<XrfReading>),
}

impl TransformRequest {
    pub fn kind(&self) -> SensorFamily {
        match self {
            TransformRequest::Flow(_) => SensorFamily::Flow,
            TransformRequest::AirBeam(_) => SensorFamily::AirBeam,
            TransformRequest::Xrf(_) => SensorFamily::Xrf,
        }
    }

    /// Raw rows the job will be asked to process.
    pub fn row_count(&self) -> usize {
        match self {
            TransformRequest::Flow(payload) => payload.measures.len(),
            TransformRequest::AirBeam(readings) => readings.len(),
            TransformRequest::Xrf(readings) => readings.len(),
        }
    }
}

/// One bounded batch of canonical records. Every job ends with exactly one
/// `complete == true` chunk, even when `results` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformChunk {
    pub id: Uuid,
    pub complete: bool,
    pub results: Vec<CanonicalRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: Option<i64>,
    pub avg: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

/// Aggregate view of stored flow measurements over a timestamp interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub count: i64,
    pub spatial: Option<BoundingBox>,
    pub no2: MetricSummary,
    pub voc: MetricSummary,
    pub pm10: MetricSummary,
    pub pm25: MetricSummary,
    pub pm1: MetricSummary,
    pub aqi: MetricSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalRange {
    pub min: i64,
    pub max: i64,
}

/// A stored badge measurement joined with its sensor identity, as served to
/// the export formatters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirBeamDataRow {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub package: String,
    pub measurement_type: String,
    pub unit: String,
    pub value: i64,
}
