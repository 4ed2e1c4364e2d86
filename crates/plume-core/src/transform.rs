//! The per-job transform: resolves locations, applies per-family shaping
//! rules, and emits canonical records in bounded chunks.

use chrono::{NaiveDate, NaiveTime};
use plume_parser::XrfReading;
use tracing::warn;
use uuid::Uuid;

use crate::error::TransformError;
use crate::position::{round_coord, PositionIndex};
use crate::types::{
    AirBeamReading, AirBeamRecord, CanonicalRecord, FlowPayload, FlowRecord, TransformChunk,
    TransformRequest, XrfRecord,
};

pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Runs one job to completion, handing every emitted chunk to `emit`.
/// Exactly one terminal chunk is produced per successful job, even when the
/// trailing buffer is empty; a returned error means no terminal chunk was
/// emitted and the job must be failed at the dispatch layer.
pub fn run(
    id: Uuid,
    request: TransformRequest,
    chunk_size: usize,
    emit: &mut dyn FnMut(TransformChunk),
) -> Result<(), TransformError> {
    let mut buffer = ChunkBuffer::new(id, chunk_size.max(1), emit);
    match request {
        TransformRequest::Flow(payload) => transform_flow(payload, &mut buffer)?,
        TransformRequest::AirBeam(readings) => transform_airbeam(readings, &mut buffer),
        TransformRequest::Xrf(readings) => transform_xrf(readings, &mut buffer),
    }
    buffer.finish();
    Ok(())
}

struct ChunkBuffer<'a> {
    id: Uuid,
    capacity: usize,
    results: Vec<CanonicalRecord>,
    emit: &'a mut dyn FnMut(TransformChunk),
}

impl<'a> ChunkBuffer<'a> {
    fn new(id: Uuid, capacity: usize, emit: &'a mut dyn FnMut(TransformChunk)) -> Self {
        Self {
            id,
            capacity,
            results: Vec::with_capacity(capacity),
            emit,
        }
    }

    fn push(&mut self, record: CanonicalRecord) {
        self.results.push(record);
        if self.results.len() >= self.capacity {
            let results = std::mem::take(&mut self.results);
            (self.emit)(TransformChunk {
                id: self.id,
                complete: false,
                results,
            });
        }
    }

    fn finish(self) {
        (self.emit)(TransformChunk {
            id: self.id,
            complete: true,
            results: self.results,
        });
    }
}

fn round_metric(value: f64) -> i64 {
    value.round() as i64
}

fn transform_flow(payload: FlowPayload, buffer: &mut ChunkBuffer) -> Result<(), TransformError> {
    let index = PositionIndex::new(payload.spatial)?;
    for measure in payload.measures {
        let position = index.get(measure.timestamp);
        buffer.push(CanonicalRecord::Flow(FlowRecord {
            timestamp: measure.timestamp,
            latitude: position.latitude,
            longitude: position.longitude,
            no2: measure.no2.map(round_metric),
            voc: measure.voc.map(round_metric),
            pm10: measure.pm10.map(round_metric),
            pm25: measure.pm25.map(round_metric),
            pm1: measure.pm1.map(round_metric),
            aqi: measure.aqi,
        }));
    }
    Ok(())
}

fn transform_airbeam(readings: Vec<AirBeamReading>, buffer: &mut ChunkBuffer) {
    for reading in readings {
        buffer.push(CanonicalRecord::AirBeam(AirBeamRecord {
            sensor: reading.sensor,
            timestamp: ms_to_s(reading.timestamp_ms),
            latitude: round_coord(reading.latitude),
            longitude: round_coord(reading.longitude),
            value: round_metric(reading.value),
        }));
    }
}

fn ms_to_s(ms: i64) -> i64 {
    (ms as f64 / 1000.0).round() as i64
}

fn transform_xrf(readings: Vec<XrfReading>, buffer: &mut ChunkBuffer) {
    for reading in readings {
        match xrf_record(reading) {
            Ok(record) => buffer.push(CanonicalRecord::Xrf(record)),
            Err(reason) => warn!(%reason, "dropping unreadable spectrometer reading"),
        }
    }
}

fn optional(field: &str) -> Option<String> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Interprets one raw spectrometer reading: numeric metadata is parsed, the
/// timestamp is composed from the separate date and time columns (taken as
/// UTC), and empty strings become absent fields.
fn xrf_record(reading: XrfReading) -> Result<XrfRecord, String> {
    let number = reading
        .reading
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("unreadable reading number '{}'", reading.reading))?;
    let date = NaiveDate::parse_from_str(reading.date.trim(), "%Y-%m-%d")
        .map_err(|_| format!("unreadable date '{}'", reading.date))?;
    let time = NaiveTime::parse_from_str(reading.time.trim(), "%H:%M:%S")
        .map_err(|_| format!("unreadable time '{}'", reading.time))?;
    let latitude = reading
        .latitude
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("unreadable latitude '{}'", reading.latitude))?;
    let longitude = reading
        .longitude
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("unreadable longitude '{}'", reading.longitude))?;

    Ok(XrfRecord {
        instrument: reading.instrument,
        reading: number,
        timestamp: date.and_time(time).and_utc().timestamp(),
        latitude: round_coord(latitude),
        longitude: round_coord(longitude),
        method: optional(&reading.method),
        factor: optional(&reading.factor),
        label: optional(&reading.label),
        collimation: optional(&reading.collimation),
        units: optional(&reading.units),
        info: optional(&reading.info),
        elements: reading.elements,
    })
}

#[cfg(test)]
mod tests {
    use plume_parser::{FlowMeasure, PositionSample};

    use super::*;

    fn collect(request: TransformRequest, chunk_size: usize) -> Vec<TransformChunk> {
        let mut chunks = Vec::new();
        run(Uuid::new_v4(), request, chunk_size, &mut |chunk| {
            chunks.push(chunk)
        })
        .expect("transform failed");
        chunks
    }

    fn flow_request(measure_count: usize) -> TransformRequest {
        let spatial = vec![
            PositionSample {
                timestamp: 0,
                latitude: 1.0,
                longitude: 1.0,
            },
            PositionSample {
                timestamp: 1_000,
                latitude: 2.0,
                longitude: 2.0,
            },
        ];
        let measures = (0..measure_count)
            .map(|i| FlowMeasure {
                timestamp: i as i64,
                no2: Some(12.4),
                voc: Some(88.6),
                pm10: Some(7.5),
                pm25: Some(3.2),
                pm1: Some(1.9),
                aqi: Some(42),
            })
            .collect();
        TransformRequest::Flow(FlowPayload { spatial, measures })
    }

    #[test]
    fn empty_job_emits_exactly_one_terminal_chunk() {
        let chunks = collect(TransformRequest::AirBeam(Vec::new()), 256);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].complete);
        assert!(chunks[0].results.is_empty());
    }

    #[test]
    fn chunking_covers_every_row_and_terminates_once() {
        let chunks = collect(flow_request(300), 256);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].results.len(), 256);
        assert!(!chunks[0].complete);
        assert_eq!(chunks[1].results.len(), 44);
        assert!(chunks[1].complete);
    }

    #[test]
    fn exact_multiple_of_chunk_size_still_ends_with_a_terminal_chunk() {
        let chunks = collect(flow_request(512), 256);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].results.len(), 0);
        assert!(chunks[2].complete);
        let total: usize = chunks.iter().map(|c| c.results.len()).sum();
        assert_eq!(total, 512);
    }

    #[test]
    fn flow_rows_take_interpolated_positions_and_rounded_metrics() {
        let chunks = collect(flow_request(1), 256);
        let CanonicalRecord::Flow(record) = &chunks[0].results[0] else {
            panic!("expected a flow record");
        };
        // timestamp 0 is an exact hit on the first position sample
        assert_eq!(record.latitude, 1.0);
        assert_eq!(record.no2, Some(12));
        assert_eq!(record.voc, Some(89));
        assert_eq!(record.pm10, Some(8));
        assert_eq!(record.pm25, Some(3));
        assert_eq!(record.pm1, Some(2));
        assert_eq!(record.aqi, Some(42));
    }

    #[test]
    fn flow_without_position_samples_is_a_job_level_error() {
        let request = TransformRequest::Flow(FlowPayload {
            spatial: Vec::new(),
            measures: vec![FlowMeasure::default()],
        });
        let mut emitted = 0usize;
        let err = run(Uuid::new_v4(), request, 256, &mut |_| emitted += 1).unwrap_err();
        assert_eq!(err, TransformError::EmptyPositionIndex);
        assert_eq!(emitted, 0, "failed jobs must not emit a terminal chunk");
    }

    #[test]
    fn airbeam_readings_are_rescaled_and_rounded() {
        let request = TransformRequest::AirBeam(vec![AirBeamReading {
            sensor: 7,
            timestamp_ms: 1_675_089_365_499,
            latitude: 39.123_456,
            longitude: -84.512_344,
            value: 7.6,
        }]);
        let chunks = collect(request, 256);
        let CanonicalRecord::AirBeam(record) = &chunks[0].results[0] else {
            panic!("expected an airbeam record");
        };
        assert_eq!(record.sensor, 7);
        assert_eq!(record.timestamp, 1_675_089_365);
        assert_eq!(record.latitude, 39.1235);
        assert_eq!(record.longitude, -84.5123);
        assert_eq!(record.value, 8);
    }

    #[test]
    fn xrf_metadata_is_interpreted() {
        let reading = XrfReading {
            instrument: "XL3t-970".to_string(),
            reading: "42".to_string(),
            date: "2023-01-30".to_string(),
            time: "14:22:05".to_string(),
            latitude: "39.10314159".to_string(),
            longitude: "-84.512".to_string(),
            method: "Soil".to_string(),
            factor: "".to_string(),
            label: " ".to_string(),
            collimation: "".to_string(),
            units: "ppm".to_string(),
            info: "".to_string(),
            elements: Default::default(),
        };
        let chunks = collect(TransformRequest::Xrf(vec![reading]), 256);
        let CanonicalRecord::Xrf(record) = &chunks[0].results[0] else {
            panic!("expected an xrf record");
        };
        assert_eq!(record.reading, 42);
        assert_eq!(record.timestamp, 1_675_088_525);
        assert_eq!(record.latitude, 39.1031);
        assert_eq!(record.method.as_deref(), Some("Soil"));
        assert_eq!(record.factor, None);
        assert_eq!(record.label, None);
        assert_eq!(record.units.as_deref(), Some("ppm"));
    }

    #[tokio::test]
    async fn progress_accounting_survives_unreadable_xrf_rows() {
        let text = concat!(
            "instrument,reading,date,time,latitude,longitude\n",
            "XL3t-970,41,2023-01-30,14:22:04,39.1031,-84.5120\n",
            "XL3t-970,not-a-number,2023-01-30,14:22:05,39.1031,-84.5120\n",
        );
        let upload = plume_parser::parse_xrf_csv("readings.csv", text).expect("parse failed");
        assert_eq!(upload.issues.len(), 1);

        let request = TransformRequest::Xrf(upload.readings);
        let store = crate::progress::ProgressStore::new();
        let job = Uuid::new_v4();
        store.create(job, request.row_count()).await;

        for chunk in collect(request, 256) {
            store.advance(job, chunk.results.len()).await;
            if chunk.complete {
                store.finish(job).await;
            }
        }

        let snapshot = store.get(job).await.expect("job exists");
        assert!(snapshot.complete);
        assert_eq!(snapshot.max, 1, "the dropped row is not counted");
        assert_eq!(snapshot.value, snapshot.max);
    }

    #[test]
    fn unreadable_xrf_rows_are_dropped_from_the_stream() {
        let good = XrfReading {
            instrument: "XL3t-970".to_string(),
            reading: "1".to_string(),
            date: "2023-01-30".to_string(),
            time: "14:22:05".to_string(),
            latitude: "39.0".to_string(),
            longitude: "-84.0".to_string(),
            ..Default::default()
        };
        let bad = XrfReading {
            reading: "not-a-number".to_string(),
            ..good.clone()
        };
        let chunks = collect(TransformRequest::Xrf(vec![bad, good]), 256);
        let total: usize = chunks.iter().map(|c| c.results.len()).sum();
        assert_eq!(total, 1);
    }
}
