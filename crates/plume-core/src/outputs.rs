//! CSV and GeoJSON renderings of stored data, one pair per sensor family.

use chrono::{DateTime, SecondsFormat};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde_json::json;

use crate::types::{AirBeamDataRow, FlowRecord, XrfRecord};

/// Qualitative AQI banding shown on map popups.
pub fn aqi_band(aqi: i64) -> &'static str {
    match aqi {
        i64::MIN..=20 => "Low",
        21..=50 => "Moderate",
        51..=100 => "High",
        101..=150 => "Very High",
        151..=200 => "Excessive",
        201..=250 => "Extreme",
        _ => "Airpocalypse",
    }
}

fn iso8601(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn header(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(",")
}

fn opt_i64(value: Option<i64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn point(latitude: f64, longitude: f64) -> Geometry {
    Geometry::new(GeoValue::Point(vec![longitude, latitude]))
}

pub fn flow_csv(data: &[FlowRecord]) -> String {
    let columns: Vec<String> = [
        "timestamp",
        "ISO 8601",
        "latitude",
        "longitude",
        "NO₂ (ppb)",
        "VOC (ppb)",
        "pm 10 (µg/m³)",
        "pm 2.5 (µg/m³)",
        "pm 1 (µg/m³)",
    ]
    .map(String::from)
    .to_vec();
    let mut lines = vec![header(&columns)];
    for d in data {
        lines.push(
            [
                d.timestamp.to_string(),
                iso8601(d.timestamp),
                format!("{:.4}", d.latitude),
                format!("{:.4}", d.longitude),
                opt_i64(d.no2),
                opt_i64(d.voc),
                opt_i64(d.pm10),
                opt_i64(d.pm25),
                opt_i64(d.pm1),
            ]
            .join(","),
        );
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn flow_geojson(data: &[FlowRecord]) -> FeatureCollection {
    let features = data
        .iter()
        .map(|d| {
            let mut properties = JsonObject::new();
            properties.insert("datetime".into(), json!(iso8601(d.timestamp)));
            properties.insert("timestamp".into(), json!(d.timestamp));
            properties.insert("no2".into(), json!(d.no2));
            properties.insert("voc".into(), json!(d.voc));
            properties.insert("pm10".into(), json!(d.pm10));
            properties.insert("pm25".into(), json!(d.pm25));
            properties.insert("pm1".into(), json!(d.pm1));
            properties.insert(
                "aqi".into(),
                match d.aqi {
                    Some(aqi) => json!(aqi_band(aqi)),
                    None => serde_json::Value::Null,
                },
            );
            Feature {
                bbox: None,
                geometry: Some(point(d.latitude, d.longitude)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn airbeam_csv(data: &[AirBeamDataRow]) -> String {
    let columns: Vec<String> = [
        "timestamp",
        "ISO 8601",
        "latitude",
        "longitude",
        "sensor",
        "measurement type",
        "value",
        "unit",
    ]
    .map(String::from)
    .to_vec();
    let mut lines = vec![header(&columns)];
    for d in data {
        lines.push(
            [
                d.timestamp.to_string(),
                iso8601(d.timestamp),
                format!("{:.4}", d.latitude),
                format!("{:.4}", d.longitude),
                d.package.clone(),
                d.measurement_type.clone(),
                d.value.to_string(),
                d.unit.clone(),
            ]
            .join(","),
        );
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn airbeam_geojson(data: &[AirBeamDataRow]) -> FeatureCollection {
    let features = data
        .iter()
        .map(|d| {
            let mut properties = JsonObject::new();
            properties.insert("datetime".into(), json!(iso8601(d.timestamp)));
            properties.insert("timestamp".into(), json!(d.timestamp));
            properties.insert("sensor".into(), json!(d.package));
            properties.insert("measurement_type".into(), json!(d.measurement_type));
            properties.insert("value".into(), json!(d.value));
            properties.insert("unit".into(), json!(d.unit));
            Feature {
                bbox: None,
                geometry: Some(point(d.latitude, d.longitude)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Element columns are taken from the first reading, matching how the
/// exports are produced (every reading in one file reports the same panel).
pub fn xrf_csv(data: &[XrfRecord]) -> String {
    let mut columns: Vec<String> = ["timestamp", "ISO 8601", "latitude", "longitude"]
        .map(String::from)
        .to_vec();
    let elements: Vec<String> = data
        .first()
        .map(|d| d.elements.keys().cloned().collect())
        .unwrap_or_default();
    for element in &elements {
        columns.push(format!("{element} concentration"));
        columns.push(format!("{element} error1s"));
    }

    let mut lines = vec![header(&columns)];
    for d in data {
        let mut line = vec![
            d.timestamp.to_string(),
            iso8601(d.timestamp),
            format!("{:.4}", d.latitude),
            format!("{:.4}", d.longitude),
        ];
        for element in &elements {
            let reading = d.elements.get(element);
            line.push(opt_f64(reading.and_then(|r| r.concentration)));
            line.push(opt_f64(reading.and_then(|r| r.error1s)));
        }
        lines.push(line.join(","));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn xrf_geojson(data: &[XrfRecord]) -> FeatureCollection {
    let features = data
        .iter()
        .map(|d| {
            let mut properties = JsonObject::new();
            properties.insert("datetime".into(), json!(iso8601(d.timestamp)));
            properties.insert("timestamp".into(), json!(d.timestamp));
            for (element, reading) in &d.elements {
                if let Some(concentration) = reading.concentration {
                    properties.insert(element.clone(), json!(concentration));
                }
            }
            Feature {
                bbox: None,
                geometry: Some(point(d.latitude, d.longitude)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
