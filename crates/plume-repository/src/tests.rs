use std::collections::BTreeMap;

use plume_core::repository::MeasurementRepository;
use plume_core::types::{AirBeamRecord, FlowRecord, SensorFamily, XrfRecord};
use plume_parser::{ElementReading, SensorDescriptor};

use super::SqliteRepository;

async fn repository() -> SqliteRepository {
    let repository = SqliteRepository::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory pool");
    repository.run_migrations().await.expect("migrations");
    repository
}

fn flow_record(timestamp: i64, no2: Option<i64>) -> FlowRecord {
    FlowRecord {
        timestamp,
        latitude: 39.1031,
        longitude: -84.5128,
        no2,
        voc: Some(88),
        pm10: Some(8),
        pm25: Some(3),
        pm1: Some(2),
        aqi: Some(42),
    }
}

#[tokio::test]
async fn flow_upsert_is_idempotent_on_the_natural_key() {
    let repository = repository().await;
    repository
        .upsert_flow(&flow_record(1_675_088_525, Some(12)))
        .await
        .expect("first insert");
    repository
        .upsert_flow(&flow_record(1_675_088_525, Some(15)))
        .await
        .expect("conflicting insert");

    let data = repository
        .flow_data(0, i64::MAX)
        .await
        .expect("flow data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].no2, Some(15));
}

#[tokio::test]
async fn sensor_identities_are_stable_per_descriptor() {
    let repository = repository().await;
    let pm = SensorDescriptor {
        package: "AirBeam3-94e6".to_string(),
        measurement_type: "Particulate Matter".to_string(),
        unit: "µg/m³".to_string(),
    };
    let rh = SensorDescriptor {
        package: "AirBeam3-94e6".to_string(),
        measurement_type: "Humidity".to_string(),
        unit: "%".to_string(),
    };

    let first = repository.get_or_create_sensor(&pm).await.expect("create");
    let again = repository.get_or_create_sensor(&pm).await.expect("lookup");
    let other = repository.get_or_create_sensor(&rh).await.expect("create");
    assert_eq!(first, again);
    assert_ne!(first, other);

    repository
        .upsert_airbeam(&AirBeamRecord {
            sensor: first,
            timestamp: 1_675_089_365,
            latitude: 39.1031,
            longitude: -84.5128,
            value: 8,
        })
        .await
        .expect("insert");
    let data = repository
        .airbeam_data(0, i64::MAX)
        .await
        .expect("airbeam data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].measurement_type, "Particulate Matter");
    assert_eq!(data[0].value, 8);
}

#[tokio::test]
async fn temporal_range_is_none_for_an_empty_family() {
    let repository = repository().await;
    let range = repository
        .temporal_range(SensorFamily::AirBeam)
        .await
        .expect("range query");
    assert!(range.is_none());

    repository
        .upsert_flow(&flow_record(100, Some(1)))
        .await
        .expect("insert");
    repository
        .upsert_flow(&flow_record(900, Some(2)))
        .await
        .expect("insert");
    let range = repository
        .temporal_range(SensorFamily::Flow)
        .await
        .expect("range query")
        .expect("populated range");
    assert_eq!((range.min, range.max), (100, 900));
}

#[tokio::test]
async fn flow_summary_aggregates_each_metric_and_the_bounding_box() {
    let repository = repository().await;
    repository
        .upsert_flow(&FlowRecord {
            timestamp: 100,
            latitude: 39.10,
            longitude: -84.52,
            no2: Some(10),
            voc: None,
            pm10: Some(4),
            pm25: Some(3),
            pm1: Some(1),
            aqi: Some(20),
        })
        .await
        .expect("insert");
    repository
        .upsert_flow(&FlowRecord {
            timestamp: 200,
            latitude: 39.12,
            longitude: -84.50,
            no2: Some(15),
            voc: None,
            pm10: Some(8),
            pm25: Some(5),
            pm1: Some(3),
            aqi: Some(60),
        })
        .await
        .expect("insert");

    let summary = repository.flow_summary(0, 1_000).await.expect("summary");
    assert_eq!(summary.count, 2);
    assert_eq!(summary.no2.min, Some(10));
    assert_eq!(summary.no2.avg, Some(13));
    assert_eq!(summary.no2.max, Some(15));
    assert_eq!(summary.voc.avg, None);
    let spatial = summary.spatial.expect("bounding box");
    assert_eq!(spatial.min.latitude, 39.10);
    assert_eq!(spatial.max.longitude, -84.50);

    let empty = repository
        .flow_summary(5_000, 9_000)
        .await
        .expect("summary");
    assert_eq!(empty.count, 0);
    assert!(empty.spatial.is_none());
}

#[tokio::test]
async fn xrf_elements_survive_the_json_column() {
    let repository = repository().await;
    let mut elements = BTreeMap::new();
    elements.insert(
        "Fe".to_string(),
        ElementReading {
            compound: None,
            compound_level: None,
            compound_error: None,
            concentration: Some(41_250.0),
            error1s: Some(312.5),
        },
    );
    let record = XrfRecord {
        instrument: "XL3t-970".to_string(),
        reading: 42,
        timestamp: 1_675_088_525,
        latitude: 39.1031,
        longitude: -84.5128,
        method: Some("Soil".to_string()),
        factor: None,
        label: None,
        collimation: None,
        units: Some("ppm".to_string()),
        info: None,
        elements,
    };

    repository.upsert_xrf(&record).await.expect("insert");
    repository.upsert_xrf(&record).await.expect("reinsert");
    let data = repository.xrf_data(0, i64::MAX).await.expect("xrf data");
    assert_eq!(data.len(), 1);
    assert_eq!(data[0], record);
}
