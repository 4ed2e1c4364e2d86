//! SQLite implementation of the measurement storage gateway.

use async_trait::async_trait;
use plume_core::error::StorageError;
use plume_core::repository::MeasurementRepository;
use plume_core::types::{
    AirBeamDataRow, AirBeamRecord, BoundingBox, FlowRecord, FlowSummary, MetricSummary, Position,
    SensorFamily, TemporalRange, XrfRecord,
};
use plume_parser::SensorDescriptor;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

fn backend(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn flow_record(row: &SqliteRow) -> Result<FlowRecord, StorageError> {
    Ok(FlowRecord {
        timestamp: row.try_get("timestamp").map_err(backend)?,
        latitude: row.try_get("latitude").map_err(backend)?,
        longitude: row.try_get("longitude").map_err(backend)?,
        no2: row.try_get("no2").map_err(backend)?,
        voc: row.try_get("voc").map_err(backend)?,
        pm10: row.try_get("pm10").map_err(backend)?,
        pm25: row.try_get("pm25").map_err(backend)?,
        pm1: row.try_get("pm1").map_err(backend)?,
        aqi: row.try_get("aqi").map_err(backend)?,
    })
}

fn metric(row: &SqliteRow, name: &str) -> Result<MetricSummary, StorageError> {
    Ok(MetricSummary {
        min: row
            .try_get(format!("{name}_min").as_str())
            .map_err(backend)?,
        avg: row
            .try_get(format!("{name}_avg").as_str())
            .map_err(backend)?,
        max: row
            .try_get(format!("{name}_max").as_str())
            .map_err(backend)?,
    })
}

fn family_table(family: SensorFamily) -> &'static str {
    match family {
        SensorFamily::Flow => "flow_measurements",
        SensorFamily::AirBeam => "airbeam_measurements",
        SensorFamily::Xrf => "xrf_readings",
    }
}

#[async_trait]
impl MeasurementRepository for SqliteRepository {
    async fn upsert_flow(&self, record: &FlowRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO flow_measurements
                (timestamp, latitude, longitude, no2, voc, pm10, pm25, pm1, aqi)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (timestamp, latitude, longitude) DO UPDATE SET
                no2 = excluded.no2,
                voc = excluded.voc,
                pm10 = excluded.pm10,
                pm25 = excluded.pm25,
                pm1 = excluded.pm1,
                aqi = excluded.aqi
            "#,
        )
        .bind(record.timestamp)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.no2)
        .bind(record.voc)
        .bind(record.pm10)
        .bind(record.pm25)
        .bind(record.pm1)
        .bind(record.aqi)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn upsert_airbeam(&self, record: &AirBeamRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO airbeam_measurements (sensor, timestamp, latitude, longitude, value)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (sensor, timestamp, latitude, longitude) DO UPDATE SET
                value = excluded.value
            "#,
        )
        .bind(record.sensor)
        .bind(record.timestamp)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn upsert_xrf(&self, record: &XrfRecord) -> Result<(), StorageError> {
        let elements = serde_json::to_string(&record.elements).map_err(backend)?;
        sqlx::query(
            r#"
            INSERT INTO xrf_readings
                (instrument, reading, timestamp, latitude, longitude,
                 method, factor, label, collimation, units, info, elements)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (instrument, reading) DO UPDATE SET
                timestamp = excluded.timestamp,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                method = excluded.method,
                factor = excluded.factor,
                label = excluded.label,
                collimation = excluded.collimation,
                units = excluded.units,
                info = excluded.info,
                elements = excluded.elements
            "#,
        )
        .bind(&record.instrument)
        .bind(record.reading)
        .bind(record.timestamp)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.method)
        .bind(&record.factor)
        .bind(&record.label)
        .bind(&record.collimation)
        .bind(&record.units)
        .bind(&record.info)
        .bind(elements)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_or_create_sensor(
        &self,
        descriptor: &SensorDescriptor,
    ) -> Result<i64, StorageError> {
        let existing = sqlx::query(
            "SELECT id FROM sensors WHERE package = ? AND measurement_type = ? AND unit = ?",
        )
        .bind(&descriptor.package)
        .bind(&descriptor.measurement_type)
        .bind(&descriptor.unit)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        if let Some(row) = existing {
            return row.try_get("id").map_err(backend);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO sensors (package, measurement_type, unit)
            VALUES (?, ?, ?)
            ON CONFLICT (package, measurement_type, unit) DO NOTHING
            "#,
        )
        .bind(&descriptor.package)
        .bind(&descriptor.measurement_type)
        .bind(&descriptor.unit)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::ConstraintViolation(format!(
                "sensor insert affected no rows for {}/{}/{}",
                descriptor.package, descriptor.measurement_type, descriptor.unit
            )));
        }
        Ok(result.last_insert_rowid())
    }

    async fn flow_summary(&self, first: i64, last: i64) -> Result<FlowSummary, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS samples,
                   MIN(latitude) AS lat_min, MAX(latitude) AS lat_max,
                   MIN(longitude) AS lon_min, MAX(longitude) AS lon_max,
                   MIN(no2) AS no2_min, CAST(ROUND(AVG(no2)) AS INTEGER) AS no2_avg, MAX(no2) AS no2_max,
                   MIN(voc) AS voc_min, CAST(ROUND(AVG(voc)) AS INTEGER) AS voc_avg, MAX(voc) AS voc_max,
                   MIN(pm10) AS pm10_min, CAST(ROUND(AVG(pm10)) AS INTEGER) AS pm10_avg, MAX(pm10) AS pm10_max,
                   MIN(pm25) AS pm25_min, CAST(ROUND(AVG(pm25)) AS INTEGER) AS pm25_avg, MAX(pm25) AS pm25_max,
                   MIN(pm1) AS pm1_min, CAST(ROUND(AVG(pm1)) AS INTEGER) AS pm1_avg, MAX(pm1) AS pm1_max,
                   MIN(aqi) AS aqi_min, CAST(ROUND(AVG(aqi)) AS INTEGER) AS aqi_avg, MAX(aqi) AS aqi_max
            FROM flow_measurements
            WHERE timestamp BETWEEN ? AND ?
            "#,
        )
        .bind(first)
        .bind(last)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let lat_min: Option<f64> = row.try_get("lat_min").map_err(backend)?;
        let spatial = match lat_min {
            Some(lat_min) => Some(BoundingBox {
                min: Position {
                    latitude: lat_min,
                    longitude: row.try_get("lon_min").map_err(backend)?,
                },
                max: Position {
                    latitude: row.try_get("lat_max").map_err(backend)?,
                    longitude: row.try_get("lon_max").map_err(backend)?,
                },
            }),
            None => None,
        };

        Ok(FlowSummary {
            count: row.try_get("samples").map_err(backend)?,
            spatial,
            no2: metric(&row, "no2")?,
            voc: metric(&row, "voc")?,
            pm10: metric(&row, "pm10")?,
            pm25: metric(&row, "pm25")?,
            pm1: metric(&row, "pm1")?,
            aqi: metric(&row, "aqi")?,
        })
    }

    async fn temporal_range(
        &self,
        family: SensorFamily,
    ) -> Result<Option<TemporalRange>, StorageError> {
        let query = format!(
            "SELECT MIN(timestamp) AS time_min, MAX(timestamp) AS time_max FROM {}",
            family_table(family)
        );
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let min: Option<i64> = row.try_get("time_min").map_err(backend)?;
        let max: Option<i64> = row.try_get("time_max").map_err(backend)?;
        Ok(match (min, max) {
            (Some(min), Some(max)) => Some(TemporalRange { min, max }),
            _ => None,
        })
    }

    async fn flow_data(&self, first: i64, last: i64) -> Result<Vec<FlowRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, latitude, longitude, no2, voc, pm10, pm25, pm1, aqi
            FROM flow_measurements
            WHERE timestamp BETWEEN ? AND ?
            ORDER BY timestamp
            "#,
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(flow_record).collect()
    }

    async fn airbeam_data(
        &self,
        first: i64,
        last: i64,
    ) -> Result<Vec<AirBeamDataRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT a.timestamp, a.latitude, a.longitude, a.value,
                   s.package, s.measurement_type, s.unit
            FROM airbeam_measurements a
            JOIN sensors s ON s.id = a.sensor
            WHERE a.timestamp BETWEEN ? AND ?
            ORDER BY a.timestamp
            "#,
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(|row| {
                Ok(AirBeamDataRow {
                    timestamp: row.try_get("timestamp").map_err(backend)?,
                    latitude: row.try_get("latitude").map_err(backend)?,
                    longitude: row.try_get("longitude").map_err(backend)?,
                    package: row.try_get("package").map_err(backend)?,
                    measurement_type: row.try_get("measurement_type").map_err(backend)?,
                    unit: row.try_get("unit").map_err(backend)?,
                    value: row.try_get("value").map_err(backend)?,
                })
            })
            .collect()
    }

    async fn xrf_data(&self, first: i64, last: i64) -> Result<Vec<XrfRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT instrument, reading, timestamp, latitude, longitude,
                   method, factor, label, collimation, units, info, elements
            FROM xrf_readings
            WHERE timestamp BETWEEN ? AND ?
            ORDER BY timestamp
            "#,
        )
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(|row| {
                let elements: String = row.try_get("elements").map_err(backend)?;
                Ok(XrfRecord {
                    instrument: row.try_get("instrument").map_err(backend)?,
                    reading: row.try_get("reading").map_err(backend)?,
                    timestamp: row.try_get("timestamp").map_err(backend)?,
                    latitude: row.try_get("latitude").map_err(backend)?,
                    longitude: row.try_get("longitude").map_err(backend)?,
                    method: row.try_get("method").map_err(backend)?,
                    factor: row.try_get("factor").map_err(backend)?,
                    label: row.try_get("label").map_err(backend)?,
                    collimation: row.try_get("collimation").map_err(backend)?,
                    units: row.try_get("units").map_err(backend)?,
                    info: row.try_get("info").map_err(backend)?,
                    elements: serde_json::from_str(&elements).map_err(backend)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
