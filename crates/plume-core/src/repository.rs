//! The storage gateway contract. The engine behind it (schema, SQL, upsert
//! statements) is an external collaborator; the core only depends on these
//! operations.

use async_trait::async_trait;
use plume_parser::SensorDescriptor;

use crate::error::StorageError;
use crate::types::{
    AirBeamDataRow, AirBeamRecord, FlowRecord, FlowSummary, SensorFamily, TemporalRange, XrfRecord,
};

#[async_trait]
pub trait MeasurementRepository: Send + Sync {
    /// Upsert by natural key (timestamp, latitude, longitude); resubmitting
    /// an identical record must leave one row reflecting the latest values.
    async fn upsert_flow(&self, record: &FlowRecord) -> Result<(), StorageError>;

    /// Upsert by natural key (sensor, timestamp, latitude, longitude).
    async fn upsert_airbeam(&self, record: &AirBeamRecord) -> Result<(), StorageError>;

    /// Upsert by natural key (instrument, reading number).
    async fn upsert_xrf(&self, record: &XrfRecord) -> Result<(), StorageError>;

    /// Resolves the sensor identity for a composite descriptor, creating it
    /// on first sight. An insert reporting zero affected rows surfaces as
    /// [`StorageError::ConstraintViolation`].
    async fn get_or_create_sensor(
        &self,
        descriptor: &SensorDescriptor,
    ) -> Result<i64, StorageError>;

    /// Min/avg/max per metric plus the bounding box over `[first, last]`.
    async fn flow_summary(&self, first: i64, last: i64) -> Result<FlowSummary, StorageError>;

    /// `None` when the family has no stored rows.
    async fn temporal_range(
        &self,
        family: SensorFamily,
    ) -> Result<Option<TemporalRange>, StorageError>;

    async fn flow_data(&self, first: i64, last: i64) -> Result<Vec<FlowRecord>, StorageError>;

    async fn airbeam_data(
        &self,
        first: i64,
        last: i64,
    ) -> Result<Vec<AirBeamDataRow>, StorageError>;

    async fn xrf_data(&self, first: i64, last: i64) -> Result<Vec<XrfRecord>, StorageError>;
}
