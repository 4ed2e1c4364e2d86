//! End-to-end ingestion of one uploaded export: parse output goes in, a
//! transform job is dispatched, and every returned chunk is upserted into
//! the store while the job's progress record advances.

use plume_parser::{ParsedUpload, RowIssue};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, ImportError};
use crate::progress::ProgressStore;
use crate::repository::MeasurementRepository;
use crate::types::{
    AirBeamReading, CanonicalRecord, FlowPayload, SensorFamily, TransformRequest,
};

/// What one import actually did, including the rows parsing had to drop.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReceipt {
    pub job: Uuid,
    pub kind: SensorFamily,
    pub total: usize,
    pub stored: usize,
    pub issues: Vec<RowIssue>,
}

/// Runs one import job to its terminal chunk. The caller supplies the job
/// id so it can hand it to pollers before the work starts.
pub async fn run_import(
    dispatcher: &Dispatcher,
    repository: &dyn MeasurementRepository,
    progress: &ProgressStore,
    job: Uuid,
    upload: ParsedUpload,
) -> Result<ImportReceipt, ImportError> {
    let (request, issues) = prepare(repository, upload).await?;
    let kind = request.kind();
    let total = request.row_count();
    progress.create(job, total).await;

    let mut handle = dispatcher.call(request).await?;
    let mut stored = 0usize;
    loop {
        let Some(message) = handle.recv().await else {
            return Err(ImportError::Dispatch(DispatchError::ChannelClosed));
        };
        let chunk = message?;
        for record in &chunk.results {
            match record {
                CanonicalRecord::Flow(record) => repository.upsert_flow(record).await?,
                CanonicalRecord::AirBeam(record) => repository.upsert_airbeam(record).await?,
                CanonicalRecord::Xrf(record) => repository.upsert_xrf(record).await?,
            }
        }
        stored += chunk.results.len();
        progress.advance(job, chunk.results.len()).await;
        if chunk.complete {
            progress.finish(job).await;
            break;
        }
    }

    info!(%job, kind = kind.as_str(), total, stored, "import complete");
    Ok(ImportReceipt {
        job,
        kind,
        total,
        stored,
        issues,
    })
}

/// Builds the transform request. AirBeam sessions have their sensor
/// identities resolved here, before the job is submitted, so the worker
/// only ever sees opaque identity references.
async fn prepare(
    repository: &dyn MeasurementRepository,
    upload: ParsedUpload,
) -> Result<(TransformRequest, Vec<RowIssue>), ImportError> {
    match upload {
        ParsedUpload::Flow(archive) => Ok((
            TransformRequest::Flow(FlowPayload {
                spatial: archive.spatial,
                measures: archive.measures,
            }),
            archive.issues,
        )),
        ParsedUpload::AirBeam(upload) => {
            let mut readings = Vec::new();
            for session in upload.sessions {
                let sensor = repository.get_or_create_sensor(&session.descriptor).await?;
                readings.extend(session.readings.into_iter().map(|r| AirBeamReading {
                    sensor,
                    timestamp_ms: r.timestamp_ms,
                    latitude: r.latitude,
                    longitude: r.longitude,
                    value: r.value,
                }));
            }
            Ok((TransformRequest::AirBeam(readings), upload.issues))
        }
        ParsedUpload::Xrf(upload) => Ok((TransformRequest::Xrf(upload.readings), upload.issues)),
    }
}
