use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use plume_core::error::StorageError;
use plume_core::import::run_import;
use plume_core::outputs;
use plume_core::progress::percent;
use plume_core::types::SensorFamily;
use plume_parser::ParsedUpload;
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/import", post(import))
        .route("/import/{id}", get(import_status))
        .route("/flow/summary", get(flow_summary))
        .route("/{family}/range", get(range))
        .route("/{family}/data.csv", get(data_csv))
        .route("/{family}/data.geojson", get(data_geojson))
        .with_state(state)
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        error!("storage operation failed: {err}");
        Self::internal(err.to_string())
    }
}

/// Accepts one multipart export upload, parses it inline, and drives the
/// import in a background task the client polls via `GET /import/{id}`.
async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    else {
        return Err(ApiError::bad_request("upload carried no file part"));
    };
    let filename = field.file_name().unwrap_or("upload").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let upload = tokio::task::spawn_blocking(move || plume_parser::parse_upload(&filename, &bytes))
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let kind = match &upload {
        ParsedUpload::Flow(_) => SensorFamily::Flow,
        ParsedUpload::AirBeam(_) => SensorFamily::AirBeam,
        ParsedUpload::Xrf(_) => SensorFamily::Xrf,
    };
    let rows = upload.row_count();
    let issues = upload.issues().to_vec();

    let job = Uuid::new_v4();
    // Registered before the task starts so a poll can never miss the job.
    state.progress.create(job, rows).await;
    let task_state = state.clone();
    tokio::spawn(async move {
        let outcome = run_import(
            &task_state.dispatcher,
            task_state.repository.as_ref(),
            &task_state.progress,
            job,
            upload,
        )
        .await;
        if let Err(err) = outcome {
            error!(%job, %err, "import failed");
            task_state.progress.remove(job).await;
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job": job,
            "kind": kind,
            "rows": rows,
            "issues": issues,
        })),
    )
        .into_response())
}

async fn import_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let Some(snapshot) = state.progress.get(id).await else {
        return Err(ApiError::not_found(format!("no import job {id}")));
    };
    Ok(Json(json!({
        "complete": snapshot.complete,
        "value": snapshot.value,
        "max": snapshot.max,
        "percent": percent(&snapshot),
    }))
    .into_response())
}

async fn range(
    State(state): State<AppState>,
    Path(family): Path<SensorFamily>,
) -> Result<Response, ApiError> {
    let range = state.repository.temporal_range(family).await?;
    Ok(Json(json!(range)).into_response())
}

#[derive(Debug, Deserialize)]
struct Window {
    #[serde(default)]
    first: i64,
    #[serde(default = "latest")]
    last: i64,
}

fn latest() -> i64 {
    i64::MAX
}

async fn flow_summary(
    State(state): State<AppState>,
    Query(window): Query<Window>,
) -> Result<Response, ApiError> {
    let summary = state
        .repository
        .flow_summary(window.first, window.last)
        .await?;
    Ok(Json(summary).into_response())
}

async fn data_csv(
    State(state): State<AppState>,
    Path(family): Path<SensorFamily>,
    Query(window): Query<Window>,
) -> Result<Response, ApiError> {
    let body = match family {
        SensorFamily::Flow => {
            outputs::flow_csv(&state.repository.flow_data(window.first, window.last).await?)
        }
        SensorFamily::AirBeam => outputs::airbeam_csv(
            &state
                .repository
                .airbeam_data(window.first, window.last)
                .await?,
        ),
        SensorFamily::Xrf => {
            outputs::xrf_csv(&state.repository.xrf_data(window.first, window.last).await?)
        }
    };
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    )
        .into_response())
}

async fn data_geojson(
    State(state): State<AppState>,
    Path(family): Path<SensorFamily>,
    Query(window): Query<Window>,
) -> Result<Response, ApiError> {
    let collection = match family {
        SensorFamily::Flow => {
            outputs::flow_geojson(&state.repository.flow_data(window.first, window.last).await?)
        }
        SensorFamily::AirBeam => outputs::airbeam_geojson(
            &state
                .repository
                .airbeam_data(window.first, window.last)
                .await?,
        ),
        SensorFamily::Xrf => {
            outputs::xrf_geojson(&state.repository.xrf_data(window.first, window.last).await?)
        }
    };
    let body = serde_json::to_string(&collection).map_err(|err| ApiError::internal(err.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "application/geo+json")],
        body,
    )
        .into_response())
}
