use crate::{annotation_service::AnnotationError, server::SharedState};
use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";
const ROUTE: &str = "/detect";

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Missing `file` field in upload")]
    MissingFile,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("{0}")]
    Annotation(#[from] AnnotationError),
    #[error("Annotation task failed: {0}")]
    Task(String),
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl DetectError {
    fn status(&self) -> StatusCode {
        match self {
            DetectError::Multipart(e) => e.status(),
            DetectError::MissingFile | DetectError::EmptyFile => StatusCode::BAD_REQUEST,
            DetectError::Annotation(AnnotationError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            DetectError::Annotation(_) | DetectError::Task(_) | DetectError::HttpBuilder(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Detect request failed: {}", self);
        } else {
            tracing::warn!("Detect request rejected: {}", self);
        }
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

struct Upload {
    filename: String,
    data: Bytes,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, DetectError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(DetectError::EmptyFile);
        }

        return Ok(Upload { filename, data });
    }

    Err(DetectError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn detect(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Response, DetectError> {
    state.metrics.record_request(ROUTE);

    let upload = read_upload(&mut multipart).await?;
    tracing::info!(
        filename = %upload.filename,
        bytes = upload.data.len(),
        "Received image"
    );

    let annotation_service = state.annotation_service.clone();
    let start = Instant::now();
    let annotated_image_data =
        tokio::task::spawn_blocking(move || annotation_service.annotate(&upload.data))
            .await
            .map_err(|e| DetectError::Task(e.to_string()))??;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(annotated_image_data))
        .map_err(|e| DetectError::HttpBuilder(e.to_string()))?;

    Ok(response)
}
