//! # Conversion Endpoint
//!
//! `POST /convert` accepts a multipart upload in the `pdf` field, runs it
//! through the [`ConversionPipeline`](ndx_core::ConversionPipeline) and
//! streams the finalized DOCX back as an attachment.
//!
//! Oversized bodies are refused before the pipeline sees them: a declared
//! `Content-Length` above the ceiling is rejected up front, and a body that
//! grows past it while streaming is cut off by `DefaultBodyLimit`.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use ndx_core::{validate, JobState, Upload, ValidationError};
use tokio::task::JoinError;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::state::AppState;

/// Multipart field carrying the document.
pub const UPLOAD_FIELD: &str = "pdf";

/// MIME type of the converted document.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Build the conversion router with a body ceiling of `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/convert",
        post(convert).layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
}

/// POST /convert: convert an uploaded PDF to DOCX.
async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    if declared_length(&headers).is_some_and(|len| len > state.config.max_upload_bytes as u64) {
        return Err(AppError::PayloadTooLarge);
    }

    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "request is not a multipart upload");
        AppError::from(ValidationError::MissingFile)
    })?;
    let upload = read_upload(&mut multipart).await?;
    tracing::debug!(state = ?JobState::Received, "upload received");

    let upload = validate(upload)?;

    let pipeline = Arc::clone(&state.pipeline);
    let document = match tokio::task::spawn_blocking(move || pipeline.run(upload)).await {
        Ok(Ok(document)) => document,
        Ok(Err(e)) => return Err(AppError::conversion(&e, &state.pipeline)),
        Err(join_error) => {
            tracing::error!(error = %join_error, "conversion task aborted");
            let cause = panic_cause(join_error);
            return Err(AppError::Conversion(state.pipeline.scrub_paths(&cause)));
        }
    };

    let file = tokio::fs::File::open(&document.path)
        .await
        .map_err(|e| AppError::Internal(format!("open {}: {e}", document.path.display())))?;
    tracing::debug!(output = %document.file_name, state = ?JobState::Served, "serving converted document");

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, DOCX_MIME.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
            (CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Take the first file part named [`UPLOAD_FIELD`], skipping everything else.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        // A part without a filename is a plain form value, not a file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some(Upload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

/// Text of the panic that ended a conversion task.
fn panic_cause(err: JoinError) -> String {
    if !err.is_panic() {
        return "conversion task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "conversion engine panicked".to_string()
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
