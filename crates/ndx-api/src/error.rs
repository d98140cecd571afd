//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Every failure leaves the service as `{"error": "<message>"}` with the
//! matching status code:
//!
//! | Variant | Status | Message |
//! |---------|--------|---------|
//! | `BadRequest` | 400 | the specific validation message |
//! | `PayloadTooLarge` | 413 | fixed size-limit message |
//! | `Conversion` | 500 | `Conversion failed: <cause>` |
//! | `Internal` | 500 | generic; detail is logged only |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ndx_core::{ConversionError, ConversionPipeline, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for bodies above the upload ceiling.
///
/// The text is fixed at the 35MB product limit and does not follow
/// `NDX_MAX_UPLOAD_BYTES`, which only moves the enforced ceiling.
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "File is too large. Maximum supported size is 35MB.";

const INTERNAL_MESSAGE: &str = "A server error occurred.";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed or non-PDF upload (400).
    #[error("{0}")]
    BadRequest(String),

    /// Request body exceeds the configured ceiling (413).
    #[error("File is too large. Maximum supported size is 35MB.")]
    PayloadTooLarge,

    /// Staging, engine or finalization failure (500). The cause is returned.
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Unexpected server fault (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Conversion(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build a conversion error from a pipeline failure. Engine failures
    /// report the engine's own message, and the pipeline's directories are
    /// scrubbed from the text.
    pub fn conversion(err: &ConversionError, pipeline: &ConversionPipeline) -> Self {
        Self::Conversion(pipeline.scrub_paths(&conversion_cause(err)))
    }
}

fn conversion_cause(err: &ConversionError) -> String {
    match err {
        ConversionError::Engine(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
