//! # Page and Probe Routes
//!
//! `/` renders the upload page with the current conversion count,
//! `/healthz` reports service identity, and `/favicon.ico` answers 204.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use ndx_core::{APP_NAME, APP_VERSION};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

const INDEX_TEMPLATE: &str = include_str!("../../assets/index.html");
const COUNT_SLOT: &str = "{{conversion_count}}";

/// Health probe response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Build the page router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/favicon.ico", get(favicon))
        .route("/healthz", get(healthz))
}

/// Substitute the conversion count into the page template.
pub fn render_index(count: u64) -> String {
    INDEX_TEMPLATE.replace(COUNT_SLOT, &count.to_string())
}

/// GET /: Upload page.
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(state.counter.read()))
}

/// GET /favicon.ico: No content.
async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /healthz: Service name, status and version.
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_a_single_count_slot() {
        assert_eq!(INDEX_TEMPLATE.matches(COUNT_SLOT).count(), 1);
    }

    #[test]
    fn render_substitutes_count() {
        let page = render_index(1234);
        assert!(page.contains("<strong>1234</strong>"));
        assert!(!page.contains(COUNT_SLOT));
    }

    #[test]
    fn page_registers_service_worker() {
        assert!(INDEX_TEMPLATE.contains("serviceWorker.register('/service-worker.js')"));
        assert!(INDEX_TEMPLATE.contains("/manifest.webmanifest"));
    }
}
