//! # Installable Web-App Assets
//!
//! Web manifest, offline service worker, and the vector and raster icons.
//! Raster icons are the PNGs generated once at startup ([`crate::state::IconSet`]);
//! the service worker script is rendered once from the cache manifest.

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderName;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use ndx_core::{APP_NAME, APP_SHORT_NAME};
use serde::{Deserialize, Serialize};

use crate::state::{AppState, Icon};

const ICON_SVG: &str = include_str!("../../assets/pwa-icon.svg");
const THEME_COLOR: &str = "#0B1230";
const SERVICE_WORKER_ALLOWED: HeaderName = HeaderName::from_static("service-worker-allowed");

/// Web application manifest.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebManifest {
    pub name: String,
    pub short_name: String,
    pub description: String,
    pub start_url: String,
    pub scope: String,
    pub display: String,
    pub orientation: String,
    pub background_color: String,
    pub theme_color: String,
    pub lang: String,
    pub icons: Vec<ManifestIcon>,
}

/// One icon entry of the web manifest.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestIcon {
    pub src: String,
    pub sizes: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub purpose: String,
}

impl ManifestIcon {
    fn new(src: &str, sizes: &str, mime: &str) -> Self {
        Self {
            src: src.to_string(),
            sizes: sizes.to_string(),
            mime: mime.to_string(),
            purpose: "any maskable".to_string(),
        }
    }
}

impl Default for WebManifest {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            short_name: APP_SHORT_NAME.to_string(),
            description: "Convert PDF files to DOCX quickly and securely.".to_string(),
            start_url: "/".to_string(),
            scope: "/".to_string(),
            display: "standalone".to_string(),
            orientation: "portrait-primary".to_string(),
            background_color: THEME_COLOR.to_string(),
            theme_color: THEME_COLOR.to_string(),
            lang: "en".to_string(),
            icons: vec![
                ManifestIcon::new("/pwa-icon-192.png", "192x192", "image/png"),
                ManifestIcon::new("/pwa-icon-512.png", "512x512", "image/png"),
                ManifestIcon::new("/pwa-icon.svg", "any", "image/svg+xml"),
            ],
        }
    }
}

/// Build the web-app asset router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/manifest.webmanifest", get(web_manifest))
        .route("/service-worker.js", get(service_worker))
        .route("/pwa-icon.svg", get(icon_svg))
        .route("/pwa-icon-192.png", get(icon_192))
        .route("/pwa-icon-512.png", get(icon_512))
}

/// GET /manifest.webmanifest
async fn web_manifest() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/manifest+json")],
        Json(WebManifest::default()),
    )
}

/// GET /service-worker.js: Offline cache protocol, never cached itself.
async fn service_worker(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "application/javascript"),
            (SERVICE_WORKER_ALLOWED, "/"),
            (CACHE_CONTROL, "no-cache"),
        ],
        state.service_worker.to_string(),
    )
}

/// GET /pwa-icon.svg
async fn icon_svg() -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/svg+xml")], ICON_SVG)
}

/// GET /pwa-icon-192.png
async fn icon_192(State(state): State<AppState>) -> impl IntoResponse {
    icon_response(&state.icons.icon_192)
}

/// GET /pwa-icon-512.png
async fn icon_512(State(state): State<AppState>) -> impl IntoResponse {
    icon_response(&state.icons.icon_512)
}

fn icon_response(icon: &Icon) -> impl IntoResponse {
    ([(CONTENT_TYPE, icon.mime)], icon.bytes.clone())
}
