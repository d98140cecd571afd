//! # ndx-api — Axum Web Surface for NebulaDOC X
//!
//! Serves the upload page, the conversion endpoint, and the assets that
//! make the page installable and usable offline.
//!
//! ## API Surface
//!
//! | Path                     | Module               | Purpose                      |
//! |--------------------------|----------------------|------------------------------|
//! | `/`                      | [`routes::pages`]    | Upload page with live count  |
//! | `/healthz`               | [`routes::pages`]    | Health probe                 |
//! | `/favicon.ico`           | [`routes::pages`]    | 204, no content              |
//! | `/convert`               | [`routes::convert`]  | PDF upload → DOCX download   |
//! | `/manifest.webmanifest`  | [`routes::pwa`]      | Web app manifest             |
//! | `/service-worker.js`     | [`routes::pwa`]      | Offline cache protocol       |
//! | `/pwa-icon*.{svg,png}`   | [`routes::pwa`]      | Vector and raster icons      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → SecurityHeaders → Handler
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::security_headers::security_headers_middleware;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Security headers wrap every route, so extractor rejections and 404s
/// carry them too.
pub fn app(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .merge(routes::pages::router())
        .merge(routes::pwa::router())
        .merge(routes::convert::router(max_upload_bytes))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
