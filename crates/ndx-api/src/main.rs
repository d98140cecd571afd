//! # ndx-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for NebulaDOC X.
//! Binds to configurable port (default 5000).

use ndx_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let port = config.port;

    let state = AppState::try_new(config).map_err(|e| {
        tracing::error!("Startup failed: {e}");
        e
    })?;
    tracing::info!(
        output_dir = %state.config.output_dir.display(),
        conversions = state.counter.read(),
        converter = %state.config.converter.program,
        "NebulaDOC X ready"
    );

    let app = ndx_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("NebulaDOC X listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
