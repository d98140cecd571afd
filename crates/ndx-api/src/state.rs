//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! AppState holds the only process-wide state the service has:
//! - **Counter** — the persisted success count, owned by [`PersistentCounter`]
//! - **Pipeline** — staging/output directories plus the conversion engine
//! - **Icons** — PNG icons encoded once at startup and never mutated
//! - **Service worker** — the offline cache script rendered once at startup
//!
//! Everything is behind `Arc`, so cloning the state per request is cheap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use ndx_core::{
    CacheManifest, CommandEngine, ConversionEngine, ConversionPipeline, ConverterCommand,
    EncodeError, GeneratedAsset, PersistentCounter, Rgb,
};
use thiserror::Error;

/// Request body ceiling: 35 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 35 * 1024 * 1024;

/// Fill color of the generated PNG icons (`#0B1230`).
pub const ICON_COLOR: Rgb = Rgb(11, 18, 48);

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Directory receiving finalized DOCX files.
    pub output_dir: PathBuf,
    /// Directory receiving per-job temporary files.
    pub staging_dir: PathBuf,
    /// File holding the persisted conversion count.
    pub counter_file: PathBuf,
    /// Largest accepted request body, in bytes. Only the ceiling moves;
    /// the 413 message keeps advertising the 35MB product limit.
    pub max_upload_bytes: usize,
    /// External converter invocation.
    pub converter: ConverterCommand,
}

impl AppConfig {
    /// Default layout under `data_dir`: `output/`, `tmp/`, `conversion_count.txt`.
    pub fn rooted_at(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            port: 5000,
            output_dir: data_dir.join("output"),
            staging_dir: data_dir.join("tmp"),
            counter_file: data_dir.join("conversion_count.txt"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            converter: ConverterCommand::default(),
        }
    }

    /// Build configuration from `PORT` and the `NDX_*` environment variables.
    pub fn from_env() -> Self {
        let data_dir = env_path("NDX_DATA_DIR").unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::rooted_at(&data_dir);

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(dir) = env_path("NDX_OUTPUT_DIR") {
            config.output_dir = dir;
        }
        if let Some(dir) = env_path("NDX_STAGING_DIR") {
            config.staging_dir = dir;
        }
        if let Some(file) = env_path("NDX_COUNTER_FILE") {
            config.counter_file = file;
        }
        if let Some(limit) = std::env::var("NDX_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_upload_bytes = limit;
        }
        if let Ok(program) = std::env::var("NDX_CONVERTER") {
            let args = std::env::var("NDX_CONVERTER_ARGS")
                .unwrap_or_else(|_| "convert {input} {output}".to_string());
            config.converter = ConverterCommand::parse(&program, &args);
        }
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Error building the application state at startup.
#[derive(Error, Debug)]
pub enum StartupError {
    /// An icon could not be encoded.
    #[error("failed to generate icon: {0}")]
    Icon(#[from] EncodeError),

    /// A data directory could not be created.
    #[error("failed to prepare data directories: {0}")]
    Io(#[from] std::io::Error),
}

/// One generated raster icon with the MIME type it is served under.
#[derive(Debug, Clone)]
pub struct Icon {
    /// Encoded image.
    pub bytes: Bytes,
    /// MIME tag carried over from the encoder.
    pub mime: &'static str,
}

impl From<GeneratedAsset> for Icon {
    fn from(asset: GeneratedAsset) -> Self {
        let mime = asset.mime();
        Self {
            bytes: Bytes::from(asset.into_bytes()),
            mime,
        }
    }
}

/// Raster icons produced once at startup.
#[derive(Debug, Clone)]
pub struct IconSet {
    /// 192×192 PNG.
    pub icon_192: Icon,
    /// 512×512 PNG.
    pub icon_512: Icon,
}

impl IconSet {
    /// Encode both icon sizes in [`ICON_COLOR`].
    pub fn generate() -> Result<Self, EncodeError> {
        Ok(Self {
            icon_192: GeneratedAsset::solid_png(192, ICON_COLOR)?.into(),
            icon_512: GeneratedAsset::solid_png(512, ICON_COLOR)?.into(),
        })
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub counter: Arc<PersistentCounter>,
    pub pipeline: Arc<ConversionPipeline>,
    pub icons: Arc<IconSet>,
    pub service_worker: Arc<str>,
}

impl AppState {
    /// Build the state with the external command engine from `config`.
    pub fn try_new(config: AppConfig) -> Result<Self, StartupError> {
        let engine = Arc::new(CommandEngine::new(config.converter.clone()));
        Self::with_engine(config, engine)
    }

    /// Build the state around an explicit conversion engine.
    pub fn with_engine(
        config: AppConfig,
        engine: Arc<dyn ConversionEngine>,
    ) -> Result<Self, StartupError> {
        let counter = Arc::new(PersistentCounter::new(&config.counter_file));
        let pipeline = ConversionPipeline::new(
            &config.staging_dir,
            &config.output_dir,
            Arc::clone(&counter),
            engine,
        )?;
        let icons = IconSet::generate()?;
        let service_worker = CacheManifest::default().service_worker_script();

        tracing::debug!(?config, "application state initialized");

        Ok(Self {
            config: Arc::new(config),
            counter,
            pipeline: Arc::new(pipeline),
            icons: Arc::new(icons),
            service_worker: Arc::from(service_worker),
        })
    }
}
