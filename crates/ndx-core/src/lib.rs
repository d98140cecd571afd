#![deny(missing_docs)]

//! # ndx-core — Conversion Core for NebulaDOC X
//!
//! Everything the converter service needs apart from HTTP plumbing and the
//! document transformation itself. The crate has no web dependency; the
//! `ndx-api` crate wires these pieces into an Axum router.
//!
//! ## Components (leaf-first)
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`png`] | Byte-exact PNG encoder for solid-color icons, built once at startup |
//! | [`counter`] | Crash-tolerant persisted success counter, one lock per read-modify-write |
//! | [`naming`] | Untrusted filename sanitization and collision-free output names |
//! | [`engine`] | Contract for the external conversion engine and its release guard |
//! | [`pipeline`] | Validate → stage → convert → finalize → count, cleanup on every path |
//! | [`offline`] | Versioned app-shell cache manifest and the service worker it renders |
//!
//! ## Design Principles
//!
//! 1. **Resources are released by `Drop`.** Staging files and engine handles
//!    are owned by guards, so early returns, `?` and panics all clean up.
//!
//! 2. **Client errors never touch the disk.** [`pipeline::validate`] runs
//!    before anything is staged.
//!
//! 3. **Structured errors with `thiserror`.** No `.unwrap()` outside tests.

pub mod counter;
pub mod engine;
pub mod naming;
pub mod offline;
pub mod pipeline;
pub mod png;

pub use counter::{CounterError, PersistentCounter};
pub use engine::{
    CommandEngine, ConversionEngine, Converter, ConverterCommand, EngineError, EngineSession,
};
pub use naming::{output_file_name, sanitize_name, split_extension, UniquenessToken};
pub use offline::CacheManifest;
pub use pipeline::{
    validate, ConversionError, ConversionJob, ConversionPipeline, ConvertedDocument, JobState,
    Upload, ValidatedUpload, ValidationError,
};
pub use png::{encode_solid_png, EncodeError, GeneratedAsset, Rgb};

/// Human-facing product name.
pub const APP_NAME: &str = "NebulaDOC X";

/// Short product name used by the web manifest and the icon artwork.
pub const APP_SHORT_NAME: &str = "NDX";

/// Prefix of every finalized output file name.
pub const OUTPUT_FILENAME_PREFIX: &str = "nebuladocx";

/// Application version, shared by `/healthz` and the cache storage key.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
