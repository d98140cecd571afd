//! # Route Modules
//!
//! - [`convert`] — `POST /convert`, the upload and conversion endpoint.
//! - [`pages`] — upload page, favicon and health probe.
//! - [`pwa`] — web manifest, service worker and icons.

pub mod convert;
pub mod pages;
pub mod pwa;
