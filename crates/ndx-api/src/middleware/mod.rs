//! # Middleware Stack
//!
//! - [`security_headers`] — hardening headers applied to every response.

pub mod security_headers;
