//! # Filename Sanitization and Output Naming
//!
//! Uploaded filenames are untrusted and never reach the filesystem as-is.
//! [`sanitize_name`] reduces any input to a non-empty token over
//! `[A-Za-z0-9._-]`, and [`output_file_name`] combines the sanitized stem
//! with a [`UniquenessToken`] so that concurrent jobs never collide, even
//! when their source filenames are identical.

use std::fmt;

use chrono::{Local, NaiveDateTime};
use uuid::Uuid;

use crate::OUTPUT_FILENAME_PREFIX;

/// Substituted whenever sanitization leaves nothing behind.
pub const FALLBACK_NAME: &str = "converted";

/// Extension given to every finalized output.
pub const OUTPUT_EXTENSION: &str = ".docx";

/// Reduce an untrusted filename to a safe, non-empty base name.
///
/// Path components are discarded (both `/` and `\` count as separators),
/// every char outside `[A-Za-z0-9._-]` becomes `_`, runs of `_` collapse,
/// and leading/trailing `.`/`_` are trimmed. The result is idempotent.
pub fn sanitize_name(name: &str) -> String {
    if name.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let unified = name.replace('\\', "/");
    let trimmed = unified.trim();
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let out = out.trim_matches(|c| c == '.' || c == '_');
    if out.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        out.to_string()
    }
}

/// Split a filename into `(stem, extension)`, the extension including its dot.
///
/// Only the final path segment is considered, and a segment whose only dots
/// are leading (`.pdf`, `..`) has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let segment_start = name.rfind('/').map_or(0, |i| i + 1);
    let segment = &name[segment_start..];

    match segment.rfind('.') {
        Some(dot) if segment[..dot].chars().any(|c| c != '.') => {
            let at = segment_start + dot;
            (&name[..at], &name[at..])
        }
        _ => (name, ""),
    }
}

/// Collision-resistant suffix: local timestamp at second resolution plus
/// eight random hex digits, e.g. `20261019142501_9f3ab2c4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessToken(String);

impl UniquenessToken {
    /// Generate a token from the current local time and a fresh v4 UUID.
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self::from_parts(Local::now().naive_local(), &random[..8])
    }

    /// Build a token from an explicit timestamp and hex suffix.
    pub fn from_parts(at: NaiveDateTime, hex: &str) -> Self {
        Self(format!("{}_{}", at.format("%Y%m%d%H%M%S"), hex))
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniquenessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final download name: `nebuladocx_<stem>_<token>.docx`, sanitized as a whole.
pub fn output_file_name(stem: &str, token: &UniquenessToken) -> String {
    let base = sanitize_name(&format!("{OUTPUT_FILENAME_PREFIX}_{stem}_{token}"));
    format!("{base}{OUTPUT_EXTENSION}")
}
