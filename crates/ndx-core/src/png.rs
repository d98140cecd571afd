//! # Solid-Color PNG Encoder
//!
//! Produces PNG byte streams from a square size and a single RGB color
//! without an image library. The layout is the minimal conforming one:
//!
//! ```text
//! signature | IHDR (13 bytes) | IDAT (zlib, best compression) | IEND
//! ```
//!
//! Every chunk is `length (BE u32) | tag | payload | CRC-32(tag ‖ payload)`.
//! Each scanline starts with filter byte 0 followed by `width` RGB triples.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use thiserror::Error;

/// The fixed 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Largest edge length accepted by [`encode_solid_png`].
pub const MAX_DIMENSION: u32 = 8192;

const BIT_DEPTH: u8 = 8;
const COLOR_TYPE_RGB: u8 = 2;

/// An 8-bit-per-channel RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Errors from [`encode_solid_png`].
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Width and height must be positive.
    #[error("image dimension must be positive")]
    ZeroDimension,

    /// The requested edge length exceeds [`MAX_DIMENSION`].
    #[error("image dimension {0} exceeds the maximum of 8192")]
    TooLarge(u32),

    /// The deflate stream could not be produced.
    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// An immutable binary asset generated at startup, tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsset {
    bytes: Vec<u8>,
    mime: &'static str,
}

impl GeneratedAsset {
    /// Encode a square solid-color PNG asset.
    pub fn solid_png(size: u32, color: Rgb) -> Result<Self, EncodeError> {
        Ok(Self {
            bytes: encode_solid_png(size, color)?,
            mime: "image/png",
        })
    }

    /// Raw encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type to serve the asset with.
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Consume the asset, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode a `size`×`size` PNG filled uniformly with `color`.
pub fn encode_solid_png(size: u32, color: Rgb) -> Result<Vec<u8>, EncodeError> {
    if size == 0 {
        return Err(EncodeError::ZeroDimension);
    }
    if size > MAX_DIMENSION {
        return Err(EncodeError::TooLarge(size));
    }

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&size.to_be_bytes());
    ihdr.extend_from_slice(&size.to_be_bytes());
    // depth, color type, compression, filter, interlace
    ihdr.extend_from_slice(&[BIT_DEPTH, COLOR_TYPE_RGB, 0, 0, 0]);

    let width = size as usize;
    let mut scanline = Vec::with_capacity(1 + 3 * width);
    scanline.push(0);
    for _ in 0..width {
        scanline.extend_from_slice(&[color.0, color.1, color.2]);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    for _ in 0..size {
        encoder.write_all(&scanline)?;
    }
    let idat = encoder.finish()?;

    let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + idat.len() + 3 * 12 + 13);
    out.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut out, b"IHDR", &ihdr);
    write_chunk(&mut out, b"IDAT", &idat);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Append one chunk: length, tag, payload, CRC over tag and payload.
fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
    let mut crc = Crc::new();
    crc.update(tag);
    crc.update(payload);

    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}
