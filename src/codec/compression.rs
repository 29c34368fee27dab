//! Body compression: gzip and (zlib-wrapped) deflate, both directions.
//!
//! Decoding is strict about the declared coding: a gzip header on a zlib
//! body (or the reverse) surfaces a decode error rather than a silent
//! fallback, so misconfigured upstreams are caught instead of papered over.

use crate::error::Error;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::{Read, Write};

/// Supported content encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Parses a `Content-Encoding` header value; `identity` and absent map
    /// to `None`.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        match header.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

/// Compresses a body with the given coding.
///
/// # Errors
/// Underlying I/O failures.
pub fn compress(encoding: ContentEncoding, bytes: &[u8]) -> Result<Vec<u8>, Error> {
    match encoding {
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            Ok(encoder.finish()?)
        }
        ContentEncoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Inflates a body declared with the given coding.
///
/// # Errors
/// A body that does not match the declared coding (`zlib: invalid header`
/// style failures surface to the caller as decode errors).
pub fn decompress(encoding: ContentEncoding, bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    match encoding {
        ContentEncoding::Gzip => {
            GzDecoder::new(bytes)
                .read_to_end(&mut output)
                .map_err(|e| Error::decode("gzip", e.to_string()))?;
        }
        ContentEncoding::Deflate => {
            ZlibDecoder::new(bytes)
                .read_to_end(&mut output)
                .map_err(|e| Error::decode("deflate", e.to_string()))?;
        }
    }
    Ok(output)
}
