//! Storage encoding for content bodies and embeddings.
//!
//! Bodies are gzip-compressed before they reach a repository; vectors are
//! little-endian `f32` blobs (see [`recall_core::embedding::vec_to_blob`]).

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

use crate::error::{RecallError, Result};

pub use recall_core::embedding::{blob_to_vec, vec_to_blob};

/// Gzip `text`.
pub fn compress_content(text: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| RecallError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| RecallError::Compression(e.to_string()))
}

/// Inverse of [`compress_content`]. Fails on corrupt input or non-UTF-8 text.
pub fn decompress_content(bytes: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| RecallError::Compression(e.to_string()))?;
    Ok(text)
}
