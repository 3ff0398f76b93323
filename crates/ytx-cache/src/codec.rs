//! On-disk entry format.
//!
//! Each entry is a gzip-compressed JSON envelope carrying the payload
//! (base64) and the time it was stored.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};

/// Bump when the envelope layout changes; older entries then read as misses.
pub const ENTRY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    stored_at: DateTime<Utc>,
    payload: String,
}

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub stored_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// Encode a payload and its stored timestamp to gzip bytes.
pub fn encode_entry(payload: &[u8], stored_at: DateTime<Utc>) -> CacheResult<Vec<u8>> {
    let envelope = Envelope {
        version: ENTRY_FORMAT_VERSION,
        stored_at,
        payload: BASE64.encode(payload),
    };
    let json = serde_json::to_vec(&envelope)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| CacheError::serialization(format!("Failed to gzip cache entry: {}", e)))?;

    encoder
        .finish()
        .map_err(|e| CacheError::serialization(format!("Failed to finish gzip encoding: {}", e)))
}

/// Decode gzip bytes to an entry.
///
/// Returns `None` if decompression, parsing or base64 decoding fails, or if
/// the entry was written by a different format version.
pub fn decode_entry(data: &[u8]) -> Option<StoredEntry> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();

    if let Err(e) = decoder.read_to_end(&mut json) {
        warn!(error = %e, "Failed to decompress cache entry");
        return None;
    }

    let envelope: Envelope = match serde_json::from_slice(&json) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Failed to parse cache entry");
            return None;
        }
    };

    if envelope.version != ENTRY_FORMAT_VERSION {
        debug!(
            cached_version = envelope.version,
            current_version = ENTRY_FORMAT_VERSION,
            "Cache entry version mismatch, treating as miss"
        );
        return None;
    }

    match BASE64.decode(envelope.payload.as_bytes()) {
        Ok(payload) => Some(StoredEntry {
            stored_at: envelope.stored_at,
            payload,
        }),
        Err(e) => {
            warn!(error = %e, "Failed to decode cache payload");
            None
        }
    }
}
