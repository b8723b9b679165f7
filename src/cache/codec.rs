//! Record encoding for cache tiers.
//!
//! Every stored record starts with a one-byte tag:
//!
//! | Tag | Payload |
//! |---|---|
//! | `0x00` | JSON bytes |
//! | `0x01` | LZ4 block (size-prefixed) of the JSON bytes |
//!
//! Readers never need to know whether a record was compressed.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CacheError;

const TAG_PLAIN: u8 = 0x00;
const TAG_LZ4: u8 = 0x01;

/// Placeholder written when a value cannot be serialized.
const NULL_PLACEHOLDER: &[u8] = b"null";

/// Result of encoding one value.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    /// Length of the uncompressed JSON serialization.
    pub raw_len: usize,
}

/// Serializes values to tagged records, compressing above a size threshold.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    compression_threshold: usize,
}

impl RecordCodec {
    pub fn new(compression_threshold: usize) -> Self {
        Self { compression_threshold }
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    /// Encode a value. Never fails: unserializable values become `null`.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> EncodedRecord {
        self.try_encode(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "storing null placeholder");
            self.encode_json(NULL_PLACEHOLDER.to_vec())
        })
    }

    /// Encode a value, reporting serialization failure.
    pub fn try_encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncodedRecord, CacheError> {
        let json = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(self.encode_json(json))
    }

    fn encode_json(&self, json: Vec<u8>) -> EncodedRecord {
        let raw_len = json.len();

        if raw_len > self.compression_threshold {
            if let Some(bytes) = compress(&json) {
                return EncodedRecord { bytes, compressed: true, raw_len };
            }
        }

        let mut bytes = Vec::with_capacity(raw_len + 1);
        bytes.push(TAG_PLAIN);
        bytes.extend_from_slice(&json);
        EncodedRecord { bytes, compressed: false, raw_len }
    }

    /// Decode a tagged record back into a value.
    pub fn decode<T: DeserializeOwned>(&self, key: &str, record: &[u8]) -> Result<T, CacheError> {
        let json = self.decode_raw(key, record)?;
        serde_json::from_slice(&json).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Strip the tag and decompress if needed, returning JSON bytes.
    pub fn decode_raw(&self, key: &str, record: &[u8]) -> Result<Vec<u8>, CacheError> {
        let corrupt = |reason: String| CacheError::Corrupt { key: key.to_string(), reason };
        let (tag, payload) = record
            .split_first()
            .ok_or_else(|| corrupt("empty record".into()))?;
        match *tag {
            TAG_PLAIN => Ok(payload.to_vec()),
            TAG_LZ4 => lz4::block::decompress(payload, None).map_err(|e| corrupt(e.to_string())),
            other => Err(corrupt(format!("unknown record tag {other:#04x}"))),
        }
    }

    /// Whether a stored record carries the compressed tag.
    pub fn is_compressed(record: &[u8]) -> bool {
        record.first() == Some(&TAG_LZ4)
    }
}

/// LZ4-compress `json`; `None` when compression fails or does not shrink it.
fn compress(json: &[u8]) -> Option<Vec<u8>> {
    match lz4::block::compress(json, None, true) {
        Ok(block) if block.len() < json.len() => {
            let mut bytes = Vec::with_capacity(block.len() + 1);
            bytes.push(TAG_LZ4);
            bytes.extend_from_slice(&block);
            Some(bytes)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "lz4 compression failed, storing plain");
            None
        }
    }
}
