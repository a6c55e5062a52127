//! Blob codec for the structured sub-documents.
//!
//! Each of the ten sub-documents of a cookbook version is stored as one
//! opaque BLOB column. A [`BlobCodec`] turns a JSON value into bytes and back;
//! the store only requires that decoding an encoded value reproduces it.

use serde_json::Value;
use thiserror::Error;

/// Deepest nesting [`JsonCodec`] accepts.
///
/// Kept below `serde_json`'s own recursion limit so every value that encodes
/// also decodes.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Errors produced by a [`BlobCodec`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value nests deeper than the codec supports.
    #[error("value nests deeper than {max} levels")]
    TooDeep { max: usize },

    /// The bytes are not a valid encoding, or serialization failed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes structured values into storage blobs.
pub trait BlobCodec {
    /// Encodes `value` into bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes produced by [`encode`](Self::encode).
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Stores sub-documents as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BlobCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        if exceeds_depth(value, MAX_NESTING_DEPTH) {
            return Err(CodecError::TooDeep {
                max: MAX_NESTING_DEPTH,
            });
        }
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Returns `true` if `value` has more than `remaining` levels of containers.
fn exceeds_depth(value: &Value, remaining: usize) -> bool {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(fields) => Box::new(fields.values()),
        _ => return false,
    };
    if remaining == 0 {
        return true;
    }
    children.into_iter().any(|child| exceeds_depth(child, remaining - 1))
}
