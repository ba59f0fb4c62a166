// src/utils/serialization.rs
//! Serialization utilities.

use serde::{Deserialize, Serialize};

/// Serializes a value to a compact JSON string.
///
/// Struct fields are emitted in declaration order and sequences in their
/// stored order, so equal values always serialize to identical bytes.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Decodes a base64 blob holding a JSON document.
///
/// # Errors
/// Returns a message describing whether the base64, UTF-8, or JSON layer failed.
pub fn deserialize_base64_json<T: for<'de> Deserialize<'de>>(blob: &str) -> Result<T, String> {
    let bytes = base64::decode(blob.trim()).map_err(|e| format!("Base64 decoding failed: {}", e))?;
    let text = String::from_utf8(bytes).map_err(|e| format!("Bundle is not UTF-8: {}", e))?;
    deserialize(&text).map_err(|e| format!("Bundle is not valid JSON: {}", e))
}
