// src/utils/serialization.rs
//! JSON serialization used for every payload handed to document storage.

use serde::Serialize;

/// Serializes a value to its canonical JSON bytes.
///
/// Field order follows the struct definition, so the same document always
/// produces the same bytes and therefore the same content address.
pub fn to_canonical_json<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(data)
}
