//! Payload codec seam.
//!
//! Command payloads cross the ring as bytes; this is the one place that
//! decides how. JSON keeps the wire format debuggable and bijective; any
//! replacement only has to touch these two functions.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}
