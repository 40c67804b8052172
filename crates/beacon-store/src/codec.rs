//! Service-list codec
//!
//! Encodes an ordered list of service descriptors to the JSON blob stored
//! as a column value and decodes it back. Decoding ignores unknown fields,
//! so newer writers stay readable.

use beacon_common::{Result, Service};

/// Encode a service list for storage.
pub fn encode(services: &[Service]) -> Result<String> {
    Ok(serde_json::to_string(services)?)
}

/// Decode a stored service list.
pub fn decode(value: &str) -> Result<Vec<Service>> {
    Ok(serde_json::from_str(value)?)
}
