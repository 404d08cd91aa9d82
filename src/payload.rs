use crate::error::PayloadError;
use serde::{Deserialize, Serialize};

pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// A sensor reading exactly as it arrived on the wire, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub value: f64,
    pub unit: String,
    pub timestamp: String,
}

impl RawReading {
    pub fn new(value: f64, unit: &str, timestamp: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
            timestamp: timestamp.to_string(),
        }
    }
}

/// Decodes a sensor payload.
///
/// The document must be a JSON object carrying `value` (number), `unit`
/// (string) and `timestamp` (string). Any other keys are ignored.
pub fn decode_reading(raw: &[u8]) -> Result<RawReading, PayloadError> {
    if raw.len() > MAX_PAYLOAD_SIZE {
        return Err(PayloadError::TooLarge {
            size: raw.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let document: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| PayloadError::Syntax(e.to_string()))?;

    // serde would also accept a positional array for a struct
    if !document.is_object() {
        return Err(PayloadError::NotAnObject);
    }

    RawReading::deserialize(document).map_err(|e| PayloadError::Schema(e.to_string()))
}

pub fn encode_reading(reading: &RawReading) -> Result<Vec<u8>, PayloadError> {
    serde_json::to_vec(reading).map_err(|e| PayloadError::Serialization(e.to_string()))
}
