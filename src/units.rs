//! Unit normalization.
//!
//! Every reading is mapped onto a small closed set of canonical units before
//! it reaches the rule engine. Units we do not recognize are carried through
//! untouched as [`CanonicalUnit::Unknown`] so a new sensor type never stalls
//! the pipeline.

use crate::payload::RawReading;
use crate::topic::SensorAddress;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CELSIUS_SYMBOL: &str = "C";
pub const PERCENT_SYMBOL: &str = "%";
pub const PASCAL_SYMBOL: &str = "Pa";
pub const LUX_SYMBOL: &str = "lux";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CanonicalUnit {
    Celsius,
    Percent,
    Pascal,
    Lux,
    Unknown(String),
}

impl CanonicalUnit {
    pub fn symbol(&self) -> &str {
        match self {
            CanonicalUnit::Celsius => CELSIUS_SYMBOL,
            CanonicalUnit::Percent => PERCENT_SYMBOL,
            CanonicalUnit::Pascal => PASCAL_SYMBOL,
            CanonicalUnit::Lux => LUX_SYMBOL,
            CanonicalUnit::Unknown(unit) => unit,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, CanonicalUnit::Unknown(_))
    }
}

impl core::fmt::Display for CanonicalUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl From<CanonicalUnit> for String {
    fn from(unit: CanonicalUnit) -> Self {
        match unit {
            CanonicalUnit::Unknown(unit) => unit,
            known => known.symbol().to_string(),
        }
    }
}

impl From<String> for CanonicalUnit {
    fn from(symbol: String) -> Self {
        match symbol.as_str() {
            CELSIUS_SYMBOL => CanonicalUnit::Celsius,
            PERCENT_SYMBOL => CanonicalUnit::Percent,
            PASCAL_SYMBOL => CanonicalUnit::Pascal,
            LUX_SYMBOL => CanonicalUnit::Lux,
            _ => CanonicalUnit::Unknown(symbol),
        }
    }
}

/// Converts a raw `(value, unit)` pair into canonical form. Never fails.
pub fn normalize(value: f64, unit: &str) -> (f64, CanonicalUnit) {
    match unit.trim() {
        "F" | "°F" => (round_to(fahrenheit_to_celsius(value), 2), CanonicalUnit::Celsius),
        "hPa" => (round_to(value * 100.0, 0), CanonicalUnit::Pascal),
        "C" | "°C" => (value, CanonicalUnit::Celsius),
        "%" | "percent" => (value, CanonicalUnit::Percent),
        "Pa" => (value, CanonicalUnit::Pascal),
        "lux" => (value, CanonicalUnit::Lux),
        _ => (value, CanonicalUnit::Unknown(unit.to_string())),
    }
}

/// Re-normalizes an already canonical pair; always returns it unchanged.
pub fn normalize_canonical(value: f64, unit: &CanonicalUnit) -> (f64, CanonicalUnit) {
    normalize(value, unit.symbol())
}

fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// Rounds the exact binary value to `decimals` places, ties to even.
///
/// Formats the exact decimal expansion instead of scaling by `10^n`, which
/// rounds before the tie is decided and overflows near `f64::MAX`.
fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    if decimals == 0 {
        return value.round_ties_even();
    }
    format!("{:.*}", decimals, value).parse().unwrap_or(value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub address: SensorAddress,
    pub value: f64,
    pub unit: CanonicalUnit,
    pub timestamp: String,
}

impl NormalizedReading {
    pub fn from_raw(address: SensorAddress, raw: RawReading) -> Self {
        let (value, unit) = normalize(raw.value, &raw.unit);
        Self {
            address,
            value,
            unit,
            timestamp: normalize_timestamp(raw.timestamp),
        }
    }
}

/// RFC 3339 timestamps are re-rendered in UTC with a trailing `Z`; anything
/// else is kept as sent.
pub fn normalize_timestamp(timestamp: String) -> String {
    match DateTime::parse_from_rfc3339(&timestamp) {
        Ok(parsed) => format_timestamp(parsed.with_timezone(&Utc)),
        Err(_) => timestamp,
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_two_decimals() {
        assert_eq!(round_to(32.222_222, 2), 32.22);
        assert_eq!(round_to(-0.004, 2), -0.0);
        assert_eq!(round_to(-53.225, 2), -53.23);
    }

    #[test]
    fn test_round_ties_to_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
    }

    #[test]
    fn test_canonical_symbols_parse_back() {
        for unit in [
            CanonicalUnit::Celsius,
            CanonicalUnit::Percent,
            CanonicalUnit::Pascal,
            CanonicalUnit::Lux,
        ] {
            assert_eq!(CanonicalUnit::from(String::from(unit.clone())), unit);
        }
    }
}
