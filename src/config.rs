//! Master controller configuration, read from a JSON file.
//!
//! Every field has a default, so an empty object (or no file at all) gives a
//! controller listening on the local gateway with the greenhouse policies.

use crate::bus::DEFAULT_BUS_CAPACITY;
use crate::error::{ConfigError, PolicyError};
use crate::policy::{PolicyTable, ThresholdPolicy};
use crate::topic::SENSOR_SUBSCRIPTION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";
pub const DEFAULT_GATEWAY_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GATEWAY_HOST.to_string(),
            port: DEFAULT_GATEWAY_PORT,
        }
    }
}

impl GatewayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Bounds for one category as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl PolicyBounds {
    fn to_policy(&self, category: &str) -> Result<ThresholdPolicy, PolicyError> {
        match &self.unit {
            Some(unit) => ThresholdPolicy::with_unit(category, self.min, self.max, unit),
            None => ThresholdPolicy::new(category, self.min, self.max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MasterConfig {
    pub gateway: GatewayConfig,
    pub subscribe_pattern: String,
    pub bus_capacity: usize,
    pub audit_log: Option<PathBuf>,
    pub policies: BTreeMap<String, PolicyBounds>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            subscribe_pattern: SENSOR_SUBSCRIPTION.to_string(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            audit_log: None,
            policies: greenhouse_policies(),
        }
    }
}

fn bounds(min: Option<f64>, max: Option<f64>, unit: &str) -> PolicyBounds {
    PolicyBounds {
        min,
        max,
        unit: Some(unit.to_string()),
    }
}

/// Default thresholds; temperature limits are written in °F.
pub fn greenhouse_policies() -> BTreeMap<String, PolicyBounds> {
    BTreeMap::from([
        ("temperature".to_string(), bounds(Some(60.0), Some(85.0), "F")),
        ("humidity".to_string(), bounds(Some(40.0), Some(80.0), "%")),
        ("soil_moisture".to_string(), bounds(Some(30.0), None, "%")),
    ])
}

impl MasterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the read-only policy table. Policies whose `min` exceeds their
    /// `max` are kept but reported.
    pub fn policy_table(&self) -> Result<PolicyTable, ConfigError> {
        let policies = self
            .policies
            .iter()
            .map(|(category, bounds)| bounds.to_policy(category))
            .collect::<Result<Vec<_>, _>>()?;

        for policy in policies.iter().filter(|p| p.is_inverted()) {
            warn!(
                category = policy.sensor_category(),
                min = ?policy.min(),
                max = ?policy.max(),
                "Policy min exceeds max; violations on both sides resolve to decrease"
            );
        }

        Ok(PolicyTable::from_policies(policies)?)
    }
}
