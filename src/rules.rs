use crate::policy::PolicyTable;
use crate::topic::SensorAddress;
use crate::units::NormalizedReading;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Increase,
    Decrease,
    On,
    Off,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Increase => "increase",
            Action::Decrease => "decrease",
            Action::On => "on",
            Action::Off => "off",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" => Ok(Action::Increase),
            "decrease" => Ok(Action::Decrease),
            "on" => Ok(Action::On),
            "off" => Ok(Action::Off),
            other => Err(format!("unknown action `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDecision {
    pub address: SensorAddress,
    pub action: Action,
}

/// Evaluates one reading against the policy for its category.
///
/// Categories without a policy are not an error; they simply never produce a
/// decision.
pub fn evaluate(reading: &NormalizedReading, policies: &PolicyTable) -> Option<ControlDecision> {
    let policy = policies.policy_for(&reading.address.sensor_category)?;
    policy.check(reading.value).map(|action| ControlDecision {
        address: reading.address.clone(),
        action,
    })
}
