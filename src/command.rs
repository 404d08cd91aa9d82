use crate::error::{CommandDecodeError, PayloadError};
use crate::rules::{Action, ControlDecision};
use crate::topic::{decode_control_topic, encode_control_topic, ActuatorAddress};
use crate::units::format_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMMAND_SOURCE: &str = "master";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub address: ActuatorAddress,
    pub action: Action,
    pub source: String,
    pub timestamp: String,
}

/// Wire body of a control message; the address travels in the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPayload {
    pub action: Action,
    pub source: String,
    pub timestamp: String,
}

pub fn build_command(decision: &ControlDecision, at: DateTime<Utc>) -> ControlCommand {
    ControlCommand::manual(ActuatorAddress::for_sensor(&decision.address), decision.action, at)
}

impl ControlCommand {
    /// A command issued directly to an actuator rather than derived from a
    /// rule, e.g. switching a fan `on`.
    pub fn manual(address: ActuatorAddress, action: Action, at: DateTime<Utc>) -> Self {
        Self {
            address,
            action,
            source: COMMAND_SOURCE.to_string(),
            timestamp: format_timestamp(at),
        }
    }

    pub fn topic(&self) -> String {
        encode_control_topic(&self.address)
    }

    pub fn payload(&self) -> ControlPayload {
        ControlPayload {
            action: self.action,
            source: self.source.clone(),
            timestamp: self.timestamp.clone(),
        }
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(&self.payload()).map_err(|e| PayloadError::Serialization(e.to_string()))
    }

    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, CommandDecodeError> {
        let address = decode_control_topic(topic)?;
        let body: ControlPayload =
            serde_json::from_slice(payload).map_err(|e| CommandDecodeError::Payload(e.to_string()))?;
        Ok(Self {
            address,
            action: body.action,
            source: body.source,
            timestamp: body.timestamp,
        })
    }
}
