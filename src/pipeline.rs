//! The message-to-decision pipeline.
//!
//! [`Pipeline::process`] chains topic decoding, payload decoding, unit
//! normalization, rule evaluation and command construction. It performs no
//! I/O: what to do with the outcome (publish, audit, log) is left to the
//! caller.

use crate::command::{build_command, ControlCommand};
use crate::error::PipelineError;
use crate::payload::decode_reading;
use crate::policy::PolicyTable;
use crate::rules::evaluate;
use crate::topic::{decode_sensor_topic, SensorAddress};
use crate::units::NormalizedReading;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Non-fatal observations made while processing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnrecognizedUnit { address: SensorAddress, unit: String },
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Diagnostic::UnrecognizedUnit { address, unit } => {
                write!(f, "unrecognized unit `{}` from {}, passed through", unit, address)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub reading: NormalizedReading,
    pub diagnostic: Option<Diagnostic>,
    pub command: Option<ControlCommand>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    policies: Arc<PolicyTable>,
}

impl Pipeline {
    pub fn new(policies: Arc<PolicyTable>) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn process(
        &self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let address = decode_sensor_topic(topic)?;
        let raw = decode_reading(payload)?;
        let reading = NormalizedReading::from_raw(address, raw);

        let diagnostic = if reading.unit.is_recognized() {
            None
        } else {
            Some(Diagnostic::UnrecognizedUnit {
                address: reading.address.clone(),
                unit: reading.unit.symbol().to_string(),
            })
        };

        let command = evaluate(&reading, &self.policies).map(|decision| build_command(&decision, now));

        Ok(PipelineOutcome {
            reading,
            diagnostic,
            command,
        })
    }
}
