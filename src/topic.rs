//! Topic addressing for sensor and control traffic.
//!
//! Sensors publish on `verdant/sensors/{node_id}/{sensor_category}` and
//! actuators listen on `verdant/control/{node_id}/{actuator_category}`.

use crate::error::{TopicError, TopicFault};
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "verdant";
pub const SENSOR_DOMAIN: &str = "sensors";
pub const CONTROL_DOMAIN: &str = "control";
pub const TOPIC_SEPARATOR: char = '/';

pub const SENSOR_SUBSCRIPTION: &str = "verdant/sensors/#";
pub const CONTROL_SUBSCRIPTION: &str = "verdant/control/#";

const TOPIC_SEGMENTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorAddress {
    pub node_id: String,
    pub sensor_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorAddress {
    pub node_id: String,
    pub actuator_category: String,
}

impl SensorAddress {
    pub fn new(node_id: &str, sensor_category: &str) -> Result<Self, TopicError> {
        validate_segment(node_id)?;
        validate_segment(sensor_category)?;
        Ok(Self {
            node_id: node_id.to_string(),
            sensor_category: sensor_category.to_string(),
        })
    }
}

impl ActuatorAddress {
    pub fn new(node_id: &str, actuator_category: &str) -> Result<Self, TopicError> {
        validate_segment(node_id)?;
        validate_segment(actuator_category)?;
        Ok(Self {
            node_id: node_id.to_string(),
            actuator_category: actuator_category.to_string(),
        })
    }

    /// The actuator paired with a sensor: same node, same category name.
    pub fn for_sensor(sensor: &SensorAddress) -> Self {
        Self {
            node_id: sensor.node_id.clone(),
            actuator_category: sensor.sensor_category.clone(),
        }
    }
}

impl core::fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.node_id, self.sensor_category)
    }
}

impl core::fmt::Display for ActuatorAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.node_id, self.actuator_category)
    }
}

pub fn decode_sensor_topic(topic: &str) -> Result<SensorAddress, TopicError> {
    let (node_id, sensor_category) = split_topic(topic, SENSOR_DOMAIN)?;
    Ok(SensorAddress {
        node_id: node_id.to_string(),
        sensor_category: sensor_category.to_string(),
    })
}

pub fn decode_control_topic(topic: &str) -> Result<ActuatorAddress, TopicError> {
    let (node_id, actuator_category) = split_topic(topic, CONTROL_DOMAIN)?;
    Ok(ActuatorAddress {
        node_id: node_id.to_string(),
        actuator_category: actuator_category.to_string(),
    })
}

pub fn encode_sensor_topic(address: &SensorAddress) -> String {
    format!(
        "{}/{}/{}/{}",
        NAMESPACE, SENSOR_DOMAIN, address.node_id, address.sensor_category
    )
}

pub fn encode_control_topic(address: &ActuatorAddress) -> String {
    format!(
        "{}/{}/{}/{}",
        NAMESPACE, CONTROL_DOMAIN, address.node_id, address.actuator_category
    )
}

fn split_topic<'a>(topic: &'a str, domain: &str) -> Result<(&'a str, &'a str), TopicError> {
    let segments: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
    if segments.len() != TOPIC_SEGMENTS {
        return Err(TopicError::malformed(topic, TopicFault::SegmentCount(segments.len())));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(TopicError::malformed(topic, TopicFault::EmptySegment));
    }
    if segments[0] != NAMESPACE {
        return Err(TopicError::malformed(topic, TopicFault::Namespace));
    }
    if segments[1] != domain {
        return Err(TopicError::malformed(topic, TopicFault::Domain));
    }
    Ok((segments[2], segments[3]))
}

fn validate_segment(segment: &str) -> Result<(), TopicError> {
    if segment.is_empty() {
        return Err(TopicError::malformed(segment, TopicFault::EmptySegment));
    }
    if segment.contains(TOPIC_SEPARATOR) {
        return Err(TopicError::malformed(segment, TopicFault::SeparatorInSegment));
    }
    Ok(())
}
