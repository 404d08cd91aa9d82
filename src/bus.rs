//! Publish/subscribe transport.
//!
//! The controller only sees the [`Transport`] capability. [`InMemoryBus`] is
//! the in-process implementation; the TCP gateway bridges it to external
//! nodes.

use crate::error::TransportError;
use crate::payload::MAX_PAYLOAD_SIZE;
use crate::topic::TOPIC_SEPARATOR;
use static_assertions::const_assert;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const MAX_MESSAGE_SIZE: usize = 4096;
pub const DEFAULT_BUS_CAPACITY: usize = 256;

const SINGLE_LEVEL_WILDCARD: &str = "+";
const MULTI_LEVEL_WILDCARD: &str = "#";

const_assert!(MAX_PAYLOAD_SIZE <= MAX_MESSAGE_SIZE);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        }
    }

    /// Payloads accepted by [`InMemoryBus`] are always UTF-8.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub trait Transport: Send + Sync {
    /// Returns how many subscribers the message was handed to.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<usize, TransportError>;

    fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;
}

/// MQTT-style filter matching: `+` matches one level, a trailing `#` matches
/// any number of remaining levels (including none).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split(TOPIC_SEPARATOR);
    let mut topic_levels = topic.split(TOPIC_SEPARATOR);

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

pub fn validate_pattern(pattern: &str) -> Result<(), TransportError> {
    if pattern.is_empty() {
        return Err(TransportError::InvalidPattern(pattern.to_string()));
    }
    let levels: Vec<&str> = pattern.split(TOPIC_SEPARATOR).collect();
    for (index, level) in levels.iter().enumerate() {
        let is_last = index + 1 == levels.len();
        let misplaced_multi = level.contains(MULTI_LEVEL_WILDCARD) && (*level != MULTI_LEVEL_WILDCARD || !is_last);
        let partial_single = level.contains(SINGLE_LEVEL_WILDCARD) && *level != SINGLE_LEVEL_WILDCARD;
        if misplaced_multi || partial_single {
            return Err(TransportError::InvalidPattern(pattern.to_string()));
        }
    }
    Ok(())
}

pub fn validate_topic(topic: &str) -> Result<(), TransportError> {
    if topic.is_empty() || topic.contains(SINGLE_LEVEL_WILDCARD) || topic.contains(MULTI_LEVEL_WILDCARD) {
        return Err(TransportError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

/// Single-process bus backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct InMemoryBus {
    sender: broadcast::Sender<BusMessage>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryBus {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<usize, TransportError> {
        validate_topic(topic)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        // Gateway subscribers receive payloads as JSON strings
        if std::str::from_utf8(payload).is_err() {
            return Err(TransportError::NonUtf8Payload);
        }

        match self.sender.send(BusMessage::new(topic, payload)) {
            Ok(receivers) => {
                debug!(topic, receivers, "Message published");
                Ok(receivers)
            }
            // Nobody listening is not a failure on a pub/sub bus
            Err(_) => {
                debug!(topic, "Message published with no subscribers");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        validate_pattern(pattern)?;
        debug!(pattern, "New subscription");
        Ok(Subscription {
            receiver: self.sender.subscribe(),
            pattern: pattern.to_string(),
        })
    }
}

/// Messages matching one filter pattern.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<BusMessage>,
    pattern: String,
}

impl Subscription {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next matching message, or `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if topic_matches(&self.pattern, &message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(pattern = %self.pattern, skipped, "Subscriber lagged, messages dropped");
                }
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if topic_matches(&self.pattern, &message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(pattern = %self.pattern, skipped, "Subscriber lagged, messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
