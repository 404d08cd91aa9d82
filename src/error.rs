use thiserror::Error;

/// Why a topic string could not be decoded into an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFault {
    SegmentCount(usize),
    Namespace,
    Domain,
    EmptySegment,
    SeparatorInSegment,
}

impl core::fmt::Display for TopicFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TopicFault::SegmentCount(n) => write!(f, "expected 4 segments, found {}", n),
            TopicFault::Namespace => write!(f, "unexpected namespace"),
            TopicFault::Domain => write!(f, "unexpected domain"),
            TopicFault::EmptySegment => write!(f, "empty segment"),
            TopicFault::SeparatorInSegment => write!(f, "segment contains '/'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("malformed topic `{topic}`: {fault}")]
    Malformed { topic: String, fault: TopicFault },
}

impl TopicError {
    pub(crate) fn malformed(topic: &str, fault: TopicFault) -> Self {
        TopicError::Malformed {
            topic: topic.to_string(),
            fault,
        }
    }

    pub fn fault(&self) -> TopicFault {
        match self {
            TopicError::Malformed { fault, .. } => *fault,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("payload is not valid JSON: {0}")]
    Syntax(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload does not match the reading schema: {0}")]
    Schema(String),
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("policy for `{0}` has neither a min nor a max bound")]
    NoBounds(String),
    #[error("policy for `{category}` has a non-finite bound ({bound})")]
    NonFiniteBound { category: String, bound: f64 },
    #[error("policy for `{0}` is defined more than once")]
    Duplicate(String),
    #[error("policy category must not be empty")]
    EmptyCategory,
}

/// Errors that cause the pipeline to drop an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedTopic(#[from] TopicError),
    #[error(transparent)]
    InvalidPayload(#[from] PayloadError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("invalid publish topic `{0}`")]
    InvalidTopic(String),
    #[error("invalid subscription pattern `{0}`")]
    InvalidPattern(String),
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },
    #[error("payload is not UTF-8")]
    NonUtf8Payload,
    #[error("malformed gateway frame: {0}")]
    Frame(String),
    #[error("gateway reported: {0}")]
    Remote(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandDecodeError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error("invalid control payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
