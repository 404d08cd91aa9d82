//! # Verdant Master Controller
//!
//! Control loop for a greenhouse sensor network. Sensor nodes publish
//! readings over a publish/subscribe bus; the master normalizes them,
//! checks them against per-category threshold policies and publishes
//! corrective commands to the matching actuators.
//!
//! ## Features
//!
//! - **Topic addressing**: `verdant/sensors/{node}/{category}` in, `verdant/control/{node}/{category}` out
//! - **Unit normalization**: °F to °C and hPa to Pa, unknown units passed through
//! - **Threshold rules**: min/max policies producing `increase`/`decrease` decisions
//! - **Transport**: in-process broadcast bus plus a line-delimited JSON TCP gateway
//! - **Audit trail**: bounded in-memory history or JSON-lines file
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use verdant::{Pipeline, PolicyTable, ThresholdPolicy};
//!
//! let table = PolicyTable::from_policies([
//!     ThresholdPolicy::with_unit("temperature", None, Some(85.0), "F").unwrap(),
//! ])
//! .unwrap();
//! let pipeline = Pipeline::new(Arc::new(table));
//!
//! let outcome = pipeline
//!     .process(
//!         "verdant/sensors/node01/temperature",
//!         br#"{"value": 90, "unit": "F", "timestamp": "2024-05-01T12:00:00Z"}"#,
//!         chrono::Utc::now(),
//!     )
//!     .unwrap();
//!
//! let command = outcome.command.unwrap();
//! assert_eq!(command.topic(), "verdant/control/node01/temperature");
//! assert_eq!(command.action.as_str(), "decrease");
//! ```
//!
//! ## Architecture
//!
//! - [`topic`] - Topic encoding and decoding
//! - [`payload`] - Sensor payload codec
//! - [`units`] - Unit normalization
//! - [`policy`] / [`rules`] - Threshold policies and the rule engine
//! - [`command`] - Control command construction
//! - [`pipeline`] - The pure message-to-command chain
//! - [`bus`] / [`gateway`] - Transport
//! - [`controller`] - Wires the pipeline to a transport and audit sink
//! - [`config`] - JSON configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod audit;
pub mod bus;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod pipeline;
pub mod policy;
pub mod rules;
pub mod topic;
pub mod units;

// Re-export main public types for convenience
pub use audit::{AuditRecord, AuditSink, JsonLinesAuditSink, MemoryAuditSink};
pub use bus::{BusMessage, InMemoryBus, Subscription, Transport};
pub use command::{build_command, ControlCommand};
pub use config::MasterConfig;
pub use controller::{ControllerStats, HandleOutcome, MasterController};
pub use error::{PayloadError, PipelineError, PolicyError, TopicError, TransportError};
pub use gateway::GatewayClient;
pub use payload::RawReading;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use policy::{PolicyTable, ThresholdPolicy};
pub use rules::{Action, ControlDecision};
pub use topic::{ActuatorAddress, SensorAddress};
pub use units::{CanonicalUnit, NormalizedReading};
