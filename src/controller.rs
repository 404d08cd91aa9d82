use crate::audit::{AuditRecord, AuditSink};
use crate::bus::{BusMessage, Subscription, Transport};
use crate::command::ControlCommand;
use crate::error::{PipelineError, TransportError};
use crate::pipeline::Pipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum HandleOutcome {
    /// Malformed topic or payload; nothing was recorded or published.
    Dropped(PipelineError),
    NoAction,
    Commanded(ControlCommand),
    /// The decision was made but the transport refused the command.
    PublishFailed {
        command: ControlCommand,
        error: TransportError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub messages_received: u64,
    pub readings_evaluated: u64,
    pub malformed_topics: u64,
    pub invalid_payloads: u64,
    pub unrecognized_units: u64,
    pub commands_published: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    messages_received: AtomicU64,
    readings_evaluated: AtomicU64,
    malformed_topics: AtomicU64,
    invalid_payloads: AtomicU64,
    unrecognized_units: AtomicU64,
    commands_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ControllerStats {
        ControllerStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_evaluated: self.readings_evaluated.load(Ordering::Relaxed),
            malformed_topics: self.malformed_topics.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
            unrecognized_units: self.unrecognized_units.load(Ordering::Relaxed),
            commands_published: self.commands_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Owns the I/O side of the pipeline: feeds it inbound messages, publishes
/// its commands and records what happened.
pub struct MasterController {
    pipeline: Pipeline,
    transport: Arc<dyn Transport>,
    audit: Arc<dyn AuditSink>,
    stats: StatCounters,
}

impl MasterController {
    pub fn new(pipeline: Pipeline, transport: Arc<dyn Transport>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            pipeline,
            transport,
            audit,
            stats: StatCounters::default(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats.snapshot()
    }

    pub fn handle_message(&self, message: &BusMessage, now: DateTime<Utc>) -> HandleOutcome {
        StatCounters::bump(&self.stats.messages_received);
        debug!(topic = %message.topic, payload = %message.payload_str(), "Received message");

        let outcome = match self.pipeline.process(&message.topic, &message.payload, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    PipelineError::MalformedTopic(_) => StatCounters::bump(&self.stats.malformed_topics),
                    PipelineError::InvalidPayload(_) => StatCounters::bump(&self.stats.invalid_payloads),
                }
                warn!(topic = %message.topic, error = %e, "Dropping message");
                return HandleOutcome::Dropped(e);
            }
        };

        StatCounters::bump(&self.stats.readings_evaluated);
        if let Some(diagnostic) = &outcome.diagnostic {
            StatCounters::bump(&self.stats.unrecognized_units);
            warn!(%diagnostic, "Reading accepted with diagnostic");
        }

        info!(
            sensor = %outcome.reading.address,
            value = outcome.reading.value,
            unit = %outcome.reading.unit,
            "Evaluated reading"
        );
        self.audit.record(AuditRecord::SensorReading(outcome.reading));

        let Some(command) = outcome.command else {
            debug!(topic = %message.topic, "Reading within acceptable range");
            return HandleOutcome::NoAction;
        };

        self.publish_command(command)
    }

    pub fn handle(&self, message: &BusMessage) -> HandleOutcome {
        self.handle_message(message, Utc::now())
    }

    fn publish_command(&self, command: ControlCommand) -> HandleOutcome {
        let topic = command.topic();
        let published = command
            .encode_payload()
            .map_err(|e| TransportError::Frame(e.to_string()))
            .and_then(|payload| self.transport.publish(&topic, &payload));

        match published {
            Ok(receivers) => {
                StatCounters::bump(&self.stats.commands_published);
                info!(topic = %topic, action = %command.action, receivers, "Published control command");
                self.audit.record(AuditRecord::ActuatorCommand(command.clone()));
                HandleOutcome::Commanded(command)
            }
            Err(error) => {
                StatCounters::bump(&self.stats.publish_failures);
                error!(topic = %topic, action = %command.action, error = %error, "Failed to publish control command");
                HandleOutcome::PublishFailed { command, error }
            }
        }
    }

    /// Handles messages until `shutdown` resolves or the subscription's bus is
    /// dropped. A controller publishing on the bus it listens to keeps that
    /// bus alive, so in practice `shutdown` is what stops it.
    pub async fn run<F>(&self, mut subscription: Subscription, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(pattern = subscription.pattern(), "Controller listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, controller stopping");
                    break;
                }
                message = subscription.recv() => match message {
                    Some(message) => {
                        self.handle(&message);
                    }
                    None => {
                        info!("Subscription closed, controller stopping");
                        break;
                    }
                },
            }
        }
    }
}
