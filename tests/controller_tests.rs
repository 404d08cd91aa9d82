use chrono::{TimeZone, Utc};
use std::sync::Arc;
use verdant::audit::*;
use verdant::bus::{BusMessage, InMemoryBus, Subscription, Transport};
use verdant::controller::*;
use verdant::error::{PipelineError, TransportError};
use verdant::pipeline::Pipeline;
use verdant::policy::{PolicyTable, ThresholdPolicy};
use verdant::rules::Action;
use verdant::topic::CONTROL_SUBSCRIPTION;

struct FailingTransport;

impl Transport for FailingTransport {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<usize, TransportError> {
        Err(TransportError::Closed)
    }

    fn subscribe(&self, _pattern: &str) -> Result<Subscription, TransportError> {
        Err(TransportError::Closed)
    }
}

fn greenhouse_pipeline() -> Pipeline {
    let table = PolicyTable::from_policies([
        ThresholdPolicy::with_unit("temperature", None, Some(85.0), "F").unwrap(),
        ThresholdPolicy::at_least("humidity", 40.0).unwrap(),
    ])
    .unwrap();
    Pipeline::new(Arc::new(table))
}

fn setup() -> (Arc<InMemoryBus>, Arc<MemoryAuditSink>, MasterController) {
    let bus = Arc::new(InMemoryBus::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let transport: Arc<dyn Transport> = bus.clone();
    let sink: Arc<dyn AuditSink> = audit.clone();
    let controller = MasterController::new(greenhouse_pipeline(), transport, sink);
    (bus, audit, controller)
}

fn message(topic: &str, payload: &str) -> BusMessage {
    BusMessage::new(topic, payload.as_bytes())
}

#[test]
fn test_violation_published_on_control_topic() {
    let (bus, audit, controller) = setup();
    let mut control = bus.subscribe(CONTROL_SUBSCRIPTION).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 10, 3, 15, 0, 2).unwrap();

    let outcome = controller.handle_message(
        &message(
            "verdant/sensors/node01/temperature",
            r#"{"value":90.0,"unit":"F","timestamp":"2025-10-03T15:00:00Z"}"#,
        ),
        now,
    );
    assert!(matches!(outcome, HandleOutcome::Commanded(ref c) if c.action == Action::Decrease));

    let published = control.try_recv().unwrap();
    assert_eq!(published.topic, "verdant/control/node01/temperature");
    let payload: serde_json::Value = serde_json::from_slice(&published.payload).unwrap();
    assert_eq!(
        payload,
        serde_json::json!({"action": "decrease", "source": "master", "timestamp": "2025-10-03T15:00:02Z"})
    );
    assert!(control.try_recv().is_none());

    assert_eq!(audit.readings().len(), 1);
    assert_eq!(audit.commands().len(), 1);
    assert_eq!(audit.readings()[0].value, 32.22);
}

#[test]
fn test_malformed_payload_publishes_nothing() {
    let (bus, audit, controller) = setup();
    let mut control = bus.subscribe(CONTROL_SUBSCRIPTION).unwrap();

    let outcome = controller.handle(&message("verdant/sensors/node01/temperature", "not a json string"));
    assert!(matches!(outcome, HandleOutcome::Dropped(PipelineError::InvalidPayload(_))));
    assert!(control.try_recv().is_none());
    assert!(audit.is_empty());

    let stats = controller.stats();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.invalid_payloads, 1);
    assert_eq!(stats.readings_evaluated, 0);
}

#[test]
fn test_errors_do_not_affect_later_messages() {
    let (bus, _audit, controller) = setup();
    let mut control = bus.subscribe(CONTROL_SUBSCRIPTION).unwrap();

    controller.handle(&message("verdant/sensors/node01", "{}"));
    controller.handle(&message("verdant/sensors/node01/humidity", "{\"value\":"));
    let outcome = controller.handle(&message(
        "verdant/sensors/node01/humidity",
        r#"{"value":25,"unit":"%","timestamp":"2025-10-03T15:00:00Z"}"#,
    ));

    assert!(matches!(outcome, HandleOutcome::Commanded(ref c) if c.action == Action::Increase));
    assert_eq!(control.try_recv().unwrap().topic, "verdant/control/node01/humidity");

    let stats = controller.stats();
    assert_eq!(stats.malformed_topics, 1);
    assert_eq!(stats.invalid_payloads, 1);
    assert_eq!(stats.commands_published, 1);
}

#[test]
fn test_in_range_reading_audited_without_command() {
    let (_bus, audit, controller) = setup();
    let outcome = controller.handle(&message(
        "verdant/sensors/node01/temperature",
        r#"{"value":72.0,"unit":"F","timestamp":"2025-10-03T15:00:00Z"}"#,
    ));
    assert!(matches!(outcome, HandleOutcome::NoAction));
    assert_eq!(audit.len(), 1);
    assert!(audit.commands().is_empty());
}

#[test]
fn test_unknown_unit_counted() {
    let (_bus, audit, controller) = setup();
    controller.handle(&message(
        "verdant/sensors/node01/co2",
        r#"{"value":900,"unit":"ppm","timestamp":"2025-10-03T15:00:00Z"}"#,
    ));
    assert_eq!(controller.stats().unrecognized_units, 1);
    assert_eq!(audit.readings()[0].unit.symbol(), "ppm");
}

#[test]
fn test_publish_failure_reported() {
    let audit = Arc::new(MemoryAuditSink::new());
    let sink: Arc<dyn AuditSink> = audit.clone();
    let controller = MasterController::new(greenhouse_pipeline(), Arc::new(FailingTransport), sink);

    let outcome = controller.handle(&message(
        "verdant/sensors/node01/temperature",
        r#"{"value":90.0,"unit":"F","timestamp":"2025-10-03T15:00:00Z"}"#,
    ));
    match outcome {
        HandleOutcome::PublishFailed { command, error } => {
            assert_eq!(command.action, Action::Decrease);
            assert!(matches!(error, TransportError::Closed));
        }
        other => panic!("expected publish failure, got {:?}", other),
    }

    // The reading is still recorded; the unsent command is not
    assert_eq!(audit.readings().len(), 1);
    assert!(audit.commands().is_empty());
    assert_eq!(controller.stats().publish_failures, 1);

    let next = controller.handle(&message(
        "verdant/sensors/node01/humidity",
        r#"{"value":50,"unit":"%","timestamp":"2025-10-03T15:00:00Z"}"#,
    ));
    assert!(matches!(next, HandleOutcome::NoAction));
}

#[tokio::test]
async fn test_run_loop_consumes_sensor_traffic() {
    let (bus, audit, controller) = setup();
    let controller = Arc::new(controller);
    let sensors = bus.subscribe("verdant/sensors/#").unwrap();
    let mut control = bus.subscribe(CONTROL_SUBSCRIPTION).unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = Arc::clone(&controller);
    let task = tokio::spawn(async move {
        runner
            .run(sensors, async {
                let _ = stop_rx.await;
            })
            .await
    });

    bus.publish(
        "verdant/sensors/node09/temperature",
        br#"{"value":95.0,"unit":"F","timestamp":"2025-10-03T15:00:00Z"}"#,
    )
    .unwrap();

    let command = tokio::time::timeout(std::time::Duration::from_secs(2), control.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(command.topic, "verdant/control/node09/temperature");
    assert_eq!(audit.readings().len(), 1);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(controller.stats().commands_published, 1);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown_while_bus_alive() {
    let (bus, _audit, controller) = setup();
    let sensors = bus.subscribe("verdant/sensors/#").unwrap();

    // The bus outlives the loop, so only the shutdown future can end it
    tokio::time::timeout(std::time::Duration::from_secs(2), controller.run(sensors, async {}))
        .await
        .unwrap();
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(controller.stats().messages_received, 0);
}

#[test]
fn test_memory_audit_evicts_oldest() {
    let (_bus, audit, controller) = setup();
    for i in 0..(AUDIT_HISTORY_SIZE + 10) {
        controller.handle(&message(
            &format!("verdant/sensors/node{}/humidity", i),
            r#"{"value":50,"unit":"%","timestamp":"2025-10-03T15:00:00Z"}"#,
        ));
    }
    let readings = audit.readings();
    assert_eq!(readings.len(), AUDIT_HISTORY_SIZE);
    assert_eq!(readings[0].address.node_id, "node10");
}

#[test]
fn test_json_lines_audit_format() {
    let sink = JsonLinesAuditSink::new(Vec::new());
    let now = Utc.with_ymd_and_hms(2025, 10, 3, 15, 0, 0).unwrap();
    let outcome = greenhouse_pipeline()
        .process(
            "verdant/sensors/node01/temperature",
            br#"{"value":90.0,"unit":"F","timestamp":"2025-10-03T15:00:00Z"}"#,
            now,
        )
        .unwrap();

    sink.record(AuditRecord::SensorReading(outcome.reading));
    sink.record(AuditRecord::ActuatorCommand(outcome.command.unwrap()));

    let written = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "sensor_reading");
    assert_eq!(lines[0]["unit"], "C");
    assert_eq!(lines[0]["value"], 32.22);
    assert_eq!(lines[1]["kind"], "actuator_command");
    assert_eq!(lines[1]["action"], "decrease");
    assert_eq!(lines[1]["address"]["actuator_category"], "temperature");
}

#[test]
fn test_json_lines_audit_file_appends() {
    let root = std::env::temp_dir().join(format!("verdant-audit-{}", std::process::id()));
    let path = root.join("nested").join("audit.jsonl");
    let _ = std::fs::remove_dir_all(&root);

    let outcome = greenhouse_pipeline()
        .process(
            "verdant/sensors/node01/humidity",
            br#"{"value":25,"unit":"%","timestamp":"2025-10-03T15:00:00Z"}"#,
            Utc.with_ymd_and_hms(2025, 10, 3, 15, 0, 0).unwrap(),
        )
        .unwrap();

    // Missing parent directories are created
    let sink = JsonLinesAuditSink::open(&path).unwrap();
    sink.record(AuditRecord::SensorReading(outcome.reading.clone()));
    drop(sink);

    // Reopening appends instead of truncating
    let sink = JsonLinesAuditSink::open(&path).unwrap();
    sink.record(AuditRecord::ActuatorCommand(outcome.command.unwrap()));
    drop(sink);

    let written = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "sensor_reading");
    assert_eq!(lines[1]["kind"], "actuator_command");
    assert_eq!(lines[1]["action"], "increase");

    std::fs::remove_dir_all(&root).unwrap();
}
