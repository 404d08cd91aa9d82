use verdant::error::TopicFault;
use verdant::topic::*;

#[test]
fn test_decode_valid_sensor_topic() {
    let address = decode_sensor_topic("verdant/sensors/node01/temperature").unwrap();
    assert_eq!(address.node_id, "node01");
    assert_eq!(address.sensor_category, "temperature");
}

#[test]
fn test_decode_rejects_wrong_segment_count() {
    for topic in [
        "verdant/sensors/node01",
        "verdant/sensors/node01/temperature/extra",
        "verdant",
        "",
    ] {
        let err = decode_sensor_topic(topic).unwrap_err();
        assert!(
            matches!(err.fault(), TopicFault::SegmentCount(_)),
            "{} should fail on segment count, got {:?}",
            topic,
            err
        );
    }
}

#[test]
fn test_decode_rejects_wrong_literals() {
    let err = decode_sensor_topic("greenhouse/sensors/node01/temperature").unwrap_err();
    assert_eq!(err.fault(), TopicFault::Namespace);

    let err = decode_sensor_topic("verdant/control/node01/temperature").unwrap_err();
    assert_eq!(err.fault(), TopicFault::Domain);

    // Literals are case sensitive
    assert!(decode_sensor_topic("Verdant/sensors/node01/temperature").is_err());
}

#[test]
fn test_decode_rejects_empty_segments() {
    for topic in [
        "verdant/sensors//temperature",
        "verdant/sensors/node01/",
        "/sensors/node01/temperature",
    ] {
        assert_eq!(
            decode_sensor_topic(topic).unwrap_err().fault(),
            TopicFault::EmptySegment,
            "{}",
            topic
        );
    }
}

#[test]
fn test_malformed_topic_error_names_topic() {
    let err = decode_sensor_topic("verdant/sensors/node01").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("verdant/sensors/node01"));
    assert!(message.contains("expected 4 segments, found 3"));
}

#[test]
fn test_control_topic_round_trip() {
    for topic in [
        "verdant/control/node01/temperature",
        "verdant/control/bay-3/fan",
        "verdant/control/n/soil_moisture",
    ] {
        let address = decode_control_topic(topic).unwrap();
        assert_eq!(encode_control_topic(&address), topic);
    }

    let address = ActuatorAddress::new("node07", "vent").unwrap();
    assert_eq!(decode_control_topic(&encode_control_topic(&address)).unwrap(), address);
}

#[test]
fn test_control_decoder_rejects_sensor_topic() {
    let err = decode_control_topic("verdant/sensors/node01/temperature").unwrap_err();
    assert_eq!(err.fault(), TopicFault::Domain);
}

#[test]
fn test_sensor_topic_encoding() {
    let address = SensorAddress::new("node01", "humidity").unwrap();
    assert_eq!(encode_sensor_topic(&address), "verdant/sensors/node01/humidity");
    assert_eq!(decode_sensor_topic(&encode_sensor_topic(&address)).unwrap(), address);
}

#[test]
fn test_address_constructors_validate_segments() {
    assert_eq!(
        SensorAddress::new("", "temperature").unwrap_err().fault(),
        TopicFault::EmptySegment
    );
    assert_eq!(
        ActuatorAddress::new("node01", "fan/speed").unwrap_err().fault(),
        TopicFault::SeparatorInSegment
    );
}

#[test]
fn test_actuator_address_mirrors_sensor() {
    let sensor = SensorAddress::new("node01", "temperature").unwrap();
    let actuator = ActuatorAddress::for_sensor(&sensor);
    assert_eq!(actuator.node_id, "node01");
    assert_eq!(actuator.actuator_category, "temperature");
    assert_eq!(actuator.to_string(), "node01/temperature");
}
