//! Broker transport with its I/O thread running: queued publishes,
//! subscription replay and command dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use recirculator::adapters::mqtt::MqttTransport;
use recirculator::adapters::nvs::NvsAdapter;
use recirculator::app::commands::subscribe_commands;
use recirculator::app::ports::{
    BrokerLink, CredentialKey, NumberKey, PersistencePort, TransportPort,
};
use recirculator::app::topics::Topics;
use recirculator::config::DEVICE_CLASS;
use recirculator::error::TransportError;
use recirculator::events::Event;

use crate::mock_hw::{DEVICE, leak_channel};

const ENDPOINT: &str = "mqtts://broker.test:8883";

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn running_transport() -> MqttTransport {
    let mqtt = MqttTransport::new();
    mqtt.spawn_io().unwrap();
    mqtt
}

#[test]
fn publishes_wait_for_the_session() {
    let mqtt = running_transport();
    mqtt.publish("mica/dev/telemetry/x", b"{}", true).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    assert!(mqtt.delivered().is_empty());

    mqtt.connect(ENDPOINT, DEVICE).unwrap();
    assert!(wait_until(|| mqtt.delivered().len() == 1));
    let (topic, body, retain) = mqtt.delivered().remove(0);
    assert_eq!(topic, "mica/dev/telemetry/x");
    assert_eq!(body, b"{}");
    assert!(retain);
}

#[test]
fn full_queue_rejects_instead_of_blocking() {
    // No I/O thread: nothing drains the queue.
    let mqtt = MqttTransport::new();
    let mut last = Ok(());
    for _ in 0..64 {
        last = mqtt.publish("t", b"x", false);
        if last.is_err() {
            break;
        }
    }
    assert_eq!(last, Err(TransportError::QueueFull));
}

#[test]
fn subscriptions_are_replayed_on_reconnect() {
    let mqtt = running_transport();
    let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
    let store: Arc<dyn PersistencePort> = Arc::new(NvsAdapter::new().unwrap());
    assert_eq!(subscribe_commands(&mqtt, &topics, &store, leak_channel()), Ok(4));
    assert!(mqtt.session_subscriptions().is_empty());

    mqtt.connect(ENDPOINT, DEVICE).unwrap();
    assert_eq!(mqtt.session_subscriptions().len(), 4);

    mqtt.drop_session();
    assert!(!mqtt.is_connected());
    mqtt.connect(ENDPOINT, DEVICE).unwrap();
    assert!(
        mqtt.session_subscriptions()
            .iter()
            .any(|t| t == topics.cmd_power_state.as_str())
    );
}

#[test]
fn power_command_posts_relay_event() {
    let mqtt = running_transport();
    let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
    let store: Arc<dyn PersistencePort> = Arc::new(NvsAdapter::new().unwrap());
    let events = leak_channel();
    subscribe_commands(&mqtt, &topics, &store, events).unwrap();
    mqtt.connect(ENDPOINT, DEVICE).unwrap();

    mqtt.inject(&topics.cmd_power_state, b"ON");
    assert!(wait_until(|| events.peek().contains(Event::RelayOn)));

    mqtt.inject(&topics.cmd_power_state, b"maybe");
    std::thread::sleep(Duration::from_millis(50));
    assert!(!events.peek().contains(Event::RelayOff));
}

#[test]
fn ceiling_commands_are_persisted() {
    let mqtt = running_transport();
    let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
    let store: Arc<dyn PersistencePort> = Arc::new(NvsAdapter::new().unwrap());
    subscribe_commands(&mqtt, &topics, &store, leak_channel()).unwrap();
    mqtt.connect(ENDPOINT, DEVICE).unwrap();

    mqtt.inject(&topics.cmd_max_time, b"900");
    mqtt.inject(&topics.cmd_max_temperature, b"41.5");
    assert!(wait_until(|| store.get_number(NumberKey::MaxRunSecs) == Some(900.0)));
    assert!(wait_until(|| store.get_number(NumberKey::MaxTemperature) == Some(41.5)));

    // Out of range: keeps the previous value.
    mqtt.inject(&topics.cmd_max_time, b"0");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(store.get_number(NumberKey::MaxRunSecs), Some(900.0));
}

#[test]
fn ota_command_stores_url_and_requests_update() {
    let mqtt = running_transport();
    let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
    let store: Arc<dyn PersistencePort> = Arc::new(NvsAdapter::new().unwrap());
    let events = leak_channel();
    subscribe_commands(&mqtt, &topics, &store, events).unwrap();
    mqtt.connect(ENDPOINT, DEVICE).unwrap();

    mqtt.inject(
        &topics.cmd_ota,
        br#"{"firmwareUrl":"https://fw.test/recirculator.bin"}"#,
    );
    assert!(wait_until(|| events.peek().contains(Event::UpdateRequested)));
    assert_eq!(
        store.get_credential(CredentialKey::FirmwareUrl).as_deref(),
        Some("https://fw.test/recirculator.bin")
    );
}
