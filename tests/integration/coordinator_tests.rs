//! Coordinator cycles against the simulated adapters.

use std::sync::atomic::Ordering;

use recirculator::adapters::mqtt::MqttTransport;
use recirculator::app::ports::{BrokerLink, SystemPort};
use recirculator::error::WorkerError;
use recirculator::events::{Event, EventSet};
use recirculator::fsm::SystemMode;
use recirculator::workers::{TaskWorker, WorkerId, WorkerState, WorkerTable, network, portal};

use crate::mock_hw::{Idle, Rig, ScriptedUpdater};

fn set(events: &[Event]) -> EventSet {
    events.iter().copied().fold(EventSet::EMPTY, EventSet::with)
}

fn connect(mqtt: &MqttTransport) {
    mqtt.connect("mqtts://broker.test:8883", "AABBCCDDEEFF").unwrap();
}

// ── Connectivity ladder ───────────────────────────────────────

#[test]
fn boot_climbs_to_connected_broker() {
    let rig = Rig::new(SystemMode::Connecting);
    let (mut c, _) = rig.bare_coordinator();
    c.start().unwrap();

    assert_eq!(c.cycle(set(&[Event::NetworkGained])), SystemMode::ConfiguringBroker);
    assert_eq!(c.cycle(set(&[Event::CredentialsAcquired])), SystemMode::ConnectedNetwork);

    connect(&rig.mqtt);
    assert_eq!(c.cycle(set(&[Event::BrokerGained])), SystemMode::ConnectedBroker);
    assert_eq!(rig.mqtt.subscription_count(), 4);
    assert_eq!(rig.mqtt.session_subscriptions().len(), 4);
}

#[test]
fn network_loss_falls_back_to_connecting() {
    for start in [
        SystemMode::ConfiguringBroker,
        SystemMode::ConnectedNetwork,
        SystemMode::ConnectedBroker,
    ] {
        let rig = Rig::new(start);
        let (mut c, _) = rig.bare_coordinator();
        assert_eq!(c.cycle(set(&[Event::NetworkLost])), SystemMode::Connecting, "{start}");
    }
}

#[test]
fn broker_loss_reconfigures_broker() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();
    assert_eq!(c.cycle(set(&[Event::BrokerLost])), SystemMode::ConfiguringBroker);
}

#[test]
fn failed_join_stays_connecting() {
    let rig = Rig::new(SystemMode::Connecting);
    let (mut c, _) = rig.bare_coordinator();
    assert_eq!(c.cycle(set(&[Event::NetworkFailed])), SystemMode::Connecting);
}

#[test]
fn one_mode_change_per_cycle() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();
    // NetworkLost is listed first for ConnectedBroker.
    let next = c.cycle(set(&[Event::BrokerLost, Event::NetworkLost]));
    assert_eq!(next, SystemMode::Connecting);
    assert!(c.carried().is_empty());
}

#[test]
fn unexpected_and_informational_events_change_nothing() {
    let rig = Rig::new(SystemMode::Connecting);
    let (mut c, _) = rig.bare_coordinator();
    let next = c.cycle(set(&[
        Event::BrokerGained,
        Event::PortalStarted,
        Event::RelayAutoStopped,
    ]));
    assert_eq!(next, SystemMode::Connecting);
    assert!(!rig.relay.is_active());
}

// ── Portal ────────────────────────────────────────────────────

fn radio_workers() -> WorkerTable {
    let mut table = WorkerTable::new();
    table.register(Box::new(TaskWorker::new(
        WorkerId::Network,
        network::TASK,
        Box::new(Idle),
    )));
    table.register(Box::new(TaskWorker::new(
        WorkerId::Portal,
        portal::TASK,
        Box::new(Idle),
    )));
    table
}

#[test]
fn missing_credentials_hand_the_radio_to_the_portal() {
    let rig = Rig::new(SystemMode::Connecting);
    let mut c = rig.coordinator(radio_workers(), Box::new(ScriptedUpdater::ok()));
    c.start().unwrap();
    assert_eq!(c.workers().state(WorkerId::Network), Some(WorkerState::Running));
    // Started only once a mode asks for it.
    assert_eq!(c.workers().state(WorkerId::Portal), Some(WorkerState::Idle));

    assert_eq!(c.cycle(set(&[Event::NoCredentials])), SystemMode::ConfigPortal);
    assert_eq!(c.workers().state(WorkerId::Network), Some(WorkerState::Suspended));
    assert_eq!(c.workers().state(WorkerId::Portal), Some(WorkerState::Running));

    assert_eq!(c.cycle(set(&[Event::NetworkGained])), SystemMode::ConfiguringBroker);
    assert_eq!(c.workers().state(WorkerId::Network), Some(WorkerState::Running));
    assert_eq!(c.workers().state(WorkerId::Portal), Some(WorkerState::Suspended));
}

#[test]
fn long_press_forces_portal_from_any_mode() {
    for start in SystemMode::ALL {
        let rig = Rig::new(start);
        let (mut c, _) = rig.bare_coordinator();
        assert_eq!(c.cycle(set(&[Event::LongPress])), SystemMode::ConfigPortal, "{start}");
    }
}

#[test]
fn long_press_defers_relay_requests_and_drops_the_rest() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();

    let next = c.cycle(set(&[Event::LongPress, Event::ShortPress, Event::NetworkLost]));
    assert_eq!(next, SystemMode::ConfigPortal);
    assert!(!rig.relay.is_active());
    assert_eq!(c.carried(), set(&[Event::ShortPress]));

    c.cycle(EventSet::EMPTY);
    assert!(rig.relay.is_active());
    assert_eq!(c.mode(), SystemMode::ConfigPortal);
}

// ── Relay requests ────────────────────────────────────────────

#[test]
fn short_press_toggles_the_relay() {
    let rig = Rig::new(SystemMode::Connecting);
    let (mut c, _) = rig.bare_coordinator();

    c.cycle(set(&[Event::ShortPress]));
    assert!(rig.relay.is_active());
    assert!(rig.pin.is_high());

    c.cycle(set(&[Event::ShortPress]));
    assert!(!rig.relay.is_active());
    assert!(!rig.pin.is_high());
}

#[test]
fn relay_request_defers_other_events_one_cycle() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();

    let next = c.cycle(set(&[Event::RelayOn, Event::NetworkLost]));
    assert_eq!(next, SystemMode::ConnectedBroker);
    assert!(rig.relay.is_active());
    assert_eq!(c.carried(), set(&[Event::NetworkLost]));

    assert_eq!(c.cycle(EventSet::EMPTY), SystemMode::Connecting);
}

#[test]
fn run_once_skips_the_wait_when_bits_are_carried() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();

    rig.events.post(Event::RelayOff);
    rig.events.post(Event::BrokerLost);
    assert_eq!(c.run_once(), SystemMode::ConnectedBroker);
    assert_eq!(c.run_once(), SystemMode::ConfiguringBroker);
}

#[test]
fn activation_refused_while_updating_or_failed() {
    for start in [SystemMode::FirmwareUpdating, SystemMode::FatalError] {
        let rig = Rig::new(start);
        let (mut c, _) = rig.bare_coordinator();
        c.cycle(set(&[Event::RelayOn]));
        assert!(!rig.relay.is_active(), "{start}");
        c.cycle(set(&[Event::ShortPress]));
        assert!(!rig.relay.is_active(), "{start}");
    }
}

#[test]
fn deactivation_is_always_honoured() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();
    c.cycle(set(&[Event::RelayOn]));
    c.cycle(set(&[Event::UpdateRequested]));
    assert_eq!(c.mode(), SystemMode::FirmwareUpdating);

    c.cycle(set(&[Event::RelayOff]));
    assert!(!rig.relay.is_active());
}

// ── Firmware update and fatal error ───────────────────────────

#[test]
fn update_worker_launches_once_per_visit() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, launches) = rig.bare_coordinator();

    assert_eq!(c.cycle(set(&[Event::UpdateRequested])), SystemMode::FirmwareUpdating);
    c.cycle(EventSet::EMPTY);
    c.cycle(EventSet::EMPTY);
    assert_eq!(launches.load(Ordering::Acquire), 1);

    assert_eq!(c.cycle(set(&[Event::UpdateNotNeeded])), SystemMode::ConnectedBroker);
    c.cycle(set(&[Event::UpdateRequested]));
    assert_eq!(launches.load(Ordering::Acquire), 2);
}

#[test]
fn launch_failure_is_fatal() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let updater = ScriptedUpdater::with_result(Err(WorkerError::SpawnFailed));
    let mut c = rig.coordinator(WorkerTable::new(), Box::new(updater));
    assert_eq!(c.cycle(set(&[Event::UpdateRequested])), SystemMode::FatalError);
}

#[test]
fn busy_launcher_counts_as_launched() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let updater = ScriptedUpdater::with_result(Err(WorkerError::Busy));
    let mut c = rig.coordinator(WorkerTable::new(), Box::new(updater));
    assert_eq!(c.cycle(set(&[Event::UpdateRequested])), SystemMode::FirmwareUpdating);
}

#[test]
fn fatal_error_stops_relay_and_restarts_after_grace() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    let (mut c, _) = rig.bare_coordinator();
    c.cycle(set(&[Event::RelayOn]));
    c.cycle(set(&[Event::UpdateRequested]));

    assert_eq!(c.cycle(set(&[Event::UpdateFailed])), SystemMode::FatalError);
    assert!(!rig.relay.is_active());
    assert_eq!(rig.system.restart_count(), 0);

    rig.clock.advance(u64::from(rig.config.fatal_grace_ms) - 1);
    c.cycle(EventSet::EMPTY);
    assert_eq!(rig.system.restart_count(), 0);

    rig.clock.advance(1);
    c.cycle(EventSet::EMPTY);
    c.cycle(EventSet::EMPTY);
    assert_eq!(rig.system.restart_count(), 1);
    assert!(rig.system.free_heap() > 0);
}
