//! Real worker threads under a coordinator: the first-boot portal flow
//! and broker bring-up, end to end on the simulated radio and broker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use recirculator::adapters::provisioning::StaticProvisioner;
use recirculator::adapters::wifi::{SharedRadio, WifiAdapter};
use recirculator::app::ports::{CredentialKey, PersistencePort};
use recirculator::config::SystemConfig;
use recirculator::fsm::{Coordinator, SystemMode};
use recirculator::workers::broker::{
    self, BrokerSessionTask, BrokerTransportDeps, BrokerTransportTask,
};
use recirculator::workers::network::{self, NetworkTask};
use recirculator::workers::portal::{self, PortalTask};
use recirculator::workers::{TaskWorker, WorkerId, WorkerState, WorkerTable};

use crate::mock_hw::{Rig, ScriptedUpdater};

fn fast(config: &SystemConfig) -> SystemConfig {
    SystemConfig {
        network_retry_ms: 30,
        broker_retry_ms: 1,
        ..config.clone()
    }
}

/// Cycle until `mode` is reached or five seconds pass.
fn drive_to(c: &mut Coordinator, mode: SystemMode) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if c.run_once() == mode {
            return true;
        }
    }
    false
}

fn build(rig: &Rig, wifi: &Arc<Mutex<WifiAdapter>>) -> Coordinator {
    let config = fast(&rig.config);
    let radio: SharedRadio = wifi.clone();
    let mut table = WorkerTable::new();
    table.register(Box::new(TaskWorker::new(
        WorkerId::Network,
        network::TASK,
        Box::new(NetworkTask::new(
            radio.clone(),
            rig.store.clone(),
            rig.clock.clone(),
            rig.events,
            rig.mode,
            &config,
        )),
    )));
    table.register(Box::new(TaskWorker::new(
        WorkerId::Portal,
        portal::TASK,
        Box::new(PortalTask::new(radio, rig.store.clone(), rig.events, &config)),
    )));
    table.register(Box::new(TaskWorker::new(
        WorkerId::BrokerSession,
        broker::SESSION_TASK,
        Box::new(BrokerSessionTask::new(
            rig.store.clone(),
            Arc::new(StaticProvisioner::new("mqtts://broker.test:8883")),
            rig.events,
            "AABBCCDDEEFF".try_into().unwrap(),
            &config,
        )),
    )));
    table.register(Box::new(TaskWorker::new(
        WorkerId::BrokerTransport,
        broker::TRANSPORT_TASK,
        Box::new(BrokerTransportTask::new(
            BrokerTransportDeps {
                link: Arc::new(rig.mqtt.clone()),
                transport: Arc::new(rig.mqtt.clone()),
                store: rig.store.clone(),
                system: rig.system.clone(),
                clock: rig.clock.clone(),
                events: rig.events,
                mode: rig.mode,
            },
            "AABBCCDDEEFF".try_into().unwrap(),
            rig.topics.healthcheck.clone(),
            &config,
        )),
    )));

    let mut c = rig.coordinator(table, Box::new(ScriptedUpdater::ok()));
    c.start().unwrap();
    c
}

#[test]
fn first_boot_goes_through_the_portal_to_the_broker() {
    let rig = Rig::new(SystemMode::Connecting);
    let wifi = Arc::new(Mutex::new(WifiAdapter::new()));
    let mut c = build(&rig, &wifi);

    assert!(drive_to(&mut c, SystemMode::ConfigPortal));

    // Wait for the portal worker to open the access point, then submit.
    let deadline = Instant::now() + Duration::from_secs(5);
    let submitted = loop {
        if wifi
            .lock()
            .unwrap()
            .inject_submission(br#"{"ssid":"Home","password":"hunter22"}"#)
        {
            break true;
        }
        if Instant::now() >= deadline {
            break false;
        }
        c.run_once();
    };
    assert!(submitted);

    assert!(drive_to(&mut c, SystemMode::ConnectedBroker));
    assert_eq!(
        rig.store.get_credential(CredentialKey::WifiSsid).as_deref(),
        Some("Home")
    );
    assert!(rig.store.get_credential(CredentialKey::BrokerEndpoint).is_some());
    assert_eq!(c.workers().state(WorkerId::Portal), Some(WorkerState::Suspended));
    assert_eq!(rig.mqtt.subscription_count(), 4);
}

#[test]
fn stored_credentials_skip_the_portal() {
    let rig = Rig::new(SystemMode::Connecting);
    rig.store.set_credential(CredentialKey::WifiSsid, "Home").unwrap();
    rig.store
        .set_credential(CredentialKey::WifiPassword, "hunter22")
        .unwrap();
    let wifi = Arc::new(Mutex::new(WifiAdapter::new()));
    let mut c = build(&rig, &wifi);

    assert!(drive_to(&mut c, SystemMode::ConnectedBroker));
    assert_eq!(wifi.lock().unwrap().join_attempts(), 1);
}

#[test]
fn unreachable_broker_keeps_retrying_below_connected_broker() {
    let rig = Rig::new(SystemMode::Connecting);
    rig.store.set_credential(CredentialKey::WifiSsid, "Home").unwrap();
    rig.mqtt.set_reachable(false);
    let wifi = Arc::new(Mutex::new(WifiAdapter::new()));
    let mut c = build(&rig, &wifi);

    assert!(drive_to(&mut c, SystemMode::ConnectedNetwork));
    assert!(!drive_to_within(&mut c, SystemMode::ConnectedBroker, Duration::from_millis(300)));

    rig.mqtt.set_reachable(true);
    assert!(drive_to(&mut c, SystemMode::ConnectedBroker));
}

fn drive_to_within(c: &mut Coordinator, mode: SystemMode, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if c.run_once() == mode {
            return true;
        }
    }
    false
}
