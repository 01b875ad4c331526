//! Property tests for the event mask, storage and coordinator.
//!
//! Host only; proptest does not build for the ESP32 target.

#![cfg(not(target_os = "espidf"))]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use recirculator::adapters::device_id::DeviceIdString;
use recirculator::adapters::mqtt::MqttTransport;
use recirculator::adapters::nvs::NvsAdapter;
use recirculator::adapters::system::SystemAdapter;
use recirculator::app::ports::{
    BuzzerPort, Clock, CredentialKey, FAULT_SENTINEL, NumberKey, PersistencePort, RelayOutput,
    Tune,
};
use recirculator::app::topics::Topics;
use recirculator::config::{DEVICE_CLASS, SystemConfig};
use recirculator::error::{RelayError, WorkerError};
use recirculator::events::{Event, EventChannel, EventSet};
use recirculator::fsm::{Coordinator, CoordinatorPorts, CoordinatorTiming, ModeCell, SystemMode};
use recirculator::relay::{RelayController, RelayPorts, RelaySettings};
use recirculator::sensors::ReadingCache;
use recirculator::sensors::temperature::{VALID_RANGE_C, adc_to_celsius};
use recirculator::workers::WorkerTable;
use recirculator::workers::update::UpdateLauncher;

const DEVICE: &str = "AABBCCDDEEFF";

// ── Minimal collaborators ─────────────────────────────────────

#[derive(Clone, Default)]
struct Pin(Arc<AtomicBool>);

impl RelayOutput for Pin {
    fn set(&mut self, on: bool) -> Result<(), RelayError> {
        self.0.store(on, Ordering::Release);
        Ok(())
    }
}

struct Silent;

impl BuzzerPort for Silent {
    fn play(&self, _tune: Tune) {}
    fn rest(&self, _ms: u32) {}
}

struct Frozen;

impl Clock for Frozen {
    fn now_ms(&self) -> u64 {
        0
    }
}

struct NoopUpdater;

impl UpdateLauncher for NoopUpdater {
    fn launch(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    fn in_flight(&self) -> bool {
        false
    }
}

struct Harness {
    coordinator: Coordinator,
    relay: Arc<RelayController>,
    pin: Pin,
}

fn harness(start: SystemMode) -> Harness {
    let config = SystemConfig::default();
    let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
    let events: &'static EventChannel = Box::leak(Box::new(EventChannel::new()));
    let mode: &'static ModeCell = Box::leak(Box::new(ModeCell::new(start)));
    let mqtt = MqttTransport::new();
    let store = Arc::new(NvsAdapter::new().unwrap());
    let clock = Arc::new(Frozen);
    let pin = Pin::default();

    let relay = Arc::new(RelayController::new(
        RelayPorts {
            output: Box::new(pin.clone()),
            transport: Arc::new(mqtt.clone()),
            store: store.clone(),
            sensor: Arc::new(ReadingCache::new()),
            buzzer: Arc::new(Silent),
            clock: clock.clone(),
            events,
        },
        RelaySettings::new(&config, &topics, DeviceIdString::try_from(DEVICE).unwrap()),
    ));

    let coordinator = Coordinator::new(
        CoordinatorPorts {
            relay: relay.clone(),
            transport: Arc::new(mqtt),
            store,
            system: Arc::new(SystemAdapter::new()),
            clock,
            events,
            mode,
        },
        topics,
        WorkerTable::new(),
        Box::new(NoopUpdater),
        CoordinatorTiming::from_config(&config),
    );

    Harness {
        coordinator,
        relay,
        pin,
    }
}

fn arb_event() -> impl Strategy<Value = Event> {
    (0..Event::COUNT).prop_map(|i| Event::ALL[i])
}

fn arb_set() -> impl Strategy<Value = EventSet> {
    proptest::collection::vec(arb_event(), 0..=4).prop_map(|v| v.into_iter().collect())
}

fn arb_mode() -> impl Strategy<Value = SystemMode> {
    (0..SystemMode::COUNT).prop_map(|i| SystemMode::ALL[i])
}

// ── Event mask ────────────────────────────────────────────────

proptest! {
    /// A drain hands back exactly the union of everything posted since the
    /// previous drain, and leaves nothing behind.
    #[test]
    fn drain_returns_union_of_posts(posts in proptest::collection::vec(arb_event(), 0..=32)) {
        let channel = EventChannel::new();
        for event in &posts {
            channel.post(*event);
        }
        let expected: EventSet = posts.iter().copied().collect();

        prop_assert_eq!(channel.drain(Duration::ZERO), expected);
        prop_assert!(channel.peek().is_empty());
    }

    #[test]
    fn raw_masks_never_carry_unknown_bits(bits in any::<u32>()) {
        let set = EventSet::from_bits(bits);
        let rebuilt: EventSet = set.iter().collect();
        prop_assert_eq!(rebuilt, set);
    }
}

// ── Storage ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn stored_numbers_read_back_bit_exact(value in any::<f32>()) {
        let store = NvsAdapter::new().unwrap();
        store.set_number(NumberKey::MaxTemperature, value).unwrap();
        let back = store.get_number(NumberKey::MaxTemperature).unwrap();
        prop_assert_eq!(back.to_bits(), value.to_bits());
        prop_assert_eq!(store.get_number(NumberKey::MaxRunSecs), None);
    }

    #[test]
    fn credentials_round_trip_within_limit(ssid in "[ -~]{1,64}") {
        let store = NvsAdapter::new().unwrap();
        store.set_credential(CredentialKey::WifiSsid, &ssid).unwrap();
        prop_assert_eq!(store.get_credential(CredentialKey::WifiSsid), Some(ssid));

        store.clear_credential(CredentialKey::WifiSsid).unwrap();
        prop_assert_eq!(store.get_credential(CredentialKey::WifiSsid), None);
    }

    #[test]
    fn oversized_credentials_are_rejected(ssid in "[a-z]{65,100}") {
        let store = NvsAdapter::new().unwrap();
        prop_assert!(store.set_credential(CredentialKey::WifiSsid, &ssid).is_err());
        prop_assert_eq!(store.get_credential(CredentialKey::WifiSsid), None);
    }
}

// ── Temperature conversion ────────────────────────────────────

proptest! {
    #[test]
    fn conversion_is_in_range_or_sentinel(raw in 0u16..=4095) {
        let t = adc_to_celsius(raw);
        prop_assert!(t == FAULT_SENTINEL || VALID_RANGE_C.contains(&t), "raw {} gave {}", raw, t);
    }
}

// ── Coordinator ───────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary event traffic never lets the relay switch on while the
    /// firmware is updating or after a fatal error.
    #[test]
    fn no_activation_while_updating_or_failed(
        start in arb_mode(),
        cycles in proptest::collection::vec(arb_set(), 1..=24),
    ) {
        let mut h = harness(start);
        for drained in cycles {
            let before = h.coordinator.mode();
            let was_active = h.relay.is_active();
            let after = h.coordinator.cycle(drained);

            prop_assert!(SystemMode::ALL.contains(&after));
            if matches!(before, SystemMode::FirmwareUpdating | SystemMode::FatalError) && !was_active {
                prop_assert!(!h.relay.is_active(), "{} switched on in {}", drained, before);
            }
            if after == SystemMode::FatalError {
                prop_assert!(!h.relay.is_active());
                prop_assert!(!h.pin.0.load(Ordering::Acquire));
            }
        }
    }

    #[test]
    fn long_press_always_opens_the_portal(start in arb_mode(), extra in arb_set()) {
        let mut h = harness(start);
        let next = h.coordinator.cycle(extra.with(Event::LongPress));
        prop_assert_eq!(next, SystemMode::ConfigPortal);
    }
}
