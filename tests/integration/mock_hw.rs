//! Mock collaborators for integration tests.
//!
//! Records relay pin writes, buzzer tunes and update launches, and gives
//! tests a clock they move by hand. [`Rig`] wires them to the simulated
//! adapters the same way `main` wires the device.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recirculator::adapters::device_id::DeviceIdString;
use recirculator::adapters::mqtt::MqttTransport;
use recirculator::adapters::nvs::NvsAdapter;
use recirculator::adapters::system::SystemAdapter;
use recirculator::app::ports::{BuzzerPort, Clock, RelayOutput, Tune};
use recirculator::app::topics::Topics;
use recirculator::config::{DEVICE_CLASS, SystemConfig};
use recirculator::error::{RelayError, WorkerError};
use recirculator::events::EventChannel;
use recirculator::fsm::{Coordinator, CoordinatorPorts, CoordinatorTiming, ModeCell, SystemMode};
use recirculator::relay::{RelayController, RelayPorts, RelaySettings};
use recirculator::sensors::ReadingCache;
use recirculator::workers::update::UpdateLauncher;
use recirculator::workers::{Task, WorkerTable};

pub const DEVICE: &str = "AABBCCDDEEFF";

// ── Clock ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct ManualClock(AtomicU64);

#[allow(dead_code)]
impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Release);
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

// ── Relay pin ─────────────────────────────────────────────────

/// Relay output whose level stays observable after it is handed over.
#[derive(Clone, Default)]
pub struct ProbePin {
    pub level: Arc<AtomicBool>,
    pub writes: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl ProbePin {
    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

impl RelayOutput for ProbePin {
    fn set(&mut self, on: bool) -> Result<(), RelayError> {
        self.level.store(on, Ordering::Release);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

// ── Buzzer ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingBuzzer {
    tunes: Mutex<Vec<Tune>>,
    rests: AtomicU32,
}

#[allow(dead_code)]
impl RecordingBuzzer {
    pub fn tunes(&self) -> Vec<Tune> {
        self.tunes.lock().unwrap().clone()
    }

    pub fn rests(&self) -> u32 {
        self.rests.load(Ordering::Acquire)
    }
}

impl BuzzerPort for RecordingBuzzer {
    fn play(&self, tune: Tune) {
        self.tunes.lock().unwrap().push(tune);
    }

    fn rest(&self, _ms: u32) {
        self.rests.fetch_add(1, Ordering::AcqRel);
    }
}

// ── Update launcher ───────────────────────────────────────────

pub struct ScriptedUpdater {
    pub launches: Arc<AtomicU32>,
    result: Result<(), WorkerError>,
}

#[allow(dead_code)]
impl ScriptedUpdater {
    pub fn ok() -> Self {
        Self::with_result(Ok(()))
    }

    pub fn with_result(result: Result<(), WorkerError>) -> Self {
        Self {
            launches: Arc::new(AtomicU32::new(0)),
            result,
        }
    }
}

impl UpdateLauncher for ScriptedUpdater {
    fn launch(&mut self) -> Result<(), WorkerError> {
        self.launches.fetch_add(1, Ordering::AcqRel);
        self.result
    }

    fn in_flight(&self) -> bool {
        false
    }
}

// ── Idle worker body ──────────────────────────────────────────

pub struct Idle;

impl Task for Idle {
    fn step(&mut self) -> Duration {
        Duration::from_millis(20)
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub fn leak_channel() -> &'static EventChannel {
    Box::leak(Box::new(EventChannel::new()))
}

pub fn leak_mode(mode: SystemMode) -> &'static ModeCell {
    Box::leak(Box::new(ModeCell::new(mode)))
}

/// Relay controller plus simulated adapters, all observable.
pub struct Rig {
    pub config: SystemConfig,
    pub topics: Topics,
    pub relay: Arc<RelayController>,
    pub pin: ProbePin,
    pub mqtt: MqttTransport,
    pub store: Arc<NvsAdapter>,
    pub system: Arc<SystemAdapter>,
    pub clock: Arc<ManualClock>,
    pub buzzer: Arc<RecordingBuzzer>,
    pub cache: Arc<ReadingCache>,
    pub events: &'static EventChannel,
    pub mode: &'static ModeCell,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(mode: SystemMode) -> Self {
        let config = SystemConfig {
            event_wait_ms: 10,
            ..SystemConfig::default()
        };
        let topics = Topics::new(DEVICE_CLASS, DEVICE).unwrap();
        let pin = ProbePin::default();
        let mqtt = MqttTransport::new();
        let store = Arc::new(NvsAdapter::new().unwrap());
        let clock = Arc::new(ManualClock::default());
        let buzzer = Arc::new(RecordingBuzzer::default());
        let cache = Arc::new(ReadingCache::new());
        let events = leak_channel();

        let relay = Arc::new(RelayController::new(
            RelayPorts {
                output: Box::new(pin.clone()),
                transport: Arc::new(mqtt.clone()),
                store: store.clone(),
                sensor: cache.clone(),
                buzzer: buzzer.clone(),
                clock: clock.clone(),
                events,
            },
            RelaySettings::new(&config, &topics, DeviceIdString::try_from(DEVICE).unwrap()),
        ));

        Self {
            config,
            topics,
            relay,
            pin,
            mqtt,
            store,
            system: Arc::new(SystemAdapter::new()),
            clock,
            buzzer,
            cache,
            events,
            mode: leak_mode(mode),
        }
    }

    pub fn coordinator(&self, workers: WorkerTable, updater: Box<dyn UpdateLauncher>) -> Coordinator {
        Coordinator::new(
            CoordinatorPorts {
                relay: self.relay.clone(),
                transport: Arc::new(self.mqtt.clone()),
                store: self.store.clone(),
                system: self.system.clone(),
                clock: self.clock.clone(),
                events: self.events,
                mode: self.mode,
            },
            self.topics.clone(),
            workers,
            updater,
            CoordinatorTiming::from_config(&self.config),
        )
    }

    /// Coordinator with no workers and a launcher that always succeeds.
    pub fn bare_coordinator(&self) -> (Coordinator, Arc<AtomicU32>) {
        let updater = ScriptedUpdater::ok();
        let launches = updater.launches.clone();
        (self.coordinator(WorkerTable::new(), Box::new(updater)), launches)
    }
}
