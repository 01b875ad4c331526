//! Recirculator firmware entry point.
//!
//! Boot wires the adapters to the ports, registers every worker, and hands
//! the main thread to the coordinator.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter     MqttTransport    NvsAdapter     OtaAdapter    │
//! │  (Network)       (Transport)      (Persistence)  (Update)      │
//! │  SystemAdapter   Esp32Time        LogDisplay     BuzzerDriver  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  Workers: network · portal · broker · sensor · display ·       │
//! │           input · relay supervisor · status LED · update       │
//! │                                                                │
//! │  Coordinator (mode table + worker policy) ◀── EventChannel     │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use recirculator::adapters::device_id;
use recirculator::adapters::log_display::LogDisplay;
use recirculator::adapters::mqtt::MqttTransport;
use recirculator::adapters::nvs::NvsAdapter;
use recirculator::adapters::ota::{self, OtaAdapter};
use recirculator::adapters::provisioning::StaticProvisioner;
use recirculator::adapters::system::SystemAdapter;
use recirculator::adapters::time::Esp32TimeAdapter;
use recirculator::adapters::wifi::{SharedRadio, WifiAdapter};
use recirculator::app::ports::{BuzzerPort, ConfigPort, Tune};
use recirculator::app::topics::Topics;
use recirculator::config::{DEVICE_CLASS, SystemConfig};
use recirculator::drivers::button::ButtonDriver;
use recirculator::drivers::buzzer::BuzzerDriver;
use recirculator::drivers::hw_init;
use recirculator::drivers::relay::{GpioPin, RelayDriver};
use recirculator::drivers::status_led::StatusLed;
use recirculator::drivers::watchdog::Watchdog;
use recirculator::error::Error;
use recirculator::events::SYSTEM_EVENTS;
use recirculator::fsm::{Coordinator, CoordinatorPorts, CoordinatorTiming, SYSTEM_MODE};
use recirculator::pins;
use recirculator::relay::{RelayController, RelayPorts, RelaySettings};
use recirculator::sensors::ReadingCache;
use recirculator::sensors::temperature::TemperatureSensor;
use recirculator::workers::broker::{
    self, BrokerSessionTask, BrokerTransportDeps, BrokerTransportTask,
};
use recirculator::workers::display::{self, DisplayTask};
use recirculator::workers::input::{self, InputTask};
use recirculator::workers::network::{self, NetworkTask};
use recirculator::workers::portal::{self, PortalTask};
use recirculator::workers::sensor::{self, SensorDeps, SensorTask};
use recirculator::workers::status_led::{self, StatusLedTask};
use recirculator::workers::supervisor::{self, RelaySupervisor};
use recirculator::workers::update::UpdateWorker;
use recirculator::workers::{TaskWorker, WorkerId, WorkerTable};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Recirculator v{}", env!("CARGO_PKG_VERSION"));

    hw_init::init_peripherals().context("peripheral init")?;
    let watchdog = Watchdog::new();

    // ── 2. Storage and configuration ──────────────────────────
    let store = Arc::new(NvsAdapter::new().map_err(Error::from)?);
    let config = store.load().unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SystemConfig::default()
    });

    let id = device_id::device_id(&device_id::read_mac());
    let topics = Topics::new(DEVICE_CLASS, &id).context("topic layout")?;
    info!("Device id: {}", id);

    // ── 3. Platform adapters ──────────────────────────────────
    let clock = Arc::new(Esp32TimeAdapter::new());
    let system = Arc::new(SystemAdapter::new());
    let buzzer = Arc::new(BuzzerDriver::new());
    let cache = Arc::new(ReadingCache::new());

    let mqtt = MqttTransport::new();
    mqtt.spawn_io().context("mqtt io thread")?;
    let transport = Arc::new(mqtt.clone());

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), None)?,
        sysloop,
    )?;
    let radio: SharedRadio = Arc::new(Mutex::new(WifiAdapter::new(wifi)));

    // ── 4. Relay: forced off before anything can switch it ────
    let relay = Arc::new(RelayController::new(
        RelayPorts {
            output: Box::new(RelayDriver::new(GpioPin(pins::RELAY_GPIO))),
            transport: transport.clone(),
            store: store.clone(),
            sensor: cache.clone(),
            buzzer: buzzer.clone(),
            clock: clock.clone(),
            events: &SYSTEM_EVENTS,
        },
        RelaySettings::new(&config, &topics, id.clone()),
    ));
    if let Err(e) = relay.force_off_at_boot() {
        warn!("Relay: boot reset failed: {}", e);
    }

    buzzer.play(Tune::SelfTest);
    ota::confirm_running_image();

    // ── 5. Workers ────────────────────────────────────────────
    let mut workers = WorkerTable::new();
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Network,
        network::TASK,
        Box::new(NetworkTask::new(
            radio.clone(),
            store.clone(),
            clock.clone(),
            &SYSTEM_EVENTS,
            &SYSTEM_MODE,
            &config,
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Portal,
        portal::TASK,
        Box::new(PortalTask::new(radio, store.clone(), &SYSTEM_EVENTS, &config)),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::BrokerSession,
        broker::SESSION_TASK,
        Box::new(BrokerSessionTask::new(
            store.clone(),
            Arc::new(StaticProvisioner::from_build_env()),
            &SYSTEM_EVENTS,
            id.clone(),
            &config,
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::BrokerTransport,
        broker::TRANSPORT_TASK,
        Box::new(BrokerTransportTask::new(
            BrokerTransportDeps {
                link: transport.clone(),
                transport: transport.clone(),
                store: store.clone(),
                system: system.clone(),
                clock: clock.clone(),
                events: &SYSTEM_EVENTS,
                mode: &SYSTEM_MODE,
            },
            id.clone(),
            topics.healthcheck.clone(),
            &config,
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Sensor,
        sensor::TASK,
        Box::new(SensorTask::new(
            Box::new(TemperatureSensor::new(pins::TEMP_ADC_GPIO)),
            SensorDeps {
                cache: cache.clone(),
                transport: transport.clone(),
                buzzer: buzzer.clone(),
                clock: clock.clone(),
                mode: &SYSTEM_MODE,
            },
            id.clone(),
            topics.temperature.clone(),
            &config,
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Display,
        display::TASK,
        Box::new(DisplayTask::new(
            Box::new(LogDisplay::new()),
            cache,
            relay.clone(),
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Input,
        input::TASK,
        Box::new(InputTask::new(
            ButtonDriver::new(pins::BUTTON_GPIO, config.debounce_ms, config.long_press_ms),
            clock.clone(),
            &SYSTEM_EVENTS,
            &config,
        )),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::Relay,
        supervisor::TASK,
        Box::new(RelaySupervisor::new(relay.clone(), &config)),
    )));
    workers.register(Box::new(TaskWorker::new(
        WorkerId::StatusLed,
        status_led::TASK,
        Box::new(StatusLedTask::new(StatusLed::new(), &SYSTEM_MODE)),
    )));
    info!("{} workers registered", workers.len());

    let updater = Box::new(UpdateWorker::new(
        Arc::new(OtaAdapter::new()),
        store.clone(),
        system.clone(),
        &SYSTEM_EVENTS,
    ));

    // ── 6. Coordinator owns the main thread from here ─────────
    let mut coordinator = Coordinator::new(
        CoordinatorPorts {
            relay,
            transport,
            store,
            system,
            clock,
            events: &SYSTEM_EVENTS,
            mode: &SYSTEM_MODE,
        },
        topics,
        workers,
        updater,
        CoordinatorTiming::from_config(&config),
    );
    coordinator.start().map_err(Error::from)?;
    coordinator.run(&watchdog)
}
