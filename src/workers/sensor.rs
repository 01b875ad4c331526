//! Temperature sampling worker.
//!
//! Every period: sample the probe, store into the [`ReadingCache`], log
//! meaningful changes, sound the rate-limited fault alarm, and publish
//! every reading while the broker session is up. A faulty probe publishes
//! the sentinel so the retained value does not go stale.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use super::Task;
use crate::adapters::device_id::DeviceIdString;
use crate::app::ports::{BuzzerPort, Clock, TransportPort, Tune, is_fault};
use crate::app::telemetry::{self, Temperature};
use crate::app::topics::Topic;
use crate::config::SystemConfig;
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::fsm::{ModeCell, SystemMode};
use crate::sensors::{FaultAlarm, Probe, ReadingCache};

pub const TASK: TaskSpec = TaskSpec::new("sensor\0", Core::App, 3, 6);

/// Smallest change worth a log line (°C).
const LOG_DELTA_C: f32 = 0.5;

pub struct SensorDeps {
    pub cache: Arc<ReadingCache>,
    pub transport: Arc<dyn TransportPort>,
    pub buzzer: Arc<dyn BuzzerPort>,
    pub clock: Arc<dyn Clock>,
    pub mode: &'static ModeCell,
}

pub struct SensorTask {
    probe: Box<dyn Probe>,
    deps: SensorDeps,
    alarm: FaultAlarm,
    device_id: DeviceIdString,
    topic: Topic,
    period: Duration,
    /// Last value logged; the sentinel counts as a value.
    last_logged: Option<f32>,
}

impl SensorTask {
    pub fn new(
        probe: Box<dyn Probe>,
        deps: SensorDeps,
        device_id: DeviceIdString,
        topic: Topic,
        config: &SystemConfig,
    ) -> Self {
        Self {
            probe,
            deps,
            alarm: FaultAlarm::from_config(config),
            device_id,
            topic,
            period: Duration::from_millis(u64::from(config.sensor_period_ms)),
            last_logged: None,
        }
    }

    fn log_reading(&mut self, reading: f32) {
        let fault = is_fault(reading);
        let changed = match self.last_logged {
            None => true,
            Some(last) if is_fault(last) => !fault,
            Some(last) => fault || (reading - last).abs() >= LOG_DELTA_C,
        };
        if !changed {
            return;
        }
        if fault {
            error!("Sensor: probe fault (disconnected or failed)");
        } else {
            info!("Sensor: {:.2} C", reading);
        }
        self.last_logged = Some(reading);
    }

    fn publish(&self, reading: f32, now: u64) {
        let body = telemetry::encode(&Temperature {
            device_id: &self.device_id,
            temperature: reading,
            uptime: now,
        });
        if let Err(e) = self.deps.transport.publish(&self.topic, &body, true) {
            warn!("Sensor: temperature publish dropped: {}", e);
        }
    }
}

impl Task for SensorTask {
    fn step(&mut self) -> Duration {
        let reading = self.probe.sample();
        self.deps.cache.store(reading);
        self.log_reading(reading);

        let now = self.deps.clock.now_ms();
        if self.alarm.observe(now, reading) {
            warn!("Sensor: fault alarm {}", self.alarm.count());
            self.deps.buzzer.play(Tune::FaultAlarm);
        }

        if self.deps.mode.get() == SystemMode::ConnectedBroker {
            self.publish(reading, now);
        }
        self.period
    }
}
