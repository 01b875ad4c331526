//! Front-panel display worker. Redraws only when the frame changes.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::Task;
use crate::app::ports::{DisplayFrame, DisplayPort, SensorPort, is_fault};
use crate::drivers::task_pin::{Core, TaskSpec};
use crate::relay::RelayController;

pub const TASK: TaskSpec = TaskSpec::new("display\0", Core::App, 2, 4);

const REFRESH: Duration = Duration::from_millis(500);

pub struct DisplayTask {
    display: Box<dyn DisplayPort>,
    sensor: Arc<dyn SensorPort>,
    relay: Arc<RelayController>,
    shown: Option<DisplayFrame>,
}

impl DisplayTask {
    pub fn new(
        display: Box<dyn DisplayPort>,
        sensor: Arc<dyn SensorPort>,
        relay: Arc<RelayController>,
    ) -> Self {
        Self {
            display,
            sensor,
            relay,
            shown: None,
        }
    }

    fn frame(&self) -> DisplayFrame {
        let reading = self.sensor.latest_reading();
        DisplayFrame {
            temperature_c: (!is_fault(reading)).then_some(reading),
            relay_on: self.relay.is_active(),
            max_temperature_c: self.relay.configured_ceilings().max_temperature_c,
        }
    }
}

impl Task for DisplayTask {
    fn step(&mut self) -> Duration {
        let frame = self.frame();
        if self.shown.as_ref() != Some(&frame) {
            debug!("Display: redraw");
            self.display.render(&frame);
            self.shown = Some(frame);
        }
        REFRESH
    }

    fn on_resume(&mut self) {
        // Whatever was on the panel may be stale.
        self.shown = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::adapters::device_id::DeviceIdString;
    use crate::adapters::mqtt::MqttTransport;
    use crate::adapters::nvs::NvsAdapter;
    use crate::adapters::time::Esp32TimeAdapter;
    use crate::app::ports::{BuzzerPort, FAULT_SENTINEL, RelayOutput, Tune};
    use crate::app::topics::Topics;
    use crate::config::SystemConfig;
    use crate::error::RelayError;
    use crate::events::EventChannel;
    use crate::relay::{RelayPorts, RelaySettings};
    use crate::sensors::ReadingCache;

    struct Pin;

    impl RelayOutput for Pin {
        fn set(&mut self, _on: bool) -> Result<(), RelayError> {
            Ok(())
        }
    }

    struct Silent;

    impl BuzzerPort for Silent {
        fn play(&self, _tune: Tune) {}
        fn rest(&self, _ms: u32) {}
    }

    #[derive(Clone, Default)]
    struct Panel(Arc<Mutex<Vec<DisplayFrame>>>);

    impl DisplayPort for Panel {
        fn render(&mut self, frame: &DisplayFrame) {
            self.0.lock().unwrap().push(frame.clone());
        }
    }

    fn fixture() -> (DisplayTask, Panel, Arc<ReadingCache>, Arc<RelayController>) {
        let cache = Arc::new(ReadingCache::new());
        let config = SystemConfig::default();
        let topics = Topics::new("recirculator", "AB").unwrap();
        let relay = Arc::new(RelayController::new(
            RelayPorts {
                output: Box::new(Pin),
                transport: Arc::new(MqttTransport::new()),
                store: Arc::new(NvsAdapter::new().unwrap()),
                sensor: cache.clone(),
                buzzer: Arc::new(Silent),
                clock: Arc::new(Esp32TimeAdapter::new()),
                events: Box::leak(Box::new(EventChannel::new())),
            },
            RelaySettings::new(&config, &topics, DeviceIdString::try_from("AB").unwrap()),
        ));
        let panel = Panel::default();
        let task = DisplayTask::new(Box::new(panel.clone()), cache.clone(), relay.clone());
        (task, panel, cache, relay)
    }

    #[test]
    fn unchanged_frame_is_drawn_once() {
        let (mut task, panel, cache, _) = fixture();
        cache.store(30.0);
        task.step();
        task.step();
        let frames = panel.0.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].temperature_c, Some(30.0));
        assert!(!frames[0].relay_on);
    }

    #[test]
    fn fault_and_relay_changes_redraw() {
        let (mut task, panel, cache, relay) = fixture();
        cache.store(FAULT_SENTINEL);
        task.step();
        relay.activate().unwrap();
        task.step();
        let frames = panel.0.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].temperature_c, None);
        assert!(frames[1].relay_on);
    }
}
