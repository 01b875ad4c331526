//! Relay controller sessions: ceilings, feedback and telemetry.

use std::time::Duration;

use recirculator::app::ports::{FAULT_SENTINEL, NumberKey, PersistencePort, Tune};
use recirculator::events::Event;
use recirculator::fsm::SystemMode;
use recirculator::relay::{ReasonOff, RelayPhase};
use recirculator::workers::Task;
use recirculator::workers::supervisor::RelaySupervisor;

use crate::mock_hw::Rig;

fn rig_with(max_run_secs: f32, max_temp: f32) -> Rig {
    let rig = Rig::new(SystemMode::Connecting);
    rig.store.set_number(NumberKey::MaxRunSecs, max_run_secs).unwrap();
    rig.store.set_number(NumberKey::MaxTemperature, max_temp).unwrap();
    rig
}

#[test]
fn run_time_ceiling_stops_the_session() {
    let rig = rig_with(3.0, 60.0);
    rig.cache.store(20.0);
    rig.relay.activate().unwrap();

    rig.clock.set(2_000);
    assert_eq!(rig.relay.tick(), RelayPhase::Running);
    rig.clock.set(3_000);
    assert_eq!(rig.relay.tick(), RelayPhase::StoppedTimeout);

    assert!(!rig.relay.is_active());
    assert!(!rig.pin.is_high());
    assert_eq!(rig.buzzer.tunes(), [Tune::Timeout, Tune::Timeout]);
    assert_eq!(rig.buzzer.rests(), 1);
    assert!(rig.events.drain(Duration::ZERO).contains(Event::RelayAutoStopped));
    assert_eq!(rig.relay.phase(), RelayPhase::Idle);
}

#[test]
fn reaching_target_temperature_stops_the_session() {
    let rig = rig_with(600.0, 45.0);
    rig.relay.activate().unwrap();

    rig.cache.store(45.0);
    assert_eq!(rig.relay.tick(), RelayPhase::Running);
    rig.cache.store(45.5);
    assert_eq!(rig.relay.tick(), RelayPhase::StoppedTargetReached);
    assert_eq!(rig.buzzer.tunes(), [Tune::TargetReached, Tune::TargetReached]);
}

#[test]
fn faulty_probe_never_ends_a_session() {
    let rig = rig_with(600.0, 10.0);
    rig.cache.store(FAULT_SENTINEL);
    rig.relay.activate().unwrap();
    rig.clock.set(5_000);
    assert_eq!(rig.relay.tick(), RelayPhase::Running);
    assert!(rig.relay.is_active());
}

#[test]
fn ceilings_are_latched_on_the_first_tick() {
    let rig = rig_with(100.0, 60.0);
    rig.cache.store(20.0);
    rig.relay.activate().unwrap();
    assert!(rig.relay.session_ceilings().is_none());
    rig.relay.tick();
    assert_eq!(rig.relay.session_ceilings().unwrap().max_run_secs, 100);

    rig.store.set_number(NumberKey::MaxRunSecs, 1.0).unwrap();
    rig.clock.set(2_000);
    assert_eq!(rig.relay.tick(), RelayPhase::Running);

    // The next session picks the new value up.
    rig.relay.deactivate(ReasonOff::Manual).unwrap();
    assert_eq!(rig.relay.configured_ceilings().max_run_secs, 1);
}

#[test]
fn unusable_stored_ceilings_fall_back_to_defaults() {
    let rig = rig_with(f32::NAN, f32::NAN);
    let c = rig.relay.configured_ceilings();
    assert_eq!(c.max_run_secs, rig.config.default_max_run_secs);
    assert_eq!(c.max_temperature_c, rig.config.default_max_temperature_c);
}

#[test]
fn switching_publishes_power_state() {
    let rig = Rig::new(SystemMode::ConnectedBroker);
    rig.relay.activate().unwrap();
    rig.relay.activate().unwrap();
    assert_eq!(rig.mqtt.queued(), 1);
    rig.relay.deactivate(ReasonOff::Command).unwrap();
    rig.relay.deactivate(ReasonOff::Command).unwrap();
    assert_eq!(rig.mqtt.queued(), 2);
    assert_eq!(rig.pin.writes.load(std::sync::atomic::Ordering::Acquire), 2);
}

#[test]
fn running_session_publishes_timer_each_interval() {
    let rig = rig_with(600.0, 60.0);
    rig.cache.store(20.0);
    rig.relay.activate().unwrap();
    let after_on = rig.mqtt.queued();
    let interval_ms = u64::from(rig.config.status_interval_secs) * 1000;

    // Nothing until a full interval has elapsed.
    rig.relay.tick();
    rig.clock.set(interval_ms - 1);
    rig.relay.tick();
    assert_eq!(rig.mqtt.queued(), after_on);

    rig.clock.set(interval_ms);
    rig.relay.tick();
    assert_eq!(rig.mqtt.queued(), after_on + 1);
    rig.relay.tick();
    assert_eq!(rig.mqtt.queued(), after_on + 1);

    rig.clock.set(2 * interval_ms);
    rig.relay.tick();
    assert_eq!(rig.mqtt.queued(), after_on + 2);
}

#[test]
fn supervisor_drives_the_controller() {
    let rig = rig_with(1.0, 60.0);
    rig.cache.store(20.0);
    rig.relay.activate().unwrap();
    rig.clock.set(1_000);

    let mut supervisor = RelaySupervisor::new(rig.relay.clone(), &rig.config);
    let delay = supervisor.step();
    assert_eq!(delay, Duration::from_millis(u64::from(rig.config.relay_period_ms)));
    assert!(!rig.relay.is_active());
}
