//! Mode-specific transition table.
//!
//! One row per `(mode, event)` pair the coordinator acts on. Rows are
//! scanned in order; within one cycle the first matching row that changes
//! mode wins, and rows that stay in the current mode only log.
//!
//! | From               | Event                 | To                 | Effect            |
//! |--------------------|-----------------------|--------------------|-------------------|
//! | Connecting         | network-gained        | ConfiguringBroker  |                   |
//! | Connecting         | no-credentials        | ConfigPortal       |                   |
//! | Connecting         | network-failed        | (stay)             |                   |
//! | ConfiguringBroker  | credentials-acquired  | ConnectedNetwork   |                   |
//! | ConfiguringBroker  | network-lost          | Connecting         |                   |
//! | ConnectedNetwork   | broker-gained         | ConnectedBroker    | subscribe commands|
//! | ConnectedNetwork   | network-lost          | Connecting         |                   |
//! | ConnectedBroker    | network-lost          | Connecting         |                   |
//! | ConnectedBroker    | broker-lost           | ConfiguringBroker  |                   |
//! | ConnectedBroker    | update-requested      | FirmwareUpdating   |                   |
//! | ConfigPortal       | network-gained        | ConfiguringBroker  |                   |
//! | FirmwareUpdating   | update-not-needed     | ConnectedBroker    |                   |
//! | FirmwareUpdating   | update-failed         | FatalError         |                   |

use log::Level;

use self::Next::{Stay, To};
use super::SystemMode::{self, *};
use crate::events::{Event, EventSet};

/// Where a matched row leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    To(SystemMode),
    Stay,
}

/// Side effect performed after the mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Install the broker command handlers.
    SubscribeCommands,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub mode: SystemMode,
    pub event: Event,
    pub next: Next,
    pub effect: Effect,
    pub level: Level,
    pub note: &'static str,
}

const fn rule(mode: SystemMode, event: Event, next: Next, level: Level, note: &'static str) -> Rule {
    Rule {
        mode,
        event,
        next,
        effect: Effect::None,
        level,
        note,
    }
}

pub static TRANSITIONS: &[Rule] = &[
    rule(Connecting, Event::NetworkGained, To(ConfiguringBroker), Level::Info, "network up"),
    rule(Connecting, Event::NoCredentials, To(ConfigPortal), Level::Warn, "no stored network credentials"),
    rule(Connecting, Event::NetworkFailed, Stay, Level::Error, "network join failed, retrying"),
    rule(ConfiguringBroker, Event::CredentialsAcquired, To(ConnectedNetwork), Level::Info, "broker credentials acquired"),
    rule(ConfiguringBroker, Event::NetworkLost, To(Connecting), Level::Warn, "network lost"),
    Rule {
        effect: Effect::SubscribeCommands,
        ..rule(ConnectedNetwork, Event::BrokerGained, To(ConnectedBroker), Level::Info, "broker session up")
    },
    rule(ConnectedNetwork, Event::NetworkLost, To(Connecting), Level::Warn, "network lost"),
    rule(ConnectedBroker, Event::NetworkLost, To(Connecting), Level::Warn, "network lost"),
    rule(ConnectedBroker, Event::BrokerLost, To(ConfiguringBroker), Level::Warn, "broker session lost"),
    rule(ConnectedBroker, Event::UpdateRequested, To(FirmwareUpdating), Level::Info, "firmware update requested"),
    rule(ConfigPortal, Event::NetworkGained, To(ConfiguringBroker), Level::Info, "network up from portal"),
    rule(FirmwareUpdating, Event::UpdateNotNeeded, To(ConnectedBroker), Level::Info, "firmware already current"),
    rule(FirmwareUpdating, Event::UpdateFailed, To(FatalError), Level::Error, "firmware update failed"),
];

/// Rows for `mode` whose event is pending, in table order.
pub fn matching(mode: SystemMode, pending: EventSet) -> impl Iterator<Item = &'static Rule> {
    TRANSITIONS
        .iter()
        .filter(move |r| r.mode == mode && pending.contains(r.event))
}

/// Events `mode` has at least one row for.
pub fn handled_in(mode: SystemMode) -> EventSet {
    TRANSITIONS
        .iter()
        .filter(|r| r.mode == mode)
        .map(|r| r.event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_unique() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(
                    !(a.mode == b.mode && a.event == b.event),
                    "duplicate row {} + {}",
                    a.mode,
                    a.event
                );
            }
        }
    }

    #[test]
    fn no_row_consumes_global_or_informational_events() {
        for r in TRANSITIONS {
            assert!(!r.event.is_informational(), "{}", r.event);
            assert!(
                !matches!(
                    r.event,
                    Event::LongPress | Event::ShortPress | Event::RelayOn | Event::RelayOff
                ),
                "{}",
                r.event
            );
        }
    }

    #[test]
    fn broker_row_order_prefers_network_loss() {
        let pending: EventSet = [Event::UpdateRequested, Event::BrokerLost, Event::NetworkLost]
            .into_iter()
            .collect();
        let first = matching(ConnectedBroker, pending).next().unwrap();
        assert_eq!(first.next, To(Connecting));
    }

    #[test]
    fn fatal_error_has_no_exit() {
        assert!(handled_in(FatalError).is_empty());
    }

    #[test]
    fn only_broker_gained_subscribes() {
        let subscribing: Vec<_> = TRANSITIONS
            .iter()
            .filter(|r| r.effect == Effect::SubscribeCommands)
            .collect();
        assert_eq!(subscribing.len(), 1);
        assert_eq!(subscribing[0].event, Event::BrokerGained);
    }
}
