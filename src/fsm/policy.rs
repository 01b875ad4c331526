//! Per-mode worker policy.
//!
//! Re-applied every coordinator cycle; applying the same policy twice is
//! a no-op. The relay supervisor, status LED and update worker are never
//! managed here.
//!
//! | Mode              | network | portal | b-session | b-transport | sensor | display | input |
//! |-------------------|---------|--------|-----------|-------------|--------|---------|-------|
//! | Connecting        | Run     | Susp   | Susp      | Susp        | Run    | Run     | Run   |
//! | ConnectedNetwork  | Run     | Susp   | Susp      | Run         | Run    | Run     | Run   |
//! | ConfiguringBroker | Run     | Susp   | Run       | Susp        | Run    | Run     | Run   |
//! | ConnectedBroker   | Run     | Susp   | Susp      | Run         | Run    | Run     | Run   |
//! | ConfigPortal      | Susp    | Run    | Susp      | Susp        | Run    | Run     | Run   |
//! | FirmwareUpdating  | Susp    | Keep   | Susp      | Susp        | Susp   | Susp    | Susp  |
//! | FatalError        | Susp    | Susp   | Susp      | Susp        | Susp   | Susp    | Susp  |

use super::SystemMode;
use crate::workers::{Directive, WorkerId};

const R: Directive = Directive::Run;
const S: Directive = Directive::Suspend;
const K: Directive = Directive::Keep;

/// Column order of [`POLICY`].
const MANAGED: [WorkerId; 7] = [
    WorkerId::Network,
    WorkerId::Portal,
    WorkerId::BrokerSession,
    WorkerId::BrokerTransport,
    WorkerId::Sensor,
    WorkerId::Display,
    WorkerId::Input,
];

/// Rows indexed by `SystemMode as usize`.
const POLICY: [[Directive; 7]; SystemMode::COUNT] = [
    [R, S, S, S, R, R, R], // Connecting
    [R, S, S, R, R, R, R], // ConnectedNetwork
    [R, S, R, S, R, R, R], // ConfiguringBroker
    [R, S, S, R, R, R, R], // ConnectedBroker
    [S, R, S, S, R, R, R], // ConfigPortal
    [S, K, S, S, S, S, S], // FirmwareUpdating
    [S, S, S, S, S, S, S], // FatalError
];

/// What `mode` wants from worker `id`.
pub fn directive(mode: SystemMode, id: WorkerId) -> Directive {
    MANAGED
        .iter()
        .position(|w| *w == id)
        .map_or(Directive::Keep, |col| POLICY[mode as usize][col])
}
