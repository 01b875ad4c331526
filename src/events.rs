//! Event channel: a bitmask mailbox drained by the state coordinator.
//!
//! Events are produced by:
//! - Workers (network, broker, sensor, input, update)
//! - The relay supervisor (auto-stop)
//! - Broker command handlers (relay on/off, update requested)
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Workers     │────▶│                  │     │              │
//! │ Relay       │────▶│  pending: u32    │────▶│  Coordinator │
//! │ Commands    │────▶│  (fetch_or)      │     │  drain()     │
//! └─────────────┘     └──────────────────┘     └──────────────┘
//! ```
//!
//! Posting is a single atomic OR and never blocks. Identical events
//! posted between two drains collapse into one bit.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Every notification the coordinator understands.
///
/// The discriminant is the bit index inside an [`EventSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Event {
    // ── Network association ───────────────────────────────
    NetworkGained = 0,
    NetworkLost = 1,
    NetworkFailed = 2,
    /// No station credentials are stored.
    NoCredentials = 3,

    // ── Broker session ────────────────────────────────────
    BrokerGained = 4,
    BrokerLost = 5,
    /// Broker endpoint credentials are available.
    CredentialsAcquired = 6,

    // ── Configuration portal ──────────────────────────────
    PortalStarted = 7,
    PortalSaved = 8,
    PortalFailed = 9,
    PortalStopped = 10,

    // ── User input ────────────────────────────────────────
    ShortPress = 11,
    /// Button held past the long-press threshold.
    LongPress = 12,

    // ── Firmware update ───────────────────────────────────
    UpdateRequested = 13,
    UpdateNotNeeded = 14,
    UpdateFailed = 15,

    // ── Relay ─────────────────────────────────────────────
    RelayOn = 16,
    RelayOff = 17,
    /// The supervisor stopped a session on timeout or target.
    RelayAutoStopped = 18,
}

impl Event {
    pub const COUNT: usize = 19;

    pub const ALL: [Self; Self::COUNT] = [
        Self::NetworkGained,
        Self::NetworkLost,
        Self::NetworkFailed,
        Self::NoCredentials,
        Self::BrokerGained,
        Self::BrokerLost,
        Self::CredentialsAcquired,
        Self::PortalStarted,
        Self::PortalSaved,
        Self::PortalFailed,
        Self::PortalStopped,
        Self::ShortPress,
        Self::LongPress,
        Self::UpdateRequested,
        Self::UpdateNotNeeded,
        Self::UpdateFailed,
        Self::RelayOn,
        Self::RelayOff,
        Self::RelayAutoStopped,
    ];

    pub const fn bit(self) -> u32 {
        1 << (self as u8)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NetworkGained => "network-gained",
            Self::NetworkLost => "network-lost",
            Self::NetworkFailed => "network-failed",
            Self::NoCredentials => "no-credentials",
            Self::BrokerGained => "broker-gained",
            Self::BrokerLost => "broker-lost",
            Self::CredentialsAcquired => "credentials-acquired",
            Self::PortalStarted => "portal-started",
            Self::PortalSaved => "portal-saved",
            Self::PortalFailed => "portal-failed",
            Self::PortalStopped => "portal-stopped",
            Self::ShortPress => "short-press",
            Self::LongPress => "long-press",
            Self::UpdateRequested => "update-requested",
            Self::UpdateNotNeeded => "update-not-needed",
            Self::UpdateFailed => "update-failed",
            Self::RelayOn => "relay-on",
            Self::RelayOff => "relay-off",
            Self::RelayAutoStopped => "relay-auto-stopped",
        }
    }

    /// Milestones that are logged but never drive a transition.
    pub const fn is_informational(self) -> bool {
        matches!(
            self,
            Self::PortalStarted
                | Self::PortalSaved
                | Self::PortalFailed
                | Self::PortalStopped
                | Self::RelayAutoStopped
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── EventSet ──────────────────────────────────────────────────

/// A set of pending events, one bit per [`Event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventSet(u32);

impl EventSet {
    pub const EMPTY: Self = Self(0);

    const VALID: u32 = (1 << Event::COUNT) - 1;

    /// Build a set from a raw mask; bits outside the event range are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::VALID)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn insert(&mut self, event: Event) {
        self.0 |= event.bit();
    }

    pub fn remove(&mut self, event: Event) {
        self.0 &= !event.bit();
    }

    #[must_use]
    pub const fn with(self, event: Event) -> Self {
        Self(self.0 | event.bit())
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Events in bit order.
    pub fn iter(self) -> impl Iterator<Item = Event> {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl From<Event> for EventSet {
    fn from(event: Event) -> Self {
        Self(event.bit())
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(e.name())?;
        }
        f.write_str("}")
    }
}

// ── EventChannel ──────────────────────────────────────────────

/// Many-producer, single-consumer bitmask mailbox.
///
/// `pending` is the source of truth. The mutex/condvar pair only parks
/// the consumer; producers take it with `try_lock` so a post never waits.
pub struct EventChannel {
    pending: AtomicU32,
    park: Mutex<()>,
    wake: Condvar,
}

impl EventChannel {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            park: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Merge `event` into the pending mask. Never blocks.
    pub fn post(&self, event: Event) {
        self.post_set(EventSet::from(event));
    }

    /// Merge a whole set at once.
    pub fn post_set(&self, events: EventSet) {
        if events.is_empty() {
            return;
        }
        self.pending.fetch_or(events.bits(), Ordering::AcqRel);
        // Notifying under the park lock closes the window between the
        // consumer's check and its wait. When the lock is busy a wakeup may
        // be missed; the bits stay pending and the bounded wait picks them up.
        let _guard = self.park.try_lock();
        self.wake.notify_one();
    }

    /// Wait up to `max_wait` for at least one pending bit, then take and
    /// clear the whole mask. Returns an empty set on timeout.
    pub fn drain(&self, max_wait: Duration) -> EventSet {
        let taken = self.take();
        if !taken.is_empty() || max_wait.is_zero() {
            return taken;
        }

        let deadline = Instant::now() + max_wait;
        let mut guard = self.park.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.pending.load(Ordering::Acquire) != 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(guard);
        self.take()
    }

    /// Current mask without clearing it.
    pub fn peek(&self) -> EventSet {
        EventSet::from_bits(self.pending.load(Ordering::Acquire))
    }

    fn take(&self) -> EventSet {
        EventSet::from_bits(self.pending.swap(0, Ordering::AcqRel))
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Process-wide channel ──────────────────────────────────────

/// The channel the device coordinator drains.
pub static SYSTEM_EVENTS: EventChannel = EventChannel::new();

/// Post to the process-wide channel. Callable from any thread.
pub fn post_event(event: Event) {
    SYSTEM_EVENTS.post(event);
}
