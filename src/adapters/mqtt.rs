//! Broker transport: queued publish, exact-match subscriptions.
//!
//! Implements [`TransportPort`] and [`BrokerLink`]. Callers never touch
//! the network: `publish` copies into a bounded queue and returns, and a
//! dedicated I/O thread drains it onto the broker session. Inbound
//! messages travel the other way through a second queue and are
//! dispatched to handlers on the I/O thread, never on the client's
//! event callback.
//!
//! ```text
//!  publish() ──▶ outbound (20) ──▶ ┌───────────────────────────────┐
//!                                  │  I/O thread (LocalExecutor)   │
//!                                  │   write_loop ──▶ session      │
//!  handler(payload) ◀── dispatch ◀─│   dispatch_loop ◀── inbound   │◀── broker
//!                                  └───────────────────────────────┘
//! ```
//!
//! While disconnected the write loop holds the head message, so the queue
//! fills and `publish` reports `QueueFull` instead of blocking.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::ports::{BrokerLink, MessageHandler, TransportPort};
use crate::app::topics::Topic;
use crate::config::{INBOUND_QUEUE_DEPTH, MAX_PAYLOAD_LEN, MAX_SUBSCRIPTIONS, PUBLISH_QUEUE_DEPTH};
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::TransportError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

/// Outbound message waiting for the I/O thread.
pub struct OutboundMsg {
    pub topic: Topic,
    pub payload: Payload,
    pub retain: bool,
}

/// Message received from the broker, waiting for dispatch.
pub struct InboundMsg {
    pub topic: Topic,
    pub payload: Payload,
}

const IO_TASK: TaskSpec = TaskSpec::new("mqtt-io\0", Core::Pro, 5, 12);

/// Poll interval while waiting for the session to come back.
const RECONNECT_POLL: Duration = Duration::from_millis(100);

#[cfg(target_os = "espidf")]
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn encode(topic: &str, payload: &[u8]) -> Result<(Topic, Payload), TransportError> {
    let topic = Topic::try_from(topic).map_err(|_| TransportError::TopicTooLong)?;
    let payload = Payload::from_slice(payload).map_err(|_| TransportError::PayloadTooLarge)?;
    Ok((topic, payload))
}

// ── Session backend ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
type Session = EspMqttClient<'static>;

/// Simulated broker session.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct Session {
    pub endpoint: String,
    pub subscribed: Vec<String>,
}

// ── Shared state ─────────────────────────────────────────────

struct Inner {
    outbound: Channel<CriticalSectionRawMutex, OutboundMsg, PUBLISH_QUEUE_DEPTH>,
    inbound: Channel<CriticalSectionRawMutex, InboundMsg, INBOUND_QUEUE_DEPTH>,
    subscriptions: Mutex<Vec<(Topic, MessageHandler)>>,
    connected: AtomicBool,
    session: Mutex<Option<Session>>,
    /// Simulation: whether the next connect succeeds.
    #[cfg(not(target_os = "espidf"))]
    reachable: AtomicBool,
    /// Simulation: every message written to the broker.
    #[cfg(not(target_os = "espidf"))]
    delivered: Mutex<Vec<(String, Vec<u8>, bool)>>,
}

impl Inner {
    fn subscriptions(&self) -> MutexGuard<'_, Vec<(Topic, MessageHandler)>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_inbound(&self, topic: &str, payload: &[u8]) {
        match encode(topic, payload) {
            Ok((owned, payload)) => {
                if self.inbound.try_send(InboundMsg { topic: owned, payload }).is_err() {
                    warn!("MQTT: inbound queue full, dropping '{}'", topic);
                }
            }
            Err(e) => warn!("MQTT: inbound '{}' dropped: {}", topic, e),
        }
    }

    /// Run the handler registered for `topic`, outside the table lock.
    fn dispatch(&self, topic: &str, payload: &[u8]) -> bool {
        let handler = self
            .subscriptions()
            .iter()
            .find(|(t, _)| t.as_str() == topic)
            .map(|(_, h)| Arc::clone(h));
        match handler {
            Some(h) => {
                h(payload);
                true
            }
            None => {
                debug!("MQTT: no handler for '{}'", topic);
                false
            }
        }
    }

    fn send(&self, msg: &OutboundMsg) -> Result<(), TransportError> {
        let mut session = self.session();
        let Some(s) = session.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        platform_publish(self, s, msg)
    }
}

#[cfg(target_os = "espidf")]
fn platform_publish(_inner: &Inner, s: &mut Session, msg: &OutboundMsg) -> Result<(), TransportError> {
    s.publish(&msg.topic, QoS::AtLeastOnce, msg.retain, &msg.payload)
        .map(|_| ())
        .map_err(|e| {
            warn!("MQTT: publish '{}' failed: {:?}", msg.topic, e);
            TransportError::Rejected
        })
}

#[cfg(not(target_os = "espidf"))]
fn platform_publish(inner: &Inner, _s: &mut Session, msg: &OutboundMsg) -> Result<(), TransportError> {
    inner
        .delivered
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((msg.topic.as_str().into(), msg.payload.to_vec(), msg.retain));
    Ok(())
}

#[cfg(target_os = "espidf")]
fn platform_subscribe(s: &mut Session, topic: &str) -> Result<(), TransportError> {
    s.subscribe(topic, QoS::AtLeastOnce).map(|_| ()).map_err(|e| {
        warn!("MQTT: subscribe '{}' failed: {:?}", topic, e);
        TransportError::Rejected
    })
}

#[cfg(not(target_os = "espidf"))]
fn platform_subscribe(s: &mut Session, topic: &str) -> Result<(), TransportError> {
    if !s.subscribed.iter().any(|t| t == topic) {
        s.subscribed.push(topic.into());
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
fn platform_connect(
    inner: &Arc<Inner>,
    endpoint: &str,
    client_id: &str,
) -> Result<Session, TransportError> {
    let conf = MqttClientConfiguration {
        client_id: Some(client_id),
        keep_alive_interval: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let cb_inner = Arc::clone(inner);
    let client = EspMqttClient::new_cb(endpoint, &conf, move |event| match event.payload() {
        EventPayload::Connected(_) => {
            cb_inner.connected.store(true, Ordering::Release);
            info!("MQTT: session up");
        }
        EventPayload::Disconnected => {
            cb_inner.connected.store(false, Ordering::Release);
            warn!("MQTT: session down");
        }
        EventPayload::Received {
            topic: Some(topic),
            data,
            ..
        } => cb_inner.push_inbound(topic, data),
        _ => {}
    })
    .map_err(|e| {
        warn!("MQTT: client create failed: {:?}", e);
        TransportError::ConnectFailed
    })?;

    let mut waited = Duration::ZERO;
    while !inner.connected.load(Ordering::Acquire) {
        if waited >= CONNECT_TIMEOUT {
            return Err(TransportError::ConnectFailed);
        }
        std::thread::sleep(RECONNECT_POLL);
        waited += RECONNECT_POLL;
    }
    Ok(client)
}

#[cfg(not(target_os = "espidf"))]
fn platform_connect(
    inner: &Arc<Inner>,
    endpoint: &str,
    client_id: &str,
) -> Result<Session, TransportError> {
    if !inner.reachable.load(Ordering::Acquire) {
        warn!("MQTT(sim): {} unreachable", endpoint);
        return Err(TransportError::ConnectFailed);
    }
    info!("MQTT(sim): {} connected as {}", endpoint, client_id);
    inner.connected.store(true, Ordering::Release);
    Ok(Session {
        endpoint: endpoint.into(),
        subscribed: Vec::new(),
    })
}

// ── Transport handle ─────────────────────────────────────────

/// Cloneable handle; all clones share one queue pair and session.
#[derive(Clone)]
pub struct MqttTransport {
    inner: Arc<Inner>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                outbound: Channel::new(),
                inbound: Channel::new(),
                subscriptions: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                session: Mutex::new(None),
                #[cfg(not(target_os = "espidf"))]
                reachable: AtomicBool::new(true),
                #[cfg(not(target_os = "espidf"))]
                delivered: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start the I/O thread.
    pub fn spawn_io(&self) -> std::io::Result<std::thread::JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        task_pin::spawn_on_core(IO_TASK, move || run_io_loop(inner))
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions().len()
    }

    /// Messages waiting for the I/O thread.
    pub fn queued(&self) -> usize {
        self.inner.outbound.len()
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttTransport {
    /// Script whether the simulated broker accepts connections.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::Release);
    }

    /// Drop the simulated session, as a broker going away would.
    pub fn drop_session(&self) {
        self.inner.connected.store(false, Ordering::Release);
        *self.inner.session() = None;
    }

    /// Inject a message as if received from the broker.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.inner.push_inbound(topic, payload);
    }

    /// Everything written to the simulated broker so far.
    pub fn delivered(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.inner
            .delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Topics subscribed on the current simulated session.
    pub fn session_subscriptions(&self) -> Vec<String> {
        self.inner
            .session()
            .as_ref()
            .map(|s| s.subscribed.clone())
            .unwrap_or_default()
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportPort for MqttTransport {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        let (topic, payload) = encode(topic, payload)?;
        self.inner
            .outbound
            .try_send(OutboundMsg {
                topic,
                payload,
                retain,
            })
            .map_err(|_| TransportError::QueueFull)
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        let topic = Topic::try_from(topic).map_err(|_| TransportError::TopicTooLong)?;
        {
            let mut subs = self.inner.subscriptions();
            if subs.iter().any(|(t, _)| *t == topic) {
                warn!("MQTT: '{}' already subscribed, keeping first handler", topic);
                return Ok(());
            }
            if subs.len() >= MAX_SUBSCRIPTIONS {
                return Err(TransportError::TooManySubscriptions);
            }
            subs.push((topic.clone(), handler));
        }
        if self.is_connected() {
            if let Some(s) = self.inner.session().as_mut() {
                platform_subscribe(s, &topic)?;
            }
        }
        debug!("MQTT: subscribed '{}'", topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }
}

impl BrokerLink for MqttTransport {
    fn connect(&self, endpoint: &str, client_id: &str) -> Result<(), TransportError> {
        // Tear the old session down first so its callback stops firing.
        *self.inner.session() = None;
        self.inner.connected.store(false, Ordering::Release);

        let mut session = platform_connect(&self.inner, endpoint, client_id)?;
        let topics: Vec<Topic> = self
            .inner
            .subscriptions()
            .iter()
            .map(|(t, _)| t.clone())
            .collect();
        for t in &topics {
            platform_subscribe(&mut session, t)?;
        }
        *self.inner.session() = Some(session);
        info!("MQTT: connected, {} subscriptions replayed", topics.len());
        Ok(())
    }
}

// ── I/O thread ───────────────────────────────────────────────

/// Wakes when a message is queued; holds it until the session is up.
async fn write_loop(inner: Arc<Inner>) {
    loop {
        let msg = inner.outbound.receive().await;
        loop {
            if inner.connected.load(Ordering::Acquire) {
                match inner.send(&msg) {
                    Ok(()) => break,
                    Err(TransportError::Rejected) => {
                        warn!("MQTT: '{}' rejected, dropped", msg.topic);
                        break;
                    }
                    Err(_) => {}
                }
            }
            async_io_mini::Timer::after(RECONNECT_POLL).await;
        }
    }
}

async fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        let msg = inner.inbound.receive().await;
        inner.dispatch(&msg.topic, &msg.payload);
    }
}

fn run_io_loop(inner: Arc<Inner>) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    executor.spawn(write_loop(Arc::clone(&inner))).detach();
    executor.spawn(dispatch_loop(inner)).detach();
    info!("MQTT I/O task started");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}
