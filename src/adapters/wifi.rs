//! Wi-Fi radio adapter: station join plus the credential portal.
//!
//! Implements [`NetworkPort`]. The radio is owned by one adapter instance
//! and shared between the network and portal workers through
//! [`SharedRadio`]; the coordinator guarantees only one of them runs at a
//! time.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` for station and
//!   access-point modes, `EspHttpServer` accepting `POST /save` with a JSON
//!   body `{"ssid": "...", "password": "..."}`.
//! - **all other targets**: a simulation with a scripted join result and
//!   an injectable portal submission.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use super::utils::is_printable_ascii;
use crate::app::ports::{NetworkPort, PortalSubmission};
use crate::config::MAX_CREDENTIAL_LEN;
use crate::error::NetworkError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    http::{
        Method,
        server::{Configuration as HttpConfiguration, EspHttpServer},
    },
    io::{Read, Write},
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
        EspWifi,
    },
};

/// Radio handle shared by the network and portal workers.
pub type SharedRadio = Arc<Mutex<dyn NetworkPort>>;

/// Lock a shared radio, recovering from a poisoned lock.
pub fn lock_radio(radio: &SharedRadio) -> MutexGuard<'_, dyn NetworkPort + 'static> {
    radio.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Longest accepted portal request body.
const MAX_PORTAL_BODY: usize = 256;

type Inbox = Arc<Mutex<Option<PortalSubmission>>>;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), NetworkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(NetworkError::InvalidCredentials);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), NetworkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > MAX_CREDENTIAL_LEN {
        return Err(NetworkError::InvalidCredentials);
    }
    Ok(())
}

/// Station credentials acceptable to the radio: SSID of 1..=32 printable
/// ASCII bytes, password empty (open network) or 8..=64 bytes.
pub fn validate_credentials(ssid: &str, password: &str) -> Result<(), NetworkError> {
    validate_ssid(ssid)?;
    validate_password(password)
}

#[derive(Deserialize)]
struct SaveRequest {
    ssid: String,
    #[serde(default)]
    password: String,
}

/// Decode a portal form body. Returns `None` for anything malformed.
pub fn parse_submission(body: &[u8]) -> Option<PortalSubmission> {
    if body.len() > MAX_PORTAL_BODY {
        return None;
    }
    let req: SaveRequest = serde_json::from_slice(body).ok()?;
    Some(PortalSubmission {
        ssid: req.ssid.trim().into(),
        password: req.password,
    })
}

fn take_submission(inbox: &Inbox) -> Option<PortalSubmission> {
    inbox.lock().unwrap_or_else(PoisonError::into_inner).take()
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(target_os = "espidf")]
    server: Option<EspHttpServer<'static>>,
    inbox: Inbox,
    connected: bool,
    portal_open: bool,
    /// Simulation: result of the next join attempts.
    #[cfg(not(target_os = "espidf"))]
    sim_join_ok: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_joins: u32,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            wifi,
            server: None,
            inbox: Arc::new(Mutex::new(None)),
            connected: false,
            portal_open: false,
        }
    }

    fn platform_connect(
        &mut self,
        ssid: &str,
        password: &str,
        // BlockingWifi applies its own join timeout.
        _timeout: Duration,
    ) -> Result<(), NetworkError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            password: password
                .try_into()
                .map_err(|_| NetworkError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });
        let _ = self.wifi.disconnect();
        self.wifi.set_configuration(&config).map_err(|e| {
            warn!("WiFi: set_configuration failed: {:?}", e);
            NetworkError::NotInitialised
        })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .start()
                .map_err(|_| NetworkError::NotInitialised)?;
        }
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect failed: {:?}", e);
            NetworkError::ConnectFailed
        })?;
        self.wifi.wait_netif_up().map_err(|_| NetworkError::Timeout)
    }

    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn platform_start_portal(&mut self, ap_ssid: &str) -> Result<(), NetworkError> {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ap_ssid
                    .try_into()
                    .map_err(|_| NetworkError::PortalFailed)?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            }))
            .map_err(|_| NetworkError::PortalFailed)?;
        self.wifi.start().map_err(|_| NetworkError::PortalFailed)?;
        self.wifi
            .wait_netif_up()
            .map_err(|_| NetworkError::PortalFailed)?;

        let mut server = EspHttpServer::new(&HttpConfiguration {
            stack_size: 16 * 1024,
            ..Default::default()
        })
        .map_err(|_| NetworkError::PortalFailed)?;

        let inbox = Arc::clone(&self.inbox);
        server
            .fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut req| {
                let len = req.content_len().unwrap_or(0) as usize;
                let mut body = vec![0_u8; len.min(MAX_PORTAL_BODY + 1)];
                req.read_exact(&mut body)?;
                match parse_submission(&body) {
                    Some(sub) => {
                        *inbox.lock().unwrap_or_else(PoisonError::into_inner) = Some(sub);
                        req.into_response(200, Some("OK"), &[("Content-Type", "text/plain")])?
                            .write_all(b"saved")?;
                    }
                    None => {
                        req.into_response(400, None, &[("Content-Type", "text/plain")])?
                            .write_all(b"bad request")?;
                    }
                }
                Ok(())
            })
            .map_err(|_| NetworkError::PortalFailed)?;
        self.server = Some(server);
        Ok(())
    }

    fn platform_stop_portal(&mut self) {
        self.server = None;
        let _ = self.wifi.stop();
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            inbox: Arc::new(Mutex::new(None)),
            connected: false,
            portal_open: false,
            sim_join_ok: true,
            sim_joins: 0,
        }
    }

    /// Script the outcome of subsequent join attempts.
    pub fn set_join_result(&mut self, ok: bool) {
        self.sim_join_ok = ok;
    }

    /// Drop the simulated link, as an access point going away would.
    pub fn drop_link(&mut self) {
        self.connected = false;
    }

    /// Deliver a submission as if posted to the portal form.
    pub fn inject_submission(&self, body: &[u8]) -> bool {
        match parse_submission(body) {
            Some(sub) if self.portal_open => {
                *self.inbox.lock().unwrap_or_else(PoisonError::into_inner) = Some(sub);
                true
            }
            _ => false,
        }
    }

    pub fn join_attempts(&self) -> u32 {
        self.sim_joins
    }

    fn platform_connect(
        &mut self,
        ssid: &str,
        _password: &str,
        _timeout: Duration,
    ) -> Result<(), NetworkError> {
        self.sim_joins += 1;
        if self.sim_join_ok {
            info!("WiFi(sim): joined '{}'", ssid);
            Ok(())
        } else {
            warn!("WiFi(sim): join '{}' refused", ssid);
            Err(NetworkError::ConnectFailed)
        }
    }

    fn platform_is_connected(&self) -> bool {
        self.connected
    }

    fn platform_start_portal(&mut self, ap_ssid: &str) -> Result<(), NetworkError> {
        info!("WiFi(sim): access point '{}' up", ap_ssid);
        Ok(())
    }

    fn platform_stop_portal(&mut self) {
        info!("WiFi(sim): access point down");
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkPort for WifiAdapter {
    fn connect(
        &mut self,
        ssid: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        validate_credentials(ssid, password)?;
        // Station and access point share the radio.
        self.stop_portal();
        info!("WiFi: joining '{}'", ssid);
        match self.platform_connect(ssid, password, timeout) {
            Ok(()) => {
                self.connected = true;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                warn!("WiFi: join failed: {}", e);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.platform_is_connected()
    }

    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), NetworkError> {
        if self.portal_open {
            return Ok(());
        }
        self.connected = false;
        self.platform_start_portal(ap_ssid)?;
        self.portal_open = true;
        info!("Portal: open as '{}'", ap_ssid);
        Ok(())
    }

    fn poll_portal(&mut self) -> Option<PortalSubmission> {
        if !self.portal_open {
            return None;
        }
        take_submission(&self.inbox)
    }

    fn stop_portal(&mut self) {
        if !self.portal_open {
            return;
        }
        self.platform_stop_portal();
        self.portal_open = false;
        take_submission(&self.inbox);
        info!("Portal: closed");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
