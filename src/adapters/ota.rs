//! Firmware update over HTTP, flashed with the `esp-ota` crate.
//!
//! Flow: GET url → 304/204 means no update → stream body into the
//! inactive partition → finalize → mark bootable. The caller restarts.
//!
//! [`FlashSession`] enforces sequential, bounded writes independently of
//! where the bytes come from, so its rules are testable on the host.

use core::fmt;

use log::{info, warn};

use crate::app::ports::{UpdateOutcome, UpdatePort};
use crate::error::UpdateError;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024;

#[cfg(target_os = "espidf")]
const CHUNK_SIZE: usize = 4096;

// ── Flash session ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    AlreadyInProgress,
    InvalidSize,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    Overflow,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "flash session already open"),
            Self::InvalidSize => write!(f, "image size out of range (max 4 MB)"),
            Self::BeginFailed => write!(f, "partition begin failed"),
            Self::WriteFailed => write!(f, "partition write failed"),
            Self::VerifyFailed => write!(f, "image verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "finalize before all bytes written"),
            Self::NotReceiving => write!(f, "no open flash session"),
            Self::Overflow => write!(f, "write exceeds declared image size"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    /// `expected` is `None` when the server sent no length.
    Receiving {
        expected: Option<u32>,
        written: u32,
    },
    ReadyToReboot,
    Failed,
}

pub struct FlashSession {
    state: FlashState,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
}

impl FlashSession {
    pub fn new() -> Self {
        Self {
            state: FlashState::Idle,
            #[cfg(target_os = "espidf")]
            update: None,
        }
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    pub fn begin(&mut self, expected: Option<u32>) -> Result<(), FlashError> {
        if matches!(self.state, FlashState::Receiving { .. }) {
            return Err(FlashError::AlreadyInProgress);
        }
        if expected.is_some_and(|size| size == 0 || size > MAX_FIRMWARE_SIZE) {
            return Err(FlashError::InvalidSize);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                FlashError::BeginFailed
            })?;
            self.update = Some(update);
        }

        self.state = FlashState::Receiving {
            expected,
            written: 0,
        };
        info!("OTA: flashing ({:?} bytes)", expected);
        Ok(())
    }

    /// Append the next chunk. Returns the total written so far.
    pub fn write(&mut self, data: &[u8]) -> Result<u32, FlashError> {
        let FlashState::Receiving { expected, written } = self.state else {
            return Err(FlashError::NotReceiving);
        };
        let total = written.saturating_add(data.len() as u32);
        if total > expected.unwrap_or(MAX_FIRMWARE_SIZE) {
            self.abort();
            return Err(FlashError::Overflow);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.update.as_mut() else {
                return Err(FlashError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(FlashError::WriteFailed);
            }
        }

        self.state = FlashState::Receiving {
            expected,
            written: total,
        };
        Ok(total)
    }

    /// Verify the image and mark it bootable.
    pub fn finalize(&mut self) -> Result<(), FlashError> {
        match self.state {
            FlashState::Receiving { written: 0, .. } => {
                self.abort();
                return Err(FlashError::IncompleteTransfer);
            }
            FlashState::Receiving {
                expected: Some(size),
                written,
            } if written != size => return Err(FlashError::IncompleteTransfer),
            FlashState::Receiving { .. } => {}
            _ => return Err(FlashError::NotReceiving),
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.update.take() else {
                self.state = FlashState::Failed;
                return Err(FlashError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = FlashState::Failed;
                FlashError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = FlashState::Failed;
                FlashError::BootSetFailed
            })?;
        }

        self.state = FlashState::ReadyToReboot;
        info!("OTA: image finalized");
        Ok(())
    }

    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // Dropping the handle aborts the partition write.
            self.update.take();
        }
        self.state = FlashState::Idle;
        warn!("OTA: aborted");
    }
}

impl Default for FlashSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Confirm the running image so the bootloader keeps it.
#[cfg(target_os = "espidf")]
pub fn confirm_running_image() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: running image marked valid"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn confirm_running_image() {
    info!("OTA(sim): running image marked valid");
}

// ── Update port ───────────────────────────────────────────────

/// Result of fetching the image.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub enum SimImage {
    /// Server reports the running image is current.
    Current,
    Image(Vec<u8>),
    Unreachable,
}

pub struct OtaAdapter {
    #[cfg(not(target_os = "espidf"))]
    image: std::sync::Mutex<SimImage>,
}

#[cfg(target_os = "espidf")]
impl OtaAdapter {
    pub fn new() -> Self {
        Self {}
    }

    fn download(&self, url: &str, session: &mut FlashSession) -> Result<bool, UpdateError> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let mut conn = EspHttpConnection::new(&Configuration {
            timeout: Some(core::time::Duration::from_secs(30)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|_| UpdateError::Download)?;
        conn.initiate_request(Method::Get, url, &[])
            .map_err(|_| UpdateError::Download)?;
        conn.initiate_response().map_err(|_| UpdateError::Download)?;

        match conn.status() {
            204 | 304 => return Ok(false),
            200..=299 => {}
            other => {
                warn!("OTA: HTTP {}", other);
                return Err(UpdateError::Download);
            }
        }
        let expected = conn
            .header("Content-Length")
            .and_then(|v| v.parse::<u32>().ok());
        session.begin(expected).map_err(|_| UpdateError::Flash)?;

        let mut chunk = [0_u8; CHUNK_SIZE];
        loop {
            let n = conn.read(&mut chunk).map_err(|_| {
                session.abort();
                UpdateError::Download
            })?;
            if n == 0 {
                break;
            }
            session.write(&chunk[..n]).map_err(|_| UpdateError::Flash)?;
        }
        session.finalize().map_err(|_| UpdateError::Flash)?;
        Ok(true)
    }
}

#[cfg(not(target_os = "espidf"))]
impl OtaAdapter {
    pub fn new() -> Self {
        Self::with_image(SimImage::Current)
    }

    pub fn with_image(image: SimImage) -> Self {
        Self {
            image: std::sync::Mutex::new(image),
        }
    }

    pub fn set_image(&self, image: SimImage) {
        *self
            .image
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = image;
    }

    fn download(&self, url: &str, session: &mut FlashSession) -> Result<bool, UpdateError> {
        let image = self
            .image
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        info!("OTA(sim): GET {}", url);
        let bytes = match image {
            SimImage::Current => return Ok(false),
            SimImage::Unreachable => return Err(UpdateError::Download),
            SimImage::Image(bytes) => bytes,
        };
        session
            .begin(Some(bytes.len() as u32))
            .map_err(|_| UpdateError::Flash)?;
        for chunk in bytes.chunks(1024) {
            session.write(chunk).map_err(|_| UpdateError::Flash)?;
        }
        session.finalize().map_err(|_| UpdateError::Flash)?;
        Ok(true)
    }
}

impl Default for OtaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatePort for OtaAdapter {
    fn perform_update(&self, url: &str) -> UpdateOutcome {
        if url.is_empty() {
            return UpdateOutcome::Failed(UpdateError::MissingUrl);
        }
        let mut session = FlashSession::new();
        match self.download(url, &mut session) {
            Ok(true) => UpdateOutcome::Success,
            Ok(false) => {
                info!("OTA: running image is current");
                UpdateOutcome::NoUpdate
            }
            Err(e) => {
                warn!("OTA: update failed: {}", e);
                if matches!(session.state(), FlashState::Receiving { .. }) {
                    session.abort();
                }
                UpdateOutcome::Failed(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_twice_rejected() {
        let mut s = FlashSession::new();
        s.begin(Some(1024)).unwrap();
        assert_eq!(s.begin(Some(1024)), Err(FlashError::AlreadyInProgress));
    }

    #[test]
    fn begin_rejects_bad_sizes() {
        let mut s = FlashSession::new();
        assert_eq!(s.begin(Some(0)), Err(FlashError::InvalidSize));
        assert_eq!(s.begin(Some(5 * 1024 * 1024)), Err(FlashError::InvalidSize));
    }

    #[test]
    fn write_requires_open_session() {
        let mut s = FlashSession::new();
        assert_eq!(s.write(b"data"), Err(FlashError::NotReceiving));
    }

    #[test]
    fn overflow_aborts() {
        let mut s = FlashSession::new();
        s.begin(Some(4)).unwrap();
        assert_eq!(s.write(b"12345"), Err(FlashError::Overflow));
        assert_eq!(s.state(), FlashState::Idle);
    }

    #[test]
    fn finalize_requires_all_bytes() {
        let mut s = FlashSession::new();
        s.begin(Some(8)).unwrap();
        s.write(b"half").unwrap();
        assert_eq!(s.finalize(), Err(FlashError::IncompleteTransfer));
    }

    #[test]
    fn unsized_image_finalizes_when_non_empty() {
        let mut s = FlashSession::new();
        s.begin(None).unwrap();
        s.write(b"abcd").unwrap();
        s.finalize().unwrap();
        assert_eq!(s.state(), FlashState::ReadyToReboot);
    }

    #[test]
    fn adapter_outcomes() {
        let ota = OtaAdapter::new();
        assert_eq!(ota.perform_update("http://fw/app.bin"), UpdateOutcome::NoUpdate);
        ota.set_image(SimImage::Image(vec![0xA5; 3000]));
        assert_eq!(ota.perform_update("http://fw/app.bin"), UpdateOutcome::Success);
        ota.set_image(SimImage::Unreachable);
        assert_eq!(
            ota.perform_update("http://fw/app.bin"),
            UpdateOutcome::Failed(UpdateError::Download)
        );
        assert_eq!(
            ota.perform_update(""),
            UpdateOutcome::Failed(UpdateError::MissingUrl)
        );
    }
}
