//! Broker endpoint provisioning.
//!
//! Devices ship without a broker endpoint; the first time one is needed
//! it is derived from a fleet endpoint baked in at build time. The result
//! is persisted by the broker-session worker, so this runs once per
//! device unless the credential is cleared.

use log::info;

use crate::app::ports::ProvisioningPort;
use crate::error::NetworkError;

/// Fleet broker used when no build-time override is present.
pub const DEFAULT_BROKER_URL: &str = "mqtts://broker.mica.eco:8883";

pub struct StaticProvisioner {
    base_url: String,
}

impl StaticProvisioner {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').into(),
        }
    }

    /// Uses `RECIRCULATOR_BROKER_URL` from the build environment if set.
    pub fn from_build_env() -> Self {
        Self::new(option_env!("RECIRCULATOR_BROKER_URL").unwrap_or(DEFAULT_BROKER_URL))
    }
}

impl ProvisioningPort for StaticProvisioner {
    fn fetch_broker_endpoint(&self, device_id: &str) -> Result<String, NetworkError> {
        if self.base_url.is_empty() || device_id.is_empty() {
            return Err(NetworkError::InvalidCredentials);
        }
        info!("Provisioning: endpoint {} for {}", self.base_url, device_id);
        Ok(self.base_url.clone())
    }
}
