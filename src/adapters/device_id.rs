//! Device identity derived from the ESP32 factory MAC address.
//!
//! The device ID is all six MAC bytes as 12 uppercase hex characters
//! (`DEADBEEFCAFE`). It is deterministic across reboots and keys every
//! broker topic, telemetry payload and the broker client ID.

use core::fmt::Write;

/// Fixed-size device ID string: 12 hex chars.
pub type DeviceIdString = heapless::String<12>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    for b in mac {
        // 6 bytes * 2 chars fills the buffer exactly.
        let _ = write!(id, "{b:02X}");
    }
    id
}
