//! Common types for the tracker environment abstraction.

use serde::{Deserialize, Serialize};

/// Fixed 12-digit IMEI prefix shared by every simulated unit.
pub const IMEI_PREFIX: &str = "860000000000";

/// Highest ordinal that still yields a 15-digit IMEI.
pub const MAX_DEVICE_INDEX: u32 = 999;

/// Identity of a simulated tracker unit.
///
/// Wraps the device's ordinal (1-based). The wire identity is the 15-digit
/// IMEI formed by `IMEI_PREFIX` and the zero-padded ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Creates a DeviceId from a 1-based ordinal.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the ordinal index.
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Returns the IMEI sent during the handshake.
    ///
    /// 15 digits for ordinals up to `MAX_DEVICE_INDEX`.
    pub fn imei(&self) -> String {
        format!("{IMEI_PREFIX}{:03}", self.0)
    }

    /// Encodes the handshake: u16 big-endian length followed by the IMEI.
    pub fn handshake_bytes(&self) -> Vec<u8> {
        let imei = self.imei();
        let mut out = Vec::with_capacity(2 + imei.len());
        out.extend_from_slice(&(imei.len() as u16).to_be_bytes());
        out.extend_from_slice(imei.as_bytes());
        out
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.imei())
    }
}
