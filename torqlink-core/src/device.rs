//! Static controller configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// One configured tightening controller
///
/// Loaded once at startup and immutable for the process lifetime. The `id`
/// is the sole key used by the state store and the status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique identifier, e.g. `"nexo-pistol"`
    pub id: String,
    /// Descriptive name, e.g. `"Nexo Pistol Grip"`
    pub name: String,
    /// Host name or IP address of the controller
    pub address: String,
    /// TCP port of the controller's open protocol listener
    pub port: u16,
}

impl DeviceConfig {
    /// Create a new device configuration
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// `host:port` string suitable for dialing
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.id, self.name, self.endpoint())
    }
}
