//! Configuration file loading
//!
//! ```toml
//! [client]
//! read_timeout_secs = 30
//! post_connect_policy = "reset"
//!
//! [[devices]]
//! id = "nexo-pistol"
//! name = "Nexo Pistol Grip"
//! address = "192.168.0.23"
//! port = 4545
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use torqlink_client::ClientSettings;
use torqlink_core::{DeviceConfig, TorqlinkError, TorqlinkResult};

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "torqlink.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> TorqlinkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| TorqlinkError::Config(format!("{}: {err}", path.display())))?;
        text.parse()
            .map_err(|err| TorqlinkError::Config(format!("{}: {err}", path.display())))
    }

    /// Check the device list and the client settings
    pub fn validate(&self) -> TorqlinkResult<()> {
        if self.devices.is_empty() {
            return Err(TorqlinkError::Config("no devices configured".to_string()));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(TorqlinkError::Config("device id must not be empty".to_string()));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(TorqlinkError::Config(format!(
                    "duplicate device id '{}'",
                    device.id
                )));
            }
            if device.address.trim().is_empty() {
                return Err(TorqlinkError::Config(format!(
                    "device '{}' has no address",
                    device.id
                )));
            }
            if device.port == 0 {
                return Err(TorqlinkError::Config(format!(
                    "device '{}' has port 0",
                    device.id
                )));
            }
        }

        self.client.validate()
    }
}

impl FromStr for Config {
    type Err = TorqlinkError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(text).map_err(|err| TorqlinkError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
