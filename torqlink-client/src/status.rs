//! Status queries over the device store
//!
//! Read-only views for an external query surface. Every response is
//! `Serialize` so a front end can return it as-is.

use crate::store::DeviceStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use torqlink_core::{DeviceConfig, ResultRecord};

/// State of one device as seen by a status reader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub tool_id: String,
    pub connected: bool,
    pub last_result: Option<Arc<ResultRecord>>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Answer to a single-device query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum DeviceStatus {
    /// The id is not a configured device
    #[serde(rename = "error")]
    NotFound { message: String },
    /// Configured, but no result has arrived yet
    #[serde(rename = "no data, waiting for first tightening result")]
    NoData(DeviceReport),
    #[serde(rename = "ok")]
    Ok(DeviceReport),
}

impl DeviceStatus {
    pub fn is_found(&self) -> bool {
        !matches!(self, DeviceStatus::NotFound { .. })
    }

    pub fn report(&self) -> Option<&DeviceReport> {
        match self {
            DeviceStatus::NotFound { .. } => None,
            DeviceStatus::NoData(report) | DeviceStatus::Ok(report) => Some(report),
        }
    }
}

/// One row of the fleet overview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub connected: bool,
    pub last_update: Option<DateTime<Utc>>,
}

/// Answer to an all-devices query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStatus {
    pub status: &'static str,
    pub tools: BTreeMap<String, DeviceSummary>,
    pub timestamp: DateTime<Utc>,
}

/// Joins device configuration with store snapshots
#[derive(Debug, Clone)]
pub struct StatusService {
    store: Arc<DeviceStore>,
    devices: Arc<[DeviceConfig]>,
}

impl StatusService {
    pub fn new(store: Arc<DeviceStore>, devices: Vec<DeviceConfig>) -> Self {
        Self {
            store,
            devices: devices.into(),
        }
    }

    /// Status of one device
    pub async fn device_status(&self, id: &str) -> DeviceStatus {
        let Some(state) = self.store.get_device(id).await else {
            return DeviceStatus::NotFound {
                message: format!("Tool with id '{}' not found or not configured.", id),
            };
        };

        let has_result = state.has_result();
        let report = DeviceReport {
            tool_id: id.to_string(),
            connected: state.is_connected,
            last_result: state.latest_result,
            last_update: state.last_update,
        };

        if has_result {
            DeviceStatus::Ok(report)
        } else {
            DeviceStatus::NoData(report)
        }
    }

    /// Overview of every configured device
    pub async fn fleet_status(&self) -> FleetStatus {
        let snapshot = self.store.get_all_devices().await;

        let tools = self
            .devices
            .iter()
            .map(|device| {
                let state = snapshot.get(&device.id);
                let summary = DeviceSummary {
                    id: device.id.clone(),
                    name: device.name.clone(),
                    address: device.address.clone(),
                    port: device.port,
                    connected: state.is_some_and(|s| s.is_connected),
                    last_update: state.and_then(|s| s.last_update),
                };
                (device.id.clone(), summary)
            })
            .collect();

        FleetStatus {
            status: "ok",
            tools,
            timestamp: Utc::now(),
        }
    }
}
