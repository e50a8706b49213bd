//! Shared device state store
//!
//! The store is the only state shared between device tasks and status
//! readers. Writers take the exclusive lock; readers take the shared lock and
//! receive a snapshot. A result record is published as an `Arc` and replaced
//! wholesale, never mutated, so snapshots can alias it safely.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use torqlink_core::ResultRecord;

/// Latest observed state of one device
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    /// Most recent tightening result, `None` until the first one arrives
    pub latest_result: Option<Arc<ResultRecord>>,
    pub is_connected: bool,
    /// When `latest_result` was stored
    pub last_update: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// Whether the device has produced at least one result
    pub fn has_result(&self) -> bool {
        self.latest_result.is_some()
    }
}

/// Concurrent-safe mapping from device id to [`DeviceState`]
#[derive(Debug, Default)]
pub struct DeviceStore {
    devices: RwLock<HashMap<String, DeviceState>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with an empty, disconnected state
    ///
    /// Registering an id twice leaves the existing state untouched.
    pub async fn register_device(&self, id: &str) {
        let mut devices = self.devices.write().await;
        devices.entry(id.to_string()).or_default();
    }

    /// Update the connectivity flag
    ///
    /// # Returns
    /// `false` if the device is not registered
    pub async fn set_connected(&self, id: &str, connected: bool) -> bool {
        let mut devices = self.devices.write().await;
        match devices.get_mut(id) {
            Some(state) => {
                state.is_connected = connected;
                true
            }
            None => false,
        }
    }

    /// Replace the latest result and its timestamp in one step
    ///
    /// # Returns
    /// `false` if the device is not registered
    pub async fn replace_result(
        &self,
        id: &str,
        record: Arc<ResultRecord>,
        at: DateTime<Utc>,
    ) -> bool {
        let mut devices = self.devices.write().await;
        match devices.get_mut(id) {
            Some(state) => {
                state.latest_result = Some(record);
                state.last_update = Some(at);
                true
            }
            None => false,
        }
    }

    /// Snapshot of one device, `None` if it was never registered
    pub async fn get_device(&self, id: &str) -> Option<DeviceState> {
        let devices = self.devices.read().await;
        devices.get(id).cloned()
    }

    /// Snapshot of every registered device
    pub async fn get_all_devices(&self) -> HashMap<String, DeviceState> {
        let devices = self.devices.read().await;
        devices.clone()
    }

    /// Current connectivity flag; unknown devices read as disconnected
    pub async fn is_connected(&self, id: &str) -> bool {
        let devices = self.devices.read().await;
        devices.get(id).is_some_and(|state| state.is_connected)
    }

    /// Number of registered devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}
