//! One connection task per configured controller

use crate::connection::DeviceConnection;
use crate::settings::ClientSettings;
use crate::store::DeviceStore;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use torqlink_core::DeviceConfig;

/// The set of configured controllers sharing one store
pub struct Fleet {
    devices: Vec<DeviceConfig>,
    store: Arc<DeviceStore>,
    settings: ClientSettings,
}

impl Fleet {
    pub fn new(devices: Vec<DeviceConfig>, store: Arc<DeviceStore>, settings: ClientSettings) -> Self {
        Self {
            devices,
            store,
            settings,
        }
    }

    pub fn store(&self) -> Arc<DeviceStore> {
        Arc::clone(&self.store)
    }

    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    /// Register every device, then run all connections until `cancel` fires
    ///
    /// Every device is present in the store before the first connection
    /// task starts, so status queries never see a configured id as missing.
    pub async fn run(self, cancel: CancellationToken) {
        for device in &self.devices {
            self.store.register_device(&device.id).await;
        }

        let timings = self.settings.timings();
        let policy = self.settings.reconnect_policy();
        let mut tasks = JoinSet::new();

        for device in self.devices {
            log::info!("Starting connection manager for {}", device);
            let connection =
                DeviceConnection::new(device, Arc::clone(&self.store), timings, policy.clone());
            tasks.spawn(connection.run(cancel.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Connection task failed: {}", e);
            }
        }
        log::info!("All connection managers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_run_registers_all_devices_and_stops_on_cancel() {
        let devices = vec![
            DeviceConfig::new("a", "Tool A", "127.0.0.1", closed_port().await),
            DeviceConfig::new("b", "Tool B", "127.0.0.1", closed_port().await),
        ];
        let store = Arc::new(DeviceStore::new());
        let fleet = Fleet::new(devices, Arc::clone(&store), ClientSettings::default());
        assert_eq!(fleet.devices().len(), 2);

        let cancel = CancellationToken::new();
        let running = tokio::spawn(fleet.run(cancel.clone()));

        for _ in 0..100 {
            if store.len().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get_device("a").await.is_some());
        assert!(store.get_device("b").await.is_some());
        assert!(!store.is_connected("a").await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("fleet stops after cancel")
            .unwrap();
    }
}
