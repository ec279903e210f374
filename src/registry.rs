use crate::config::Config;
use crate::device::Device;
use crate::discovery::{DiscoveredDevices, Discovery};
use crate::error::Result;
use crate::types::DeviceId;
use futures_util::future::{join_all, try_join_all};
use std::collections::HashMap;

/// Keyed collection of devices
///
/// The `DeviceRegistry` owns one [`Device`] per id. Registering a device whose
/// id is already present replaces the earlier entry.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{Config, DeviceRegistry};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut registry = DeviceRegistry::new(Config::default());
///     registry.discover_and_register().await?;
///
///     for device in registry.connect_all(true).await?.values() {
///         device.toggle().await?;
///     }
///     Ok(())
/// }
/// ```
pub struct DeviceRegistry {
    config: Config,
    devices: HashMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Create an empty registry; `config` is used for discovery
    pub fn new(config: Config) -> Self {
        Self {
            config,
            devices: HashMap::new(),
        }
    }

    /// Register one device, replacing any device with the same id
    pub fn add_device(&mut self, device: Device) -> Device {
        if self.devices.insert(device.id().to_string(), device.clone()).is_some() {
            tracing::debug!("Replaced registered device {}", device.id());
        }
        device
    }

    /// Register several devices
    pub fn add_devices(&mut self, devices: impl IntoIterator<Item = Device>) -> Vec<Device> {
        devices.into_iter().map(|device| self.add_device(device)).collect()
    }

    /// Get a device by id
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Remove a device from the registry
    pub fn remove(&mut self, id: &str) -> Option<Device> {
        self.devices.remove(id)
    }

    /// All registered devices
    pub fn devices(&self) -> &HashMap<DeviceId, Device> {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Connect every registered device concurrently
    ///
    /// Fails with the first connect error. With `exclude_unhealthy`, each
    /// device is then checked and only responsive devices are returned.
    pub async fn connect_all(&self, exclude_unhealthy: bool) -> Result<HashMap<DeviceId, Device>> {
        try_join_all(self.devices.values().map(Device::connect)).await?;
        tracing::info!("Connected {} device(s)", self.devices.len());

        if !exclude_unhealthy {
            return Ok(self.devices.clone());
        }

        let health = join_all(self.devices.values().map(|device| async move {
            (device, device.is_healthy().await)
        }))
        .await;

        Ok(health
            .into_iter()
            .filter_map(|(device, healthy)| {
                if !healthy {
                    tracing::warn!("Excluding unhealthy device {}", device.info().label());
                }
                healthy.then(|| (device.id().to_string(), device.clone()))
            })
            .collect())
    }

    /// Close every device's stream
    pub async fn disconnect_all(&self) {
        join_all(self.devices.values().map(Device::disconnect)).await;
    }

    /// Run discovery without registering the results
    pub async fn discover(&self) -> Result<DiscoveredDevices> {
        Discovery::new(self.config.clone()).run().await
    }

    /// Run discovery and register every device found
    ///
    /// Returns the number of devices discovered.
    pub async fn discover_and_register(&mut self) -> Result<usize> {
        let found = self.discover().await?;
        let count = found.len();
        self.add_devices(found.into_values());
        Ok(count)
    }
}
