//! 设备存储内存实现。

use crate::error::StorageError;
use crate::traits::DeviceStore;
use super::now_epoch_ms;
use domain::Device;
use std::sync::RwLock;

pub struct InMemoryDeviceStore {
    devices: RwLock<Vec<Device>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn find_all(&self) -> Result<Vec<Device>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = devices.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.iter().find(|device| device.id == id).cloned())
    }

    async fn insert(&self, device: Device) -> Result<String, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if devices.iter().any(|existing| existing.id == device.id) {
            return Err(StorageError::new("duplicate device id"));
        }
        let id = device.id.clone();
        devices.push(device);
        Ok(id)
    }

    async fn update(&self, device: &Device) -> Result<(), StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in devices.iter_mut() {
            if existing.id == device.id {
                let mut updated = device.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("device not found"))
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = devices.len();
        devices.retain(|device| device.id != id);
        Ok(devices.len() < before)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in devices.iter_mut() {
            if existing.id == id {
                existing.enabled = enabled;
                existing.updated_at_ms = now_epoch_ms();
                return Ok(());
            }
        }
        Ok(())
    }
}
