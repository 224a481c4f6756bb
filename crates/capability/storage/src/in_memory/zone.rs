//! 区域存储内存实现。

use crate::error::StorageError;
use crate::traits::ZoneStore;
use super::now_epoch_ms;
use domain::Zone;
use std::sync::RwLock;

pub struct InMemoryZoneStore {
    zones: RwLock<Vec<Zone>>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ZoneStore for InMemoryZoneStore {
    async fn find_all(&self) -> Result<Vec<Zone>, StorageError> {
        let zones = self
            .zones
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = zones.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Zone>, StorageError> {
        let zones = self
            .zones
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(zones.iter().find(|zone| zone.id == id).cloned())
    }

    async fn insert(&self, zone: Zone) -> Result<String, StorageError> {
        let mut zones = self
            .zones
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if zones.iter().any(|existing| existing.id == zone.id) {
            return Err(StorageError::new("duplicate zone id"));
        }
        let id = zone.id.clone();
        zones.push(zone);
        Ok(id)
    }

    async fn update(&self, zone: &Zone) -> Result<(), StorageError> {
        let mut zones = self
            .zones
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in zones.iter_mut() {
            if existing.id == zone.id {
                let mut updated = zone.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("zone not found"))
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut zones = self
            .zones
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = zones.len();
        zones.retain(|zone| zone.id != id);
        Ok(zones.len() < before)
    }
}
