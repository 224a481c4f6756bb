//! 服务器存储内存实现。

use crate::error::StorageError;
use crate::traits::ServerStore;
use super::now_epoch_ms;
use domain::Server;
use std::sync::RwLock;

pub struct InMemoryServerStore {
    servers: RwLock<Vec<Server>>,
}

impl InMemoryServerStore {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryServerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ServerStore for InMemoryServerStore {
    async fn find_all(&self) -> Result<Vec<Server>, StorageError> {
        let servers = self
            .servers
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = servers.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Server>, StorageError> {
        let servers = self
            .servers
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(servers.iter().find(|server| server.id == id).cloned())
    }

    async fn insert(&self, server: Server) -> Result<String, StorageError> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if servers.iter().any(|existing| existing.id == server.id) {
            return Err(StorageError::new("duplicate server id"));
        }
        let id = server.id.clone();
        servers.push(server);
        Ok(id)
    }

    async fn update(&self, server: &Server) -> Result<(), StorageError> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in servers.iter_mut() {
            if existing.id == server.id {
                let mut updated = server.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("server not found"))
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = servers.len();
        servers.retain(|server| server.id != id);
        Ok(servers.len() < before)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in servers.iter_mut() {
            if existing.id == id {
                existing.enabled = enabled;
                existing.updated_at_ms = now_epoch_ms();
                return Ok(());
            }
        }
        Ok(())
    }
}
