//! 用户存储内存实现。

use crate::error::StorageError;
use crate::traits::UserStore;
use super::now_epoch_ms;
use domain::User;
use std::sync::RwLock;

pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn list(&self, tenant_id: &str, limit: i64) -> Result<Vec<User>, StorageError> {
        let users = self
            .users
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<User> = users
            .iter()
            .filter(|user| user.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let limit = limit.max(0) as usize;
        if limit > 0 && items.len() > limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StorageError> {
        let users = self
            .users
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_tenant_and_name(
        &self,
        tenant_id: &str,
        user_name: &str,
    ) -> Result<Option<User>, StorageError> {
        let users = self
            .users
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(users
            .iter()
            .find(|user| user.tenant_id == tenant_id && user.user_name == user_name)
            .cloned())
    }

    async fn insert(&self, user: User) -> Result<String, StorageError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if users.iter().any(|existing| existing.id == user.id) {
            return Err(StorageError::new("duplicate user id"));
        }
        if users
            .iter()
            .any(|existing| existing.tenant_id == user.tenant_id && existing.user_name == user.user_name)
        {
            return Err(StorageError::new("duplicate user_name in tenant"));
        }
        let id = user.id.clone();
        users.push(user);
        Ok(id)
    }

    async fn update(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in users.iter_mut() {
            if existing.id == user.id {
                let mut updated = user.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("user not found"))
    }

    async fn remove(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = users.len();
        users.retain(|user| !(user.tenant_id == tenant_id && user.id == id));
        Ok(users.len() < before)
    }

    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<(), StorageError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in users.iter_mut() {
            if existing.id == id {
                existing.disabled = disabled;
                existing.updated_at_ms = now_epoch_ms();
                return Ok(());
            }
        }
        Ok(())
    }
}
