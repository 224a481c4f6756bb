//! 租户存储内存实现。

use crate::error::StorageError;
use crate::traits::TenantStore;
use domain::Tenant;
use std::sync::RwLock;

pub struct InMemoryTenantStore {
    tenants: RwLock<Vec<Tenant>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTenantStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_all(&self) -> Result<Vec<Tenant>, StorageError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = tenants.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, StorageError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(tenants.iter().find(|tenant| tenant.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StorageError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(tenants.iter().find(|tenant| tenant.slug == slug).cloned())
    }

    async fn insert(&self, tenant: Tenant) -> Result<String, StorageError> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if tenants
            .iter()
            .any(|existing| existing.id == tenant.id || existing.slug == tenant.slug)
        {
            return Err(StorageError::new("duplicate tenant"));
        }
        let id = tenant.id.clone();
        tenants.push(tenant);
        Ok(id)
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = tenants.len();
        tenants.retain(|tenant| tenant.id != id);
        Ok(tenants.len() < before)
    }
}
