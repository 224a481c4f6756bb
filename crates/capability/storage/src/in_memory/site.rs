//! 站点存储内存实现。

use crate::error::StorageError;
use crate::traits::SiteStore;
use super::now_epoch_ms;
use domain::Site;
use std::sync::RwLock;

pub struct InMemorySiteStore {
    sites: RwLock<Vec<Site>>,
}

impl InMemorySiteStore {
    pub fn new() -> Self {
        Self {
            sites: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemorySiteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SiteStore for InMemorySiteStore {
    async fn find_all(&self) -> Result<Vec<Site>, StorageError> {
        let sites = self
            .sites
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = sites.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Site>, StorageError> {
        let sites = self
            .sites
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sites.iter().find(|site| site.id == id).cloned())
    }

    async fn insert(&self, site: Site) -> Result<String, StorageError> {
        let mut sites = self
            .sites
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if sites.iter().any(|existing| existing.id == site.id) {
            return Err(StorageError::new("duplicate site id"));
        }
        let id = site.id.clone();
        sites.push(site);
        Ok(id)
    }

    async fn update(&self, site: &Site) -> Result<(), StorageError> {
        let mut sites = self
            .sites
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in sites.iter_mut() {
            if existing.id == site.id {
                let mut updated = site.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("site not found"))
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut sites = self
            .sites
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = sites.len();
        sites.retain(|site| site.id != id);
        Ok(sites.len() < before)
    }
}
