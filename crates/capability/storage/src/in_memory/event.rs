//! 事件存储内存实现。

use crate::error::StorageError;
use crate::traits::EventStore;
use domain::Event;
use std::sync::RwLock;

pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: Event) -> Result<String, StorageError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let id = event.id.clone();
        events.push(event);
        Ok(id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Event>, StorageError> {
        let events = self
            .events
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = events.clone();
        items.sort_by(|a, b| b.ts_ms.cmp(&a.ts_ms));
        let limit = limit.max(0) as usize;
        if limit > 0 && items.len() > limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}
