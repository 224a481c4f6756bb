//! 设备主题存储内存实现。

use crate::error::StorageError;
use crate::traits::TopicStore;
use super::now_epoch_ms;
use domain::MqttTopic;
use std::sync::RwLock;

pub struct InMemoryTopicStore {
    topics: RwLock<Vec<MqttTopic>>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTopicStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn find_all(&self) -> Result<Vec<MqttTopic>, StorageError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items = topics.clone();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_device(&self, device_id: &str) -> Result<Vec<MqttTopic>, StorageError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<MqttTopic> = topics
            .iter()
            .filter(|topic| topic.device_id == device_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MqttTopic>, StorageError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(topics.iter().find(|topic| topic.id == id).cloned())
    }

    async fn insert(&self, topic: MqttTopic) -> Result<String, StorageError> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if topics.iter().any(|existing| existing.id == topic.id) {
            return Err(StorageError::new("duplicate topic id"));
        }
        let id = topic.id.clone();
        topics.push(topic);
        Ok(id)
    }

    async fn update(&self, topic: &MqttTopic) -> Result<(), StorageError> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in topics.iter_mut() {
            if existing.id == topic.id {
                let mut updated = topic.clone();
                updated.updated_at_ms = now_epoch_ms();
                *existing = updated;
                return Ok(());
            }
        }
        Err(StorageError::new("topic not found"))
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = topics.len();
        topics.retain(|topic| topic.id != id);
        Ok(topics.len() < before)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        let mut topics = self
            .topics
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for existing in topics.iter_mut() {
            if existing.id == id {
                existing.enabled = enabled;
                existing.updated_at_ms = now_epoch_ms();
                return Ok(());
            }
        }
        Ok(())
    }
}
