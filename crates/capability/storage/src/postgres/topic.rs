//! Postgres 设备主题存储实现。

use crate::error::StorageError;
use crate::traits::TopicStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::MqttTopic;
use sqlx::{PgPool, Row};

const TOPIC_COLUMNS: &str = "id, device_id, role, topic, qos, retain_handling, \
     retain_as_published, auto_feedback, direction, enabled, metadata::text as metadata, \
     created_at_ms, updated_at_ms";

pub struct PgTopicStore {
    pool: PgPool,
}

impl PgTopicStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_topic(row: &sqlx::postgres::PgRow) -> Result<MqttTopic, StorageError> {
    Ok(MqttTopic {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        role: row.try_get("role")?,
        topic: row.try_get("topic")?,
        qos: row.try_get::<i16, _>("qos")? as u8,
        retain_handling: row.try_get::<i16, _>("retain_handling")? as u8,
        retain_as_published: row.try_get("retain_as_published")?,
        auto_feedback: row.try_get("auto_feedback")?,
        direction: row.try_get("direction")?,
        enabled: row.try_get("enabled")?,
        metadata: json_value(row.try_get("metadata")?),
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl TopicStore for PgTopicStore {
    async fn find_all(&self) -> Result<Vec<MqttTopic>, StorageError> {
        let sql = format!("select {TOPIC_COLUMNS} from iot.device_topics order by id asc");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_topic).collect()
    }

    async fn find_by_device(&self, device_id: &str) -> Result<Vec<MqttTopic>, StorageError> {
        let sql = format!(
            "select {TOPIC_COLUMNS} from iot.device_topics where device_id = $1 order by id asc"
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_topic).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MqttTopic>, StorageError> {
        let sql = format!("select {TOPIC_COLUMNS} from iot.device_topics where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_topic).transpose()
    }

    async fn insert(&self, topic: MqttTopic) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.device_topics (id, device_id, role, topic, qos, retain_handling, \
             retain_as_published, auto_feedback, direction, enabled, metadata, created_at_ms, \
             updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::jsonb, $12, $13) returning id",
        )
        .bind(&topic.id)
        .bind(&topic.device_id)
        .bind(&topic.role)
        .bind(&topic.topic)
        .bind(i16::from(topic.qos))
        .bind(i16::from(topic.retain_handling))
        .bind(topic.retain_as_published)
        .bind(topic.auto_feedback)
        .bind(&topic.direction)
        .bind(topic.enabled)
        .bind(json_text(&topic.metadata))
        .bind(topic.created_at_ms)
        .bind(topic.updated_at_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, topic: &MqttTopic) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.device_topics set device_id = $2, role = $3, topic = $4, qos = $5, \
             retain_handling = $6, retain_as_published = $7, auto_feedback = $8, \
             direction = $9, enabled = $10, metadata = $11::jsonb, updated_at_ms = $12 \
             where id = $1",
        )
        .bind(&topic.id)
        .bind(&topic.device_id)
        .bind(&topic.role)
        .bind(&topic.topic)
        .bind(i16::from(topic.qos))
        .bind(i16::from(topic.retain_handling))
        .bind(topic.retain_as_published)
        .bind(topic.auto_feedback)
        .bind(&topic.direction)
        .bind(topic.enabled)
        .bind(json_text(&topic.metadata))
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from iot.device_topics where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        sqlx::query("update iot.device_topics set enabled = $2, updated_at_ms = $3 where id = $1")
            .bind(id)
            .bind(enabled)
            .bind(now_epoch_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
