//! Postgres 事件存储实现。

use crate::error::StorageError;
use crate::traits::EventStore;
use super::{json_text, json_value};
use domain::{Event, EventSeverity, EventSource};
use sqlx::{PgPool, Row};

const EVENT_COLUMNS: &str = "id, ts_ms, source, type, severity, site_id, zone_id, device_id, \
     correlation_id, payload::text as payload";

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_source(raw: &str) -> Result<EventSource, StorageError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| StorageError::new(format!("unknown event source: {raw}")))
}

fn parse_severity(raw: &str) -> Result<EventSeverity, StorageError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| StorageError::new(format!("unknown event severity: {raw}")))
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<Event, StorageError> {
    let source_text: String = row.try_get("source")?;
    let severity_text: String = row.try_get("severity")?;
    Ok(Event {
        id: row.try_get("id")?,
        ts_ms: row.try_get("ts_ms")?,
        source: parse_source(&source_text)?,
        event_type: row.try_get("type")?,
        severity: parse_severity(&severity_text)?,
        site_id: row.try_get("site_id")?,
        zone_id: row.try_get("zone_id")?,
        device_id: row.try_get("device_id")?,
        correlation_id: row.try_get("correlation_id")?,
        payload: json_value(row.try_get("payload")?),
    })
}

fn enum_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: Event) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.events (id, ts_ms, source, type, severity, site_id, zone_id, \
             device_id, correlation_id, payload) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::jsonb) returning id",
        )
        .bind(&event.id)
        .bind(event.ts_ms)
        .bind(enum_text(&event.source))
        .bind(&event.event_type)
        .bind(enum_text(&event.severity))
        .bind(&event.site_id)
        .bind(&event.zone_id)
        .bind(&event.device_id)
        .bind(&event.correlation_id)
        .bind(json_text(&event.payload))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Event>, StorageError> {
        let sql = format!(
            "select {EVENT_COLUMNS} from iot.events order by ts_ms desc limit $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }
}
