//! Postgres 设备存储实现
//!
//! 删除设备时级联删除其主题行（事务）。

use crate::error::StorageError;
use crate::traits::DeviceStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::Device;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "id, server_id, site_id, zone_id, type_id, name, kind, protocol, \
     enabled, external_id, last_seen_at_ms, tags, metadata::text as metadata, \
     created_at_ms, updated_at_ms";

pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_device(row: &sqlx::postgres::PgRow) -> Result<Device, StorageError> {
    Ok(Device {
        id: row.try_get("id")?,
        server_id: row
            .try_get::<Option<String>, _>("server_id")?
            .unwrap_or_default(),
        site_id: row.try_get("site_id")?,
        zone_id: row.try_get("zone_id")?,
        type_id: row.try_get("type_id")?,
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        protocol: row.try_get("protocol")?,
        enabled: row.try_get("enabled")?,
        external_id: row.try_get("external_id")?,
        last_seen_at_ms: row.try_get("last_seen_at_ms")?,
        tags: row.try_get("tags")?,
        metadata: json_value(row.try_get("metadata")?),
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

fn nullable_server_id(device: &Device) -> Option<&str> {
    if device.server_id.is_empty() {
        None
    } else {
        Some(device.server_id.as_str())
    }
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn find_all(&self) -> Result<Vec<Device>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from iot.devices order by id asc");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_device).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from iot.devices where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_device).transpose()
    }

    async fn insert(&self, device: Device) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.devices (id, server_id, site_id, zone_id, type_id, name, kind, \
             protocol, enabled, external_id, last_seen_at_ms, tags, metadata, created_at_ms, \
             updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13::jsonb, $14, $15) \
             returning id",
        )
        .bind(&device.id)
        .bind(nullable_server_id(&device))
        .bind(&device.site_id)
        .bind(&device.zone_id)
        .bind(&device.type_id)
        .bind(&device.name)
        .bind(&device.kind)
        .bind(&device.protocol)
        .bind(device.enabled)
        .bind(&device.external_id)
        .bind(device.last_seen_at_ms)
        .bind(&device.tags)
        .bind(json_text(&device.metadata))
        .bind(device.created_at_ms)
        .bind(device.updated_at_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, device: &Device) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.devices set server_id = $2, site_id = $3, zone_id = $4, type_id = $5, \
             name = $6, kind = $7, protocol = $8, enabled = $9, external_id = $10, \
             last_seen_at_ms = $11, tags = $12, metadata = $13::jsonb, updated_at_ms = $14 \
             where id = $1",
        )
        .bind(&device.id)
        .bind(nullable_server_id(device))
        .bind(&device.site_id)
        .bind(&device.zone_id)
        .bind(&device.type_id)
        .bind(&device.name)
        .bind(&device.kind)
        .bind(&device.protocol)
        .bind(device.enabled)
        .bind(&device.external_id)
        .bind(device.last_seen_at_ms)
        .bind(&device.tags)
        .bind(json_text(&device.metadata))
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("delete from iot.device_topics where device_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("delete from iot.devices where id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        sqlx::query("update iot.devices set enabled = $2, updated_at_ms = $3 where id = $1")
            .bind(id)
            .bind(enabled)
            .bind(now_epoch_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
