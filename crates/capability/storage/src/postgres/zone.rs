//! Postgres 区域存储实现。

use crate::error::StorageError;
use crate::traits::ZoneStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::Zone;
use sqlx::{PgPool, Row};

const ZONE_COLUMNS: &str = "id, site_id, name, description, kind, geojson::text as geojson, \
     tags, metadata::text as metadata, created_at_ms, updated_at_ms";

pub struct PgZoneStore {
    pool: PgPool,
}

impl PgZoneStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_zone(row: &sqlx::postgres::PgRow) -> Result<Zone, StorageError> {
    Ok(Zone {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        kind: row.try_get("kind")?,
        geojson: json_value(row.try_get("geojson")?),
        tags: row.try_get("tags")?,
        metadata: json_value(row.try_get("metadata")?),
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl ZoneStore for PgZoneStore {
    async fn find_all(&self) -> Result<Vec<Zone>, StorageError> {
        let sql = format!("select {ZONE_COLUMNS} from iot.zones order by id asc");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_zone).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Zone>, StorageError> {
        let sql = format!("select {ZONE_COLUMNS} from iot.zones where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_zone).transpose()
    }

    async fn insert(&self, zone: Zone) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.zones (id, site_id, name, description, kind, geojson, tags, \
             metadata, created_at_ms, updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6::jsonb, $7, $8::jsonb, $9, $10) returning id",
        )
        .bind(&zone.id)
        .bind(&zone.site_id)
        .bind(&zone.name)
        .bind(&zone.description)
        .bind(&zone.kind)
        .bind(json_text(&zone.geojson))
        .bind(&zone.tags)
        .bind(json_text(&zone.metadata))
        .bind(zone.created_at_ms)
        .bind(zone.updated_at_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, zone: &Zone) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.zones set site_id = $2, name = $3, description = $4, kind = $5, \
             geojson = $6::jsonb, tags = $7, metadata = $8::jsonb, updated_at_ms = $9 \
             where id = $1",
        )
        .bind(&zone.id)
        .bind(&zone.site_id)
        .bind(&zone.name)
        .bind(&zone.description)
        .bind(&zone.kind)
        .bind(json_text(&zone.geojson))
        .bind(&zone.tags)
        .bind(json_text(&zone.metadata))
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from iot.zones where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
