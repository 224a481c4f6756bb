//! Postgres 站点存储实现。

use crate::error::StorageError;
use crate::traits::SiteStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::Site;
use sqlx::{PgPool, Row};

const SITE_COLUMNS: &str = "id, name, kind, country, timezone, description, tags, \
     metadata::text as metadata, created_at_ms, updated_at_ms";

pub struct PgSiteStore {
    pool: PgPool,
}

impl PgSiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_site(row: &sqlx::postgres::PgRow) -> Result<Site, StorageError> {
    Ok(Site {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        country: row.try_get("country")?,
        timezone: row.try_get("timezone")?,
        description: row.try_get("description")?,
        tags: row.try_get("tags")?,
        metadata: json_value(row.try_get("metadata")?),
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl SiteStore for PgSiteStore {
    async fn find_all(&self) -> Result<Vec<Site>, StorageError> {
        let sql = format!("select {SITE_COLUMNS} from iot.sites order by id asc");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_site).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Site>, StorageError> {
        let sql = format!("select {SITE_COLUMNS} from iot.sites where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_site).transpose()
    }

    async fn insert(&self, site: Site) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.sites (id, name, kind, country, timezone, description, tags, \
             metadata, created_at_ms, updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8::jsonb, $9, $10) returning id",
        )
        .bind(&site.id)
        .bind(&site.name)
        .bind(&site.kind)
        .bind(&site.country)
        .bind(&site.timezone)
        .bind(&site.description)
        .bind(&site.tags)
        .bind(json_text(&site.metadata))
        .bind(site.created_at_ms)
        .bind(site.updated_at_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, site: &Site) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.sites set name = $2, kind = $3, country = $4, timezone = $5, \
             description = $6, tags = $7, metadata = $8::jsonb, updated_at_ms = $9 where id = $1",
        )
        .bind(&site.id)
        .bind(&site.name)
        .bind(&site.kind)
        .bind(&site.country)
        .bind(&site.timezone)
        .bind(&site.description)
        .bind(&site.tags)
        .bind(json_text(&site.metadata))
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from iot.sites where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
