//! Postgres 租户存储实现。

use crate::error::StorageError;
use crate::traits::TenantStore;
use domain::Tenant;
use sqlx::{PgPool, Row};

pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_tenant(row: &sqlx::postgres::PgRow) -> Result<Tenant, StorageError> {
    Ok(Tenant {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
    })
}

#[async_trait::async_trait]
impl TenantStore for PgTenantStore {
    async fn find_all(&self) -> Result<Vec<Tenant>, StorageError> {
        let rows = sqlx::query("select id, slug, name from iot.tenants order by id asc")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_tenant).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, StorageError> {
        let row = sqlx::query("select id, slug, name from iot.tenants where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StorageError> {
        let row = sqlx::query("select id, slug, name from iot.tenants where slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    async fn insert(&self, tenant: Tenant) -> Result<String, StorageError> {
        let row = sqlx::query(
            "insert into iot.tenants (id, slug, name) values ($1, $2, $3) returning id",
        )
        .bind(&tenant.id)
        .bind(&tenant.slug)
        .bind(&tenant.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from iot.tenants where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
