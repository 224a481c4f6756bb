//! Postgres 用户存储实现
//!
//! ## 设计要点
//!
//! - **租户隔离**：登录与列表查询都以 `tenant_id` 过滤
//! - **判别列**：`role` 文本列解析为 [`domain::Role`]，未知值报错
//! - **站点角色**：`site_roles` 为 jsonb（site_id → role）

use crate::error::StorageError;
use crate::traits::UserStore;
use super::{json_text, now_epoch_ms};
use domain::{Role, User};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

const USER_COLUMNS: &str = "id, tenant_id, user_name, email, password_hash, role, disabled, \
     mfa_enabled, totp_secret_b32, totp_digits, totp_period, site_roles::text as site_roles, \
     created_at_ms, updated_at_ms";

/// PostgreSQL 用户存储实现
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, StorageError> {
    let role_text: String = row.try_get("role")?;
    let role = Role::parse(&role_text)
        .ok_or_else(|| StorageError::new(format!("unknown user role: {role_text}")))?;
    let site_roles_text: Option<String> = row.try_get("site_roles")?;
    let site_roles: BTreeMap<String, Role> = site_roles_text
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default();
    Ok(User {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_name: row.try_get("user_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        disabled: row.try_get("disabled")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        totp_secret_b32: row.try_get("totp_secret_b32")?,
        totp_digits: row.try_get::<i32, _>("totp_digits")? as u32,
        totp_period: row.try_get::<i32, _>("totp_period")? as u32,
        site_roles,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn list(&self, tenant_id: &str, limit: i64) -> Result<Vec<User>, StorageError> {
        let sql = format!(
            "select {USER_COLUMNS} from iot.users where tenant_id = $1 order by id asc limit $2"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StorageError> {
        let sql = format!("select {USER_COLUMNS} from iot.users where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_tenant_and_name(
        &self,
        tenant_id: &str,
        user_name: &str,
    ) -> Result<Option<User>, StorageError> {
        let sql =
            format!("select {USER_COLUMNS} from iot.users where tenant_id = $1 and user_name = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert(&self, user: User) -> Result<String, StorageError> {
        let site_roles =
            json_text(&serde_json::to_value(&user.site_roles).unwrap_or(Value::Null));
        let row = sqlx::query(
            "insert into iot.users (id, tenant_id, user_name, email, password_hash, role, \
             disabled, mfa_enabled, totp_secret_b32, totp_digits, totp_period, site_roles, \
             created_at_ms, updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::jsonb, $13, $14) \
             returning id",
        )
        .bind(&user.id)
        .bind(&user.tenant_id)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.disabled)
        .bind(user.mfa_enabled)
        .bind(&user.totp_secret_b32)
        .bind(user.totp_digits as i32)
        .bind(user.totp_period as i32)
        .bind(site_roles)
        .bind(user.created_at_ms)
        .bind(user.updated_at_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, user: &User) -> Result<(), StorageError> {
        let site_roles =
            json_text(&serde_json::to_value(&user.site_roles).unwrap_or(Value::Null));
        sqlx::query(
            "update iot.users set user_name = $2, email = $3, password_hash = $4, role = $5, \
             disabled = $6, mfa_enabled = $7, totp_secret_b32 = $8, totp_digits = $9, \
             totp_period = $10, site_roles = $11::jsonb, updated_at_ms = $12 \
             where id = $1",
        )
        .bind(&user.id)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.disabled)
        .bind(user.mfa_enabled)
        .bind(&user.totp_secret_b32)
        .bind(user.totp_digits as i32)
        .bind(user.totp_period as i32)
        .bind(site_roles)
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from iot.users where tenant_id = $1 and id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<(), StorageError> {
        sqlx::query("update iot.users set disabled = $2, updated_at_ms = $3 where id = $1")
            .bind(id)
            .bind(disabled)
            .bind(now_epoch_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
