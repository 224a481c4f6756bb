//! Postgres 命令 outbox 存储实现
//!
//! ## 状态机
//!
//! mark_* 的 where 条件限定合法迁移边，终态行不会被再次改写：
//!
//! - mark_sent：仅 `pending` 行
//! - mark_acked：仅 `sent` 行
//! - mark_failed / schedule_retry：仅非终态行
//! - promote_due_retries：到期的 `retry` 行回迁 `pending`

use crate::error::StorageError;
use crate::traits::CommandStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::{Command, CommandStatus};
use serde_json::Value;
use sqlx::{PgPool, Row};

const COMMAND_COLUMNS: &str = "id, device_id, command, params::text as params, status, attempts, \
     next_retry_at_ms, created_at_ms, updated_at_ms, sent_at_ms, ack_at_ms, error";

pub struct PgCommandStore {
    pool: PgPool,
}

impl PgCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: &str) -> Result<CommandStatus, StorageError> {
    match raw {
        "pending" => Ok(CommandStatus::Pending),
        "sent" => Ok(CommandStatus::Sent),
        "acked" => Ok(CommandStatus::Acked),
        "failed" => Ok(CommandStatus::Failed),
        "retry" => Ok(CommandStatus::Retry),
        "cancelled" => Ok(CommandStatus::Cancelled),
        other => Err(StorageError::new(format!("unknown command status: {other}"))),
    }
}

fn row_to_command(row: &sqlx::postgres::PgRow) -> Result<Command, StorageError> {
    let status_text: String = row.try_get("status")?;
    Ok(Command {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        command: row.try_get("command")?,
        params: json_value(row.try_get("params")?),
        status: parse_status(&status_text)?,
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        next_retry_at_ms: row.try_get("next_retry_at_ms")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
        sent_at_ms: row.try_get("sent_at_ms")?,
        ack_at_ms: row.try_get("ack_at_ms")?,
        error: row.try_get("error")?,
    })
}

#[async_trait::async_trait]
impl CommandStore for PgCommandStore {
    async fn insert_pending(
        &self,
        device_id: &str,
        command: &str,
        params: Value,
    ) -> Result<Command, StorageError> {
        let now_ms = now_epoch_ms();
        let id = domain::new_id();
        let sql = format!(
            "insert into iot.device_commands (id, device_id, command, params, status, attempts, \
             created_at_ms, updated_at_ms) \
             values ($1, $2, $3, $4::jsonb, 'pending', 0, $5, $5) returning {COMMAND_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(device_id)
            .bind(command)
            .bind(json_text(&params))
            .bind(now_ms)
            .fetch_one(&self.pool)
            .await?;
        row_to_command(&row)
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Command>, StorageError> {
        let sql = format!(
            "select {COMMAND_COLUMNS} from iot.device_commands where status = 'pending' \
             order by created_at_ms asc, id asc limit $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_command).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, StorageError> {
        let sql = format!("select {COMMAND_COLUMNS} from iot.device_commands where id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_command).transpose()
    }

    async fn mark_sent(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.device_commands set status = 'sent', sent_at_ms = $2, \
             updated_at_ms = $2 where id = $1 and status = 'pending'",
        )
        .bind(id)
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_acked(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.device_commands set status = 'acked', ack_at_ms = $2, \
             updated_at_ms = $2 where id = $1 and status = 'sent'",
        )
        .bind(id)
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StorageError> {
        sqlx::query(
            "update iot.device_commands set status = 'failed', error = $2, updated_at_ms = $3 \
             where id = $1 and status not in ('acked', 'failed', 'cancelled')",
        )
        .bind(id)
        .bind(error)
        .bind(now_epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: &str,
        attempts: u32,
        delay_seconds: u64,
        error: &str,
    ) -> Result<(), StorageError> {
        let now_ms = now_epoch_ms();
        let next_retry = now_ms + (delay_seconds as i64) * 1000;
        sqlx::query(
            "update iot.device_commands set status = 'retry', attempts = $2, \
             next_retry_at_ms = $3, error = $4, updated_at_ms = $5 \
             where id = $1 and status not in ('acked', 'failed', 'cancelled')",
        )
        .bind(id)
        .bind(attempts as i32)
        .bind(next_retry)
        .bind(error)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn promote_due_retries(&self, now_ms: i64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "update iot.device_commands set status = 'pending', updated_at_ms = $1 \
             where status = 'retry' and next_retry_at_ms is not null \
             and next_retry_at_ms <= $1",
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn requeue_stale_sent(
        &self,
        cutoff_ms: i64,
        delay_seconds: u64,
    ) -> Result<u64, StorageError> {
        let now_ms = now_epoch_ms();
        let next_retry = now_ms + (delay_seconds as i64) * 1000;
        let result = sqlx::query(
            "update iot.device_commands set status = 'retry', attempts = attempts + 1, \
             next_retry_at_ms = $2, error = 'publish_timeout', updated_at_ms = $3 \
             where status = 'sent' and sent_at_ms is not null and sent_at_ms <= $1",
        )
        .bind(cutoff_ms)
        .bind(next_retry)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
