//! 命令 outbox 存储内存实现
//!
//! 状态机迁移边与 Postgres 实现保持一致。

use crate::error::StorageError;
use crate::traits::CommandStore;
use super::now_epoch_ms;
use domain::{Command, CommandStatus};
use serde_json::Value;
use std::sync::RwLock;

pub struct InMemoryCommandStore {
    commands: RwLock<Vec<Command>>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn insert_pending(
        &self,
        device_id: &str,
        command: &str,
        params: Value,
    ) -> Result<Command, StorageError> {
        let now_ms = now_epoch_ms();
        let record = Command {
            id: domain::new_id(),
            device_id: device_id.to_string(),
            command: command.to_string(),
            params,
            status: CommandStatus::Pending,
            attempts: 0,
            next_retry_at_ms: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            sent_at_ms: None,
            ack_at_ms: None,
            error: None,
        };
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        commands.push(record.clone());
        Ok(record)
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Command>, StorageError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<Command> = commands
            .iter()
            .filter(|command| command.status == CommandStatus::Pending)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        let limit = limit.max(0) as usize;
        if limit > 0 && items.len() > limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, StorageError> {
        let commands = self
            .commands
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(commands.iter().find(|command| command.id == id).cloned())
    }

    async fn mark_sent(&self, id: &str) -> Result<(), StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for command in commands.iter_mut() {
            if command.id == id && command.status == CommandStatus::Pending {
                let now_ms = now_epoch_ms();
                command.status = CommandStatus::Sent;
                command.sent_at_ms = Some(now_ms);
                command.updated_at_ms = now_ms;
            }
        }
        Ok(())
    }

    async fn mark_acked(&self, id: &str) -> Result<(), StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for command in commands.iter_mut() {
            if command.id == id && command.status == CommandStatus::Sent {
                let now_ms = now_epoch_ms();
                command.status = CommandStatus::Acked;
                command.ack_at_ms = Some(now_ms);
                command.updated_at_ms = now_ms;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for command in commands.iter_mut() {
            if command.id == id && !command.status.is_terminal() {
                command.status = CommandStatus::Failed;
                command.error = Some(error.to_string());
                command.updated_at_ms = now_epoch_ms();
            }
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: &str,
        attempts: u32,
        delay_seconds: u64,
        error: &str,
    ) -> Result<(), StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for command in commands.iter_mut() {
            if command.id == id && !command.status.is_terminal() {
                let now_ms = now_epoch_ms();
                command.status = CommandStatus::Retry;
                command.attempts = attempts;
                command.next_retry_at_ms = Some(now_ms + (delay_seconds as i64) * 1000);
                command.error = Some(error.to_string());
                command.updated_at_ms = now_ms;
            }
        }
        Ok(())
    }

    async fn promote_due_retries(&self, now_ms: i64) -> Result<u64, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut promoted = 0;
        for command in commands.iter_mut() {
            if command.status == CommandStatus::Retry
                && command.next_retry_at_ms.is_some_and(|at| at <= now_ms)
            {
                command.status = CommandStatus::Pending;
                command.updated_at_ms = now_ms;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn requeue_stale_sent(
        &self,
        cutoff_ms: i64,
        delay_seconds: u64,
    ) -> Result<u64, StorageError> {
        let mut commands = self
            .commands
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let now_ms = now_epoch_ms();
        let mut requeued = 0;
        for command in commands.iter_mut() {
            if command.status == CommandStatus::Sent
                && command.sent_at_ms.is_some_and(|at| at <= cutoff_ms)
            {
                command.status = CommandStatus::Retry;
                command.attempts += 1;
                command.next_retry_at_ms = Some(now_ms + (delay_seconds as i64) * 1000);
                command.error = Some("publish_timeout".to_string());
                command.updated_at_ms = now_ms;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
