//! 数据库通知通道
//!
//! 拓扑变更走 `iot_changes`，新建待下发命令走 `iot_commands`。
//! `ChangeStream` 封装 `PgListener`，连接中断后带退避重试。

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::warn;

/// 拓扑变更通知通道名。
pub const CHANGES_CHANNEL: &str = "iot_changes";

/// 待下发命令通知通道名。
pub const COMMANDS_CHANNEL: &str = "iot_commands";

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// 单通道通知流。
pub struct ChangeStream {
    listener: PgListener,
    channel: String,
}

impl ChangeStream {
    pub async fn connect(pool: &PgPool, channel: &str) -> Result<Self, StorageError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        Ok(Self {
            listener,
            channel: channel.to_string(),
        })
    }

    /// 阻塞等待下一条通知。连接中断时退避后继续等待。
    pub async fn next(&mut self) {
        loop {
            match self.listener.recv().await {
                Ok(_) => return,
                Err(err) => {
                    warn!(
                        target: "edge.storage",
                        channel = %self.channel,
                        error = %err,
                        "listen interrupted, retrying"
                    );
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}
