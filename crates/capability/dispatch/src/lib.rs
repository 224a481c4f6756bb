//! 命令下发泵
//!
//! 持久化 outbox（iot.device_commands）到 MQTT 发布的翻译器：
//!
//! 1. 按 created_at 升序取 pending 行
//! 2. 解析设备 → broker → 命令主题
//! 3. 发布 `{"cmd_id","command","params"}`，立即置 sent 并广播 `command.sent`
//! 4. 有界等待发布确认：确认 → acked；发布失败 → failed；超时保持 sent，
//!    由周期扫描按重试规则重投（at-least-once，接收方以 cmd_id 去重）
//!
//! 唤醒来源：`iot_commands` 通知与周期 tick。周期 tick 同时负责
//! retry → pending 回迁与滞留 sent 行的重投。

use api_contract::CommandEventFrame;
use async_trait::async_trait;
use domain::{Command, Device, Event, EventSeverity, EventSource, MqttTopic};
use edge_fleet::DeviceManager;
use edge_mqtt::{Outcome, Transaction};
use edge_storage::{ChangeStream, CommandStore, EventStore, StorageError};
use edge_telemetry::{
    record_command_acked, record_command_dispatched, record_command_failed,
    record_command_retried,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 下发参数。
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 单次扫描最多处理的 pending 行数。
    pub batch_limit: i64,
    /// 发布确认的有界等待。
    pub publish_timeout: Duration,
    /// 重试回迁延迟（秒）。
    pub retry_delay_seconds: u64,
    /// sent 行滞留多久后按重试规则重投。
    pub stale_sent_after: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_limit: 200,
            publish_timeout: Duration::from_millis(200),
            retry_delay_seconds: 30,
            stale_sent_after: Duration::from_secs(60),
        }
    }
}

const SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// 下发泵对机群的依赖面：注册表读取 + broker 发布。
///
/// 生产实现是 [`DeviceManager`]；trait 便于替换实现与测试。
#[async_trait]
pub trait DeviceFleet: Send + Sync {
    fn get_device(&self, id: &str) -> Option<Device>;
    fn topics_for_device(&self, device_id: &str) -> Vec<MqttTopic>;
    async fn publish_to_broker(
        &self,
        server_id: &str,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: u8,
    ) -> Option<Transaction>;
}

#[async_trait]
impl DeviceFleet for DeviceManager {
    fn get_device(&self, id: &str) -> Option<Device> {
        DeviceManager::get_device(self, id)
    }

    fn topics_for_device(&self, device_id: &str) -> Vec<MqttTopic> {
        DeviceManager::topics_for_device(self, device_id)
    }

    async fn publish_to_broker(
        &self,
        server_id: &str,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: u8,
    ) -> Option<Transaction> {
        DeviceManager::publish_to_broker(self, server_id, topic, payload, retain, qos).await
    }
}

/// 命令下发泵。
pub struct CommandDispatcher {
    commands: Arc<dyn CommandStore>,
    events: Arc<dyn EventStore>,
    manager: Arc<dyn DeviceFleet>,
    broadcaster: Option<broadcast::Sender<String>>,
    config: DispatchConfig,
}

impl CommandDispatcher {
    pub fn new(
        commands: Arc<dyn CommandStore>,
        events: Arc<dyn EventStore>,
        manager: Arc<dyn DeviceFleet>,
        broadcaster: Option<broadcast::Sender<String>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            commands,
            events,
            manager,
            broadcaster,
            config,
        }
    }

    /// 单次扫描：严格按 created_at 顺序处理 pending 命令。
    pub async fn dispatch_pending(&self, limit: i64) -> Result<u64, StorageError> {
        let pending = self.commands.fetch_pending(limit).await?;
        let mut processed = 0;
        for command in pending {
            self.dispatch_one(command).await;
            processed += 1;
        }
        Ok(processed)
    }

    async fn dispatch_one(&self, command: Command) {
        let Some(device) = self.manager.get_device(&command.device_id) else {
            self.fail(&command, "device_not_found").await;
            return;
        };
        if !device.is_mqtt() {
            self.fail(&command, "not_mqtt_device").await;
            return;
        }

        let topics = self.manager.topics_for_device(&device.id);
        let Some(topic) = topics.iter().find(|topic| {
            topic.role == "command" && topic.topic == command.command && topic.direction == "pub"
        }) else {
            self.fail(&command, "no_command_topic").await;
            return;
        };

        let payload = json!({
            "cmd_id": command.id,
            "command": command.command,
            "params": command.params,
        });
        let payload = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.fail(&command, &format!("payload_encode: {err}")).await;
                return;
            }
        };

        let transaction = self
            .manager
            .publish_to_broker(
                &device.server_id,
                &topic.topic,
                payload,
                topic.retain_as_published,
                topic.qos,
            )
            .await;
        let Some(transaction) = transaction else {
            // broker 会话缺失或不可达：保持 pending，等下一轮
            info!(
                target: "edge.dispatch",
                command_id = %command.id,
                server_id = %device.server_id,
                "broker not reachable, command left pending"
            );
            return;
        };

        if let Err(err) = self.commands.mark_sent(&command.id).await {
            warn!(target: "edge.dispatch", command_id = %command.id, error = %err, "mark_sent failed");
        }
        record_command_dispatched();
        self.broadcast(&command.id, CommandEventFrame::sent).await;

        match transaction.await_completion(self.config.publish_timeout).await {
            Outcome::Acked => {
                if let Err(err) = self.commands.mark_acked(&command.id).await {
                    warn!(target: "edge.dispatch", command_id = %command.id, error = %err, "mark_acked failed");
                }
                record_command_acked();
                self.broadcast(&command.id, CommandEventFrame::ack).await;
                info!(
                    target: "edge.dispatch",
                    command_id = %command.id,
                    topic = %topic.topic,
                    "command acknowledged"
                );
            }
            Outcome::Rejected(reason) => {
                if let Err(err) = self
                    .commands
                    .mark_failed(&command.id, "publish_failed_shunkedPacket")
                    .await
                {
                    warn!(target: "edge.dispatch", command_id = %command.id, error = %err, "mark_failed failed");
                }
                record_command_failed();
                self.broadcast(&command.id, CommandEventFrame::failed).await;
                self.record_failure_event(&command, &reason).await;
                warn!(
                    target: "edge.dispatch",
                    command_id = %command.id,
                    topic = %topic.topic,
                    reason = %reason,
                    "command publish failed"
                );
            }
            Outcome::Unknown => {
                // 结局未知：停在 sent，由周期扫描按重试规则重投
                info!(
                    target: "edge.dispatch",
                    command_id = %command.id,
                    "publish outcome unknown within bound"
                );
            }
        }
    }

    async fn fail(&self, command: &Command, error: &str) {
        if let Err(err) = self.commands.mark_failed(&command.id, error).await {
            warn!(target: "edge.dispatch", command_id = %command.id, error = %err, "mark_failed failed");
        }
        record_command_failed();
        self.record_failure_event(command, error).await;
        warn!(
            target: "edge.dispatch",
            command_id = %command.id,
            device_id = %command.device_id,
            error = %error,
            "command rejected"
        );
    }

    async fn record_failure_event(&self, command: &Command, detail: &str) {
        let event = Event {
            id: domain::new_id(),
            ts_ms: now_epoch_ms(),
            source: EventSource::System,
            event_type: "command.dispatch_failed".to_string(),
            severity: EventSeverity::Warning,
            site_id: String::new(),
            zone_id: String::new(),
            device_id: command.device_id.clone(),
            correlation_id: command.id.clone(),
            payload: json!({ "command": command.command, "detail": detail }),
        };
        if let Err(err) = self.events.insert(event).await {
            warn!(target: "edge.dispatch", error = %err, "event insert failed");
        }
    }

    /// 广播命令事件帧（重新取行，让帧携带最新状态）。
    async fn broadcast(
        &self,
        command_id: &str,
        frame: fn(serde_json::Value) -> CommandEventFrame,
    ) {
        let Some(broadcaster) = &self.broadcaster else {
            return;
        };
        let loaded = match self.commands.find_by_id(command_id).await {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(err) => {
                warn!(target: "edge.dispatch", command_id = %command_id, error = %err, "reload for broadcast failed");
                return;
            }
        };
        let value = match serde_json::to_value(&loaded) {
            Ok(value) => value,
            Err(_) => return,
        };
        if let Ok(text) = serde_json::to_string(&frame(value)) {
            let _ = broadcaster.send(text);
        }
    }

    /// 周期维护：回迁到期 retry 行，重投滞留 sent 行，然后扫描 pending。
    pub async fn sweep(&self) {
        let now_ms = now_epoch_ms();
        match self.commands.promote_due_retries(now_ms).await {
            Ok(promoted) if promoted > 0 => {
                record_command_retried();
                info!(target: "edge.dispatch", promoted, "retries promoted to pending");
            }
            Ok(_) => {}
            Err(err) => warn!(target: "edge.dispatch", error = %err, "retry promotion failed"),
        }

        let cutoff = now_ms - self.config.stale_sent_after.as_millis() as i64;
        match self
            .commands
            .requeue_stale_sent(cutoff, self.config.retry_delay_seconds)
            .await
        {
            Ok(requeued) if requeued > 0 => {
                record_command_retried();
                info!(target: "edge.dispatch", requeued, "stale sent commands requeued");
            }
            Ok(_) => {}
            Err(err) => warn!(target: "edge.dispatch", error = %err, "stale sent requeue failed"),
        }

        if let Err(err) = self.dispatch_pending(self.config.batch_limit).await {
            warn!(target: "edge.dispatch", error = %err, "dispatch sweep failed");
        }
    }

    /// 初始扫描后，由 `iot_commands` 通知与周期 tick 驱动。
    pub async fn run(self: Arc<Self>, changes: Option<ChangeStream>) {
        if let Err(err) = self.dispatch_pending(self.config.batch_limit).await {
            warn!(target: "edge.dispatch", error = %err, "initial dispatch failed");
        }

        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        match changes {
            Some(mut stream) => loop {
                tokio::select! {
                    _ = stream.next() => {
                        if let Err(err) = self.dispatch_pending(self.config.batch_limit).await {
                            warn!(target: "edge.dispatch", error = %err, "notified dispatch failed");
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            },
            None => loop {
                ticker.tick().await;
                self.sweep().await;
            },
        }
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
