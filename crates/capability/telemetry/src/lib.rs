//! 追踪与请求 ID 生成，以及核心链路的基础指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub fleet_reloads: u64,
    pub broker_connects: u64,
    pub broker_connect_failures: u64,
    pub topics_subscribed: u64,
    pub topic_subscribe_failures: u64,
    pub topology_snapshots: u64,
    pub commands_dispatched: u64,
    pub commands_acked: u64,
    pub commands_failed: u64,
    pub commands_retried: u64,
    pub ws_sessions_opened: u64,
    pub ws_sessions_closed: u64,
    pub ws_frames_fanned_out: u64,
}

/// 基础指标（原子计数器）。
pub struct TelemetryMetrics {
    fleet_reloads: AtomicU64,
    broker_connects: AtomicU64,
    broker_connect_failures: AtomicU64,
    topics_subscribed: AtomicU64,
    topic_subscribe_failures: AtomicU64,
    topology_snapshots: AtomicU64,
    commands_dispatched: AtomicU64,
    commands_acked: AtomicU64,
    commands_failed: AtomicU64,
    commands_retried: AtomicU64,
    ws_sessions_opened: AtomicU64,
    ws_sessions_closed: AtomicU64,
    ws_frames_fanned_out: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            fleet_reloads: AtomicU64::new(0),
            broker_connects: AtomicU64::new(0),
            broker_connect_failures: AtomicU64::new(0),
            topics_subscribed: AtomicU64::new(0),
            topic_subscribe_failures: AtomicU64::new(0),
            topology_snapshots: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            commands_acked: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            commands_retried: AtomicU64::new(0),
            ws_sessions_opened: AtomicU64::new(0),
            ws_sessions_closed: AtomicU64::new(0),
            ws_frames_fanned_out: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fleet_reloads: self.fleet_reloads.load(Ordering::Relaxed),
            broker_connects: self.broker_connects.load(Ordering::Relaxed),
            broker_connect_failures: self.broker_connect_failures.load(Ordering::Relaxed),
            topics_subscribed: self.topics_subscribed.load(Ordering::Relaxed),
            topic_subscribe_failures: self.topic_subscribe_failures.load(Ordering::Relaxed),
            topology_snapshots: self.topology_snapshots.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            commands_acked: self.commands_acked.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_retried: self.commands_retried.load(Ordering::Relaxed),
            ws_sessions_opened: self.ws_sessions_opened.load(Ordering::Relaxed),
            ws_sessions_closed: self.ws_sessions_closed.load(Ordering::Relaxed),
            ws_frames_fanned_out: self.ws_frames_fanned_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次拓扑全量重载。
pub fn record_fleet_reload() {
    metrics().fleet_reloads.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 连接成功。
pub fn record_broker_connect() {
    metrics().broker_connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录 broker 连接失败。
pub fn record_broker_connect_failure() {
    metrics()
        .broker_connect_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录主题订阅成功。
pub fn record_topic_subscribed() {
    metrics().topics_subscribed.fetch_add(1, Ordering::Relaxed);
}

/// 记录主题订阅失败。
pub fn record_topic_subscribe_failure() {
    metrics()
        .topic_subscribe_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录拓扑快照广播。
pub fn record_topology_snapshot() {
    metrics().topology_snapshots.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令发布（pending → sent）。
pub fn record_command_dispatched() {
    metrics().commands_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令确认（sent → acked）。
pub fn record_command_acked() {
    metrics().commands_acked.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令失败。
pub fn record_command_failed() {
    metrics().commands_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录命令进入重试。
pub fn record_command_retried() {
    metrics().commands_retried.fetch_add(1, Ordering::Relaxed);
}

/// 记录 WS 会话建立。
pub fn record_ws_session_opened() {
    metrics().ws_sessions_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录 WS 会话关闭。
pub fn record_ws_session_closed() {
    metrics().ws_sessions_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录扇出帧数。
pub fn record_ws_frame_fanned_out() {
    metrics().ws_frames_fanned_out.fetch_add(1, Ordering::Relaxed);
}
