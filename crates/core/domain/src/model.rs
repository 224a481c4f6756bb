//! 实体定义
//!
//! 部署层级：租户 → 站点（Site）→ 区域（Zone）→ 设备（Device）→ 主题（MqttTopic）。
//! 服务器（Server）按协议多态，核心实现的具体类型是 MQTT Broker。
//!
//! - 所有实体以时间有序的 UUID 字符串作为主键
//! - serde 即规范的 JSON 编解码（对外快照、WS 帧均复用）
//! - 时间戳统一为 Unix 毫秒（i64）

use crate::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 租户。slug 全局唯一，作为 URL 安全的短标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// 用户。(tenant_id, user_name) 唯一。
///
/// `site_roles` 为站点级角色覆盖：site_id → 角色。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub totp_secret_b32: String,
    #[serde(default = "default_totp_digits")]
    pub totp_digits: u32,
    #[serde(default = "default_totp_period")]
    pub totp_period: u32,
    #[serde(default)]
    pub site_roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

fn default_totp_digits() -> u32 {
    6
}

fn default_totp_period() -> u32 {
    30
}

impl User {
    /// 对外快照：剔除口令散列。MFA 未启用时同时剔除 TOTP 密钥。
    pub fn to_public_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("password_hash");
            if !self.mfa_enabled {
                object.remove("totp_secret_b32");
            }
        }
        value
    }
}

/// 站点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

/// 区域，归属唯一站点。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Zone {
    pub id: String,
    pub site_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub geojson: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

/// MQTT Broker 的连接配置（`iot.server_credentials` 与服务器行合并后的结果）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MqttBrokerDetail {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub clean_session: bool,
    #[serde(default)]
    pub will_retain: bool,
    #[serde(default)]
    pub will_topic: String,
    #[serde(default)]
    pub will_payload: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u16 {
    10
}

/// 服务器的协议变体。行工厂与 JSON 编解码按 `protocol` 判别列分发。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol")]
pub enum ServerDetail {
    #[serde(rename = "mqtt")]
    Mqtt(MqttBrokerDetail),
    #[serde(rename = "modbus-tcp")]
    ModbusTcp,
    #[serde(rename = "opcua")]
    OpcUa,
}

impl ServerDetail {
    pub fn protocol(&self) -> &'static str {
        match self {
            ServerDetail::Mqtt(_) => "mqtt",
            ServerDetail::ModbusTcp => "modbus-tcp",
            ServerDetail::OpcUa => "opcua",
        }
    }
}

/// 服务器（按协议多态）。可达性是 broker 会话的瞬态运行状态，不落库。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
    #[serde(flatten)]
    pub detail: ServerDetail,
}

impl Server {
    pub fn protocol(&self) -> &'static str {
        self.detail.protocol()
    }

    /// 站点归属通过 `metadata.site_id` 解析。
    pub fn site_id(&self) -> Option<&str> {
        self.metadata.get("site_id").and_then(Value::as_str)
    }

    pub fn mqtt_detail(&self) -> Option<&MqttBrokerDetail> {
        match &self.detail {
            ServerDetail::Mqtt(detail) => Some(detail),
            _ => None,
        }
    }
}

/// 设备。归属唯一区域与站点，可选归属一台服务器。
///
/// MQTT 设备即 `protocol == "mqtt"` 的设备；其订阅主题由
/// 注册表的 device_id → topics 映射持有，设备本身不携带主题对象。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub server_id: String,
    pub site_id: String,
    pub zone_id: String,
    #[serde(default)]
    pub type_id: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub last_seen_at_ms: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl Device {
    pub fn is_mqtt(&self) -> bool {
        self.protocol == "mqtt"
    }
}

/// 设备主题。`topic` 为 MQTT 过滤器，`direction` ∈ pub|sub|pubsub，
/// `role` ∈ telemetry|command|state|event|config。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MqttTopic {
    pub id: String,
    pub device_id: String,
    pub role: String,
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub retain_handling: u8,
    #[serde(default)]
    pub retain_as_published: bool,
    #[serde(default)]
    pub auto_feedback: bool,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl MqttTopic {
    /// 该主题是否需要向 broker 发起订阅。
    pub fn is_subscribed(&self) -> bool {
        self.enabled && (self.direction == "sub" || self.direction == "pubsub")
    }
}

/// 命令状态机。终态只进入一次；retry → pending 是唯一的回退边。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Pending,
    Sent,
    Acked,
    Failed,
    Retry,
    Cancelled,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Acked | CommandStatus::Failed | CommandStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Acked => "acked",
            CommandStatus::Failed => "failed",
            CommandStatus::Retry => "retry",
            CommandStatus::Cancelled => "cancelled",
        }
    }
}

/// 待下发命令（持久化 outbox 行）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Command {
    pub id: String,
    pub device_id: String,
    pub command: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub status: CommandStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub next_retry_at_ms: Option<i64>,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
    #[serde(default)]
    pub sent_at_ms: Option<i64>,
    #[serde(default)]
    pub ack_at_ms: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 事件来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Iot,
    Vision,
    Ai,
    System,
    User,
}

/// 事件严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// 系统事件（broker 连接、订阅失败、命令下发失败等）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Event {
    pub id: String,
    pub ts_ms: i64,
    #[serde(default)]
    pub source: EventSource,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub severity: EventSeverity,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: crate::new_id(),
            tenant_id: "t1".into(),
            user_name: "hatem".into(),
            email: "hatem@example.com".into(),
            password_hash: "$argon2id$v=19$...".into(),
            role: Role::Admin,
            disabled: false,
            mfa_enabled: true,
            totp_secret_b32: "JBSWY3DPEHPK3PXP".into(),
            totp_digits: 6,
            totp_period: 30,
            site_roles: BTreeMap::new(),
            created_at_ms: 1,
            updated_at_ms: 1,
        }
    }

    #[test]
    fn user_json_round_trip() {
        let user = sample_user();
        let encoded = serde_json::to_string(&user).expect("encode");
        let decoded: User = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(user, decoded);
    }

    #[test]
    fn public_json_redacts_password_hash() {
        let user = sample_user();
        let value = user.to_public_json();
        assert!(value.get("password_hash").is_none());
        // MFA 开启时保留密钥（signin 响应需要返回给调用方）
        assert_eq!(value["totp_secret_b32"], "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn server_detail_dispatches_on_protocol() {
        let raw = serde_json::json!({
            "id": "s1",
            "name": "broker",
            "host": "localhost",
            "port": 1883,
            "enabled": true,
            "protocol": "mqtt",
            "user_name": "edge",
            "password": "secret",
            "clean_session": true,
            "qos": 1,
            "keep_alive": 10
        });
        let server: Server = serde_json::from_value(raw).expect("decode");
        assert_eq!(server.protocol(), "mqtt");
        assert_eq!(server.mqtt_detail().expect("mqtt").user_name, "edge");

        let raw = serde_json::json!({
            "id": "s2",
            "name": "plc",
            "host": "10.0.0.2",
            "port": 502,
            "protocol": "modbus-tcp"
        });
        let server: Server = serde_json::from_value(raw).expect("decode");
        assert_eq!(server.protocol(), "modbus-tcp");
        assert!(server.mqtt_detail().is_none());
    }

    #[test]
    fn topic_subscription_requires_enabled_and_direction() {
        let mut topic = MqttTopic {
            id: "tp1".into(),
            device_id: "d1".into(),
            role: "telemetry".into(),
            topic: "site/+/temp".into(),
            direction: "sub".into(),
            enabled: true,
            ..MqttTopic::default()
        };
        assert!(topic.is_subscribed());
        topic.direction = "pub".into();
        assert!(!topic.is_subscribed());
        topic.direction = "pubsub".into();
        topic.enabled = false;
        assert!(!topic.is_subscribed());
    }
}
