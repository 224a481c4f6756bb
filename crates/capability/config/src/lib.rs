//! 应用运行配置加载（EDGE_* 环境变量）。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关房间使用的 MQTT broker 配置。
#[derive(Debug, Clone)]
pub struct GatewayMqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub qos: u8,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub will_retain: bool,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// `postgres`（默认）或 `memory`（演示/测试，不需要数据库）。
    pub store: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: u64,
    pub jwt_iss: Option<String>,
    pub jwt_aud: Option<String>,
    pub gateway_mqtt: GatewayMqttConfig,
    pub room_poll_ms: u64,
    pub room_ping_ms: u64,
    pub mqtt_connect_timeout_ms: u64,
    pub mqtt_suback_timeout_ms: u64,
    pub dispatch_publish_timeout_ms: u64,
    pub dispatch_batch_limit: i64,
    pub dispatch_retry_delay_seconds: u64,
    pub fleet_enabled: bool,
    pub dispatch_enabled: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = env::var("EDGE_STORE").unwrap_or_else(|_| "postgres".to_string());
        let database_url = read_optional("EDGE_DATABASE_URL");
        if store == "postgres" && database_url.is_none() {
            return Err(ConfigError::Missing("EDGE_DATABASE_URL".to_string()));
        }
        let jwt_secret = env::var("EDGE_JWT_SECRET")
            .map_err(|_| ConfigError::Missing("EDGE_JWT_SECRET".to_string()))?;
        let jwt_ttl_seconds = read_u64_with_default("EDGE_JWT_TTL_SECONDS", 3600)?;
        let jwt_iss = read_optional("EDGE_JWT_ISS");
        let jwt_aud = read_optional("EDGE_JWT_AUD");
        let http_addr = env::var("EDGE_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let gateway_mqtt = GatewayMqttConfig {
            host: env::var("EDGE_GATEWAY_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: read_u16_with_default("EDGE_GATEWAY_MQTT_PORT", 1883)?,
            username: read_optional("EDGE_GATEWAY_MQTT_USERNAME"),
            password: read_optional("EDGE_GATEWAY_MQTT_PASSWORD"),
            client_id: env::var("EDGE_GATEWAY_MQTT_CLIENT_ID")
                .unwrap_or_else(|_| "ws-gateway".to_string()),
            clean_session: read_bool_with_default("EDGE_GATEWAY_MQTT_CLEAN_SESSION", true),
            keep_alive: read_u16_with_default("EDGE_GATEWAY_MQTT_KEEP_ALIVE", 10)?,
            qos: read_u8_with_default("EDGE_GATEWAY_MQTT_QOS", 1)?,
            will_topic: read_optional("EDGE_GATEWAY_MQTT_WILL_TOPIC"),
            will_payload: read_optional("EDGE_GATEWAY_MQTT_WILL_PAYLOAD"),
            will_retain: read_bool_with_default("EDGE_GATEWAY_MQTT_WILL_RETAIN", false),
        };

        let room_poll_ms = read_u64_with_default("EDGE_ROOM_POLL_MS", 50)?;
        let room_ping_ms = read_u64_with_default("EDGE_ROOM_PING_MS", 50_000)?;
        let mqtt_connect_timeout_ms = read_u64_with_default("EDGE_MQTT_CONNECT_TIMEOUT_MS", 100)?;
        let mqtt_suback_timeout_ms = read_u64_with_default("EDGE_MQTT_SUBACK_TIMEOUT_MS", 30)?;
        let dispatch_publish_timeout_ms =
            read_u64_with_default("EDGE_DISPATCH_PUBLISH_TIMEOUT_MS", 200)?;
        let dispatch_batch_limit = read_i64_with_default("EDGE_DISPATCH_BATCH_LIMIT", 200)?;
        let dispatch_retry_delay_seconds =
            read_u64_with_default("EDGE_DISPATCH_RETRY_DELAY_SECONDS", 30)?;
        let fleet_enabled = read_bool_with_default("EDGE_FLEET", false);
        let dispatch_enabled = read_bool_with_default("EDGE_DISPATCH", false);

        Ok(Self {
            http_addr,
            store,
            database_url,
            jwt_secret,
            jwt_ttl_seconds,
            jwt_iss,
            jwt_aud,
            gateway_mqtt,
            room_poll_ms,
            room_ping_ms,
            mqtt_connect_timeout_ms,
            mqtt_suback_timeout_ms,
            dispatch_publish_timeout_ms,
            dispatch_batch_limit,
            dispatch_retry_delay_seconds,
            fleet_enabled,
            dispatch_enabled,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_i64_with_default(key: &str, default: i64) -> Result<i64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<i64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
