//! MQTT 能力：broker 会话、订阅对账、主题过滤器匹配。

mod connector;
mod filter;
mod session;

pub use connector::MqttDeviceConnector;
pub use filter::matches_filter;
pub use session::{
    Completion, IncomingPublish, MqttSession, MqttSessionConfig, Outcome, Transaction,
};

/// MQTT 链路错误。
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("client error: {0}")]
    Client(String),
    #[error("broker not reachable")]
    NotReachable,
}
