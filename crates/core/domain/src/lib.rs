//! 领域模型：所有模块共享的实体、角色与标识。

pub mod model;

pub use model::{
    Command, CommandStatus, Device, Event, EventSeverity, EventSource, MqttBrokerDetail,
    MqttTopic, Server, ServerDetail, Site, Tenant, User, Zone,
};

use serde::{Deserialize, Serialize};

/// 生成时间有序的实体 ID（UUID v7，字符串形式）。
///
/// 按创建顺序排序时直接比较字符串即可。
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// 用户角色，全序 Viewer < Operator < Admin。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Viewer,
    Operator,
    Admin,
}

impl Role {
    /// 解析角色名（大小写不敏感）。未知值返回 None。
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "operator" => Some(Role::Operator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_is_total() {
        assert!(Role::Viewer < Role::Operator);
        assert!(Role::Operator < Role::Admin);
        assert!(Role::Admin >= Role::Admin);
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" operator "), Some(Role::Operator));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn ids_are_creation_ordered() {
        let a = new_id();
        let b = new_id();
        assert!(a < b);
    }
}
