//! PostgreSQL 存储实现
//!
//! - 所有 SQL 走参数绑定（`$n`），jsonb 列以文本出入并显式 `::jsonb` 转换
//! - 行到实体的映射按判别列分发（servers/devices 的 `protocol`），
//!   未知判别值报 StorageError

mod command;
mod device;
mod event;
mod server;
mod site;
mod tenant;
mod topic;
mod user;
mod zone;

pub use command::PgCommandStore;
pub use device::PgDeviceStore;
pub use event::PgEventStore;
pub use server::PgServerStore;
pub use site::PgSiteStore;
pub use tenant::PgTenantStore;
pub use topic::PgTopicStore;
pub use user::PgUserStore;
pub use zone::PgZoneStore;

use serde_json::Value;

/// jsonb 文本列 → Value。空列与坏值回落为 Null。
pub(crate) fn json_value(raw: Option<String>) -> Value {
    raw.and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

/// Value → jsonb 文本。
pub(crate) fn json_text(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
