//! 存储接口 Trait 定义
//!
//! 每个实体一个异步存储接口：
//! - TenantStore / UserStore：租户与用户
//! - SiteStore / ZoneStore：站点层级
//! - ServerStore / DeviceStore / TopicStore：服务器、设备与主题
//! - CommandStore：命令 outbox
//! - EventStore：系统事件
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - `insert` 返回的 id 必须等于实体 id（调用方校验）
//! - 行到实体的映射在实现层按判别列（protocol 等）分发，未知判别值是错误
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{Command, Device, Event, MqttTopic, Server, Site, Tenant, User, Zone};
use serde_json::Value;

/// 租户存储接口
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Tenant>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, StorageError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StorageError>;
    async fn insert(&self, tenant: Tenant) -> Result<String, StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
}

/// 用户存储接口
///
/// (tenant_id, user_name) 唯一，作为登录判别键。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 列出租户内用户（创建序，最多 limit 条）
    async fn list(&self, tenant_id: &str, limit: i64) -> Result<Vec<User>, StorageError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StorageError>;

    /// 登录查找：租户 + 用户名
    async fn find_by_tenant_and_name(
        &self,
        tenant_id: &str,
        user_name: &str,
    ) -> Result<Option<User>, StorageError>;

    /// 插入并返回 id
    async fn insert(&self, user: User) -> Result<String, StorageError>;

    async fn update(&self, user: &User) -> Result<(), StorageError>;

    async fn remove(&self, tenant_id: &str, id: &str) -> Result<bool, StorageError>;

    async fn set_disabled(&self, id: &str, disabled: bool) -> Result<(), StorageError>;
}

/// 站点存储接口
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Site>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Site>, StorageError>;
    async fn insert(&self, site: Site) -> Result<String, StorageError>;
    async fn update(&self, site: &Site) -> Result<(), StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
}

/// 区域存储接口
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Zone>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Zone>, StorageError>;
    async fn insert(&self, zone: Zone) -> Result<String, StorageError>;
    async fn update(&self, zone: &Zone) -> Result<(), StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
}

/// 服务器存储接口（按 `protocol` 判别列构造具体变体）
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Server>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Server>, StorageError>;
    async fn insert(&self, server: Server) -> Result<String, StorageError>;
    async fn update(&self, server: &Server) -> Result<(), StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError>;
}

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Device>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Device>, StorageError>;
    async fn insert(&self, device: Device) -> Result<String, StorageError>;
    async fn update(&self, device: &Device) -> Result<(), StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError>;
}

/// 设备主题存储接口
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<MqttTopic>, StorageError>;
    async fn find_by_device(&self, device_id: &str) -> Result<Vec<MqttTopic>, StorageError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<MqttTopic>, StorageError>;
    async fn insert(&self, topic: MqttTopic) -> Result<String, StorageError>;
    async fn update(&self, topic: &MqttTopic) -> Result<(), StorageError>;
    async fn remove(&self, id: &str) -> Result<bool, StorageError>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError>;
}

/// 命令 outbox 存储接口
///
/// 状态机保证：mark_* 只沿合法边迁移，终态不再离开
/// （retry → pending 由 promote_due_retries 显式回迁）。
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// 追加一条 pending 命令并返回完整行
    async fn insert_pending(
        &self,
        device_id: &str,
        command: &str,
        params: Value,
    ) -> Result<Command, StorageError>;

    /// 取最多 limit 条 pending 命令，created_at 升序
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Command>, StorageError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, StorageError>;

    /// pending → sent（记录 sent_at）
    async fn mark_sent(&self, id: &str) -> Result<(), StorageError>;

    /// sent → acked（记录 ack_at）
    async fn mark_acked(&self, id: &str) -> Result<(), StorageError>;

    /// 非终态 → failed（记录错误）
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StorageError>;

    /// 非终态 → retry（累计 attempts，设定 next_retry_at）
    async fn schedule_retry(
        &self,
        id: &str,
        attempts: u32,
        delay_seconds: u64,
        error: &str,
    ) -> Result<(), StorageError>;

    /// 将到期的 retry 行回迁为 pending，返回回迁条数
    async fn promote_due_retries(&self, now_ms: i64) -> Result<u64, StorageError>;

    /// 将超过 cutoff 仍停留在 sent 的行转入 retry（attempts + 1，
    /// 错误记为 publish_timeout），返回条数。结局未知的发布靠它重投。
    async fn requeue_stale_sent(
        &self,
        cutoff_ms: i64,
        delay_seconds: u64,
    ) -> Result<u64, StorageError>;
}

/// 事件存储接口
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: Event) -> Result<String, StorageError>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<Event>, StorageError>;
}
