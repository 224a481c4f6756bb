//! # 存储层
//!
//! 统一的数据存储抽象：每个实体一个异步 Store trait，
//! 行到实体的映射按判别列分发（servers/devices 的 `protocol`）。
//!
//! ## 模块
//!
//! - [`traits`]：存储接口定义（实体模型在 `domain` crate）
//! - [`error`]：统一的 StorageError
//! - [`connection`]：PostgreSQL 连接池
//! - [`notify`]：`iot_changes` / `iot_commands` 通知通道（PgListener）
//! - [`postgres`]：PostgreSQL 实现（生产）
//! - [`in_memory`]：内存实现（测试与 EDGE_STORE=memory 演示）
//!
//! ## 约束
//!
//! - Handler 层禁止直接写 SQL，统一通过 Store trait
//! - 所有 SQL 参数化绑定
//! - 命令 outbox 的状态迁移边在实现层强制（终态不再离开）

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod notify;
pub mod postgres;
pub mod traits;

pub use connection::{PgPool, connect_pool};
pub use error::StorageError;
pub use notify::{CHANGES_CHANNEL, COMMANDS_CHANNEL, ChangeStream};
pub use traits::{
    CommandStore, DeviceStore, EventStore, ServerStore, SiteStore, TenantStore, TopicStore,
    UserStore, ZoneStore,
};

pub use in_memory::{
    InMemoryCommandStore, InMemoryDeviceStore, InMemoryEventStore, InMemoryServerStore,
    InMemorySiteStore, InMemoryTenantStore, InMemoryTopicStore, InMemoryUserStore,
    InMemoryZoneStore,
};

pub use postgres::{
    PgCommandStore, PgDeviceStore, PgEventStore, PgServerStore, PgSiteStore, PgTenantStore,
    PgTopicStore, PgUserStore, PgZoneStore,
};
