//! WebSocket 扇出房间
//!
//! 聊天室与 MQTT 网关共用的多会话协作模式：
//!
//! - 会话表由单把互斥锁守护，会话 id 从 1 起严格递增
//! - 每房间一个协作 worker 任务：在 Notify 上有界等待（默认 50 ms 轮询），
//!   醒来后按固定顺序清旗标：stop → 初连 → ping → 待处理 SUB/UNSUB →
//!   关闭会话清理 → 加入广播
//! - 关闭会话清理遵循「锁内摘出、放锁析构、再加锁」，不在锁内做任意析构
//! - 会话出站是无界通道，锁内入队即返回；同一房间事件的广播顺序对
//!   所有会话一致
//!
//! 传输无关：房间只认每会话的文本出站通道，WS 升级与读写泵在应用层。

mod chat;
mod gateway;

pub use chat::ChatRoom;
pub use gateway::{GatewayBrokerSettings, GatewayRoom, GatewayRoomConfig};

/// 会话出站通道（文本帧）。
pub type Outbound = tokio::sync::mpsc::UnboundedSender<String>;
