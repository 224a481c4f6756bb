//! 路由定义
//!
//! - 健康检查：/health
//! - 认证：/signin, /login
//! - 用户管理：/users（Admin + 租户匹配）
//! - WebSocket：/ws/chat, /ws/gateway, /ws/events

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建 API 路由。
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/signin", post(signin))
        .route("/login", post(login))
        .route("/users", get(list_users).post(create_user))
        .route("/ws/chat", get(chat_ws))
        .route("/ws/gateway", get(gateway_ws))
        .route("/ws/events", get(events_ws))
}
