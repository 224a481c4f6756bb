//! 稳定的 HTTP/WS 对外契约（请求体、响应体、WS 帧）。
//!
//! - HTTP 错误统一为 `{"error":"<message>"}`
//! - 聊天室与 MQTT 网关的 WS 帧字段为 PascalCase（`Type` 作为判别字段）
//! - 拓扑快照与命令事件帧的 `type` 字段为小写点分名

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// 登录请求体。租户可由 body 或 `X-Tenant-Id` 头给出。
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant_slug: Option<String>,
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub totp: Option<String>,
}

/// 登录响应体。
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub role: String,
    pub mfa_enabled: bool,
}

/// 注册/建用户请求体（/signin 与 POST /users 共用）。
#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub tenant_id: String,
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub totp_digits: Option<u32>,
    #[serde(default)]
    pub totp_period: Option<u32>,
}

// ============================================================================
// 聊天室 WS 帧
// ============================================================================

/// 聊天记录条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatEntry {
    pub time: i64,
    pub sender: String,
    pub chat: String,
}

/// 聊天室入站帧。
#[derive(Debug, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum ChatRequest {
    SetUserName {
        user_name: String,
        #[serde(default)]
        password: String,
    },
    GetUserNames,
    PostChat {
        chat: String,
    },
    JoinChatRoom,
}

/// 聊天室出站帧。
#[derive(Debug, Serialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum ChatResponse {
    SetUserNameResult {
        success: bool,
    },
    UserNames {
        user_names: Vec<String>,
    },
    PostChatResult {
        time: i64,
        sender: String,
        chat: String,
    },
    Leave {
        user_name: String,
    },
    JoinChatRoomResponse {
        chat_log: Vec<ChatEntry>,
        user_names: Vec<String>,
    },
}

// ============================================================================
// MQTT 网关 WS 帧
// ============================================================================

/// 网关入站帧。
#[derive(Debug, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum GatewayRequest {
    JoinServer,
    Subscribe {
        topic: String,
        #[serde(default)]
        qo_s: Option<u8>,
    },
    UnSubscribe {
        topic: String,
        #[serde(default)]
        qo_s: Option<u8>,
    },
}

/// 网关出站帧。
#[derive(Debug, Serialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum GatewayResponse {
    JoinChatRoomResponse {
        success: bool,
        mqtt_status: String,
        subscription: Vec<String>,
    },
    SubscribeResult {
        topic: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    UnSubscribeResult {
        topic: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Publish {
        id: u16,
        topic: String,
        payload: String,
    },
}

// ============================================================================
// 推送帧（拓扑快照与命令事件）
// ============================================================================

/// 拓扑快照帧：`{"type":"topologie.update","sites":{…},"ts":<epoch-seconds>}`。
#[derive(Debug, Serialize, Deserialize)]
pub struct TopologyFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub sites: Value,
    pub ts: f64,
}

impl TopologyFrame {
    pub fn new(sites: Value, ts: f64) -> Self {
        Self {
            frame_type: "topologie.update".to_string(),
            sites,
            ts,
        }
    }
}

/// 命令事件帧：`{"type":"command.sent|command.ack|command.failed","command":{…}}`。
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandEventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub command: Value,
}

impl CommandEventFrame {
    pub fn sent(command: Value) -> Self {
        Self {
            frame_type: "command.sent".to_string(),
            command,
        }
    }

    pub fn ack(command: Value) -> Self {
        Self {
            frame_type: "command.ack".to_string(),
            command,
        }
    }

    pub fn failed(command: Value) -> Self {
        Self {
            frame_type: "command.failed".to_string(),
            command,
        }
    }
}
