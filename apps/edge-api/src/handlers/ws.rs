//! WebSocket 升级 handlers
//!
//! - /ws/chat：聊天室
//! - /ws/gateway：MQTT 网关房间
//! - /ws/events：拓扑快照与命令事件推送（只读）
//!
//! 非 WS 请求回落为 HTTP 200 纯文本提示。升级成功后：
//! 出站泵把会话的无界通道写回 socket，入站泵逐帧交给房间；
//! 任一方向断开即关闭会话并唤醒房间 worker 清理。

use crate::AppState;
use axum::{
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use edge_rooms::{ChatRoom, GatewayRoom, Outbound};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

const UPGRADE_FALLBACK: &str = "Try again, but next time use a WebSocket. thxbye!";

/// 房间接入点的最小界面（聊天室与网关房间共用会话泵）。
trait FanoutRoom: Send + Sync + 'static {
    fn add_session(&self, outbound: Outbound) -> u64;
    fn handle_message(&self, session_id: u64, text: &str);
    fn close_session(&self, session_id: u64);
}

impl FanoutRoom for ChatRoom {
    fn add_session(&self, outbound: Outbound) -> u64 {
        ChatRoom::add_session(self, outbound)
    }
    fn handle_message(&self, session_id: u64, text: &str) {
        ChatRoom::handle_message(self, session_id, text)
    }
    fn close_session(&self, session_id: u64) {
        ChatRoom::close_session(self, session_id)
    }
}

impl FanoutRoom for GatewayRoom {
    fn add_session(&self, outbound: Outbound) -> u64 {
        GatewayRoom::add_session(self, outbound)
    }
    fn handle_message(&self, session_id: u64, text: &str) {
        GatewayRoom::handle_message(self, session_id, text)
    }
    fn close_session(&self, session_id: u64) {
        GatewayRoom::close_session(self, session_id)
    }
}

pub async fn chat_ws(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => {
            let room = state.chat_room.clone();
            upgrade.on_upgrade(move |socket| run_room_socket(socket, room))
        }
        None => (StatusCode::OK, UPGRADE_FALLBACK).into_response(),
    }
}

pub async fn gateway_ws(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => {
            let room = state.gateway_room.clone();
            upgrade.on_upgrade(move |socket| run_room_socket(socket, room))
        }
        None => (StatusCode::OK, UPGRADE_FALLBACK).into_response(),
    }
}

async fn run_room_socket<R: FanoutRoom>(socket: WebSocket, room: Arc<R>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut inbox) = mpsc::unbounded_channel::<String>();
    let session_id = room.add_session(outbound);

    let mut send_pump = tokio::spawn(async move {
        while let Some(text) = inbox.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_room = room.clone();
    let mut recv_pump = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => recv_room.handle_message(session_id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_pump => recv_pump.abort(),
        _ = &mut recv_pump => send_pump.abort(),
    }
    room.close_session(session_id);
}

/// 拓扑快照与命令事件的只读推送端点。
pub async fn events_ws(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => {
            let mut events = state.events_tx.subscribe();
            upgrade.on_upgrade(move |socket| async move {
                let (mut sink, mut stream) = socket.split();
                loop {
                    tokio::select! {
                        frame = events.recv() => {
                            match frame {
                                Ok(text) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                // 慢消费者被挤掉队列时继续追新帧
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        inbound = stream.next() => {
                            match inbound {
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                _ => {}
                            }
                        }
                    }
                }
            })
        }
        None => (StatusCode::OK, UPGRADE_FALLBACK).into_response(),
    }
}
