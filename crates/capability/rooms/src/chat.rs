//! 聊天室
//!
//! 帐号目录在内存中：同名可被多个会话复用，但必须出示相同口令。
//! 聊天记录按时间排序；离开广播由 worker 在清理扫描时发出。

use api_contract::{ChatEntry, ChatRequest, ChatResponse};
use crate::Outbound;
use edge_telemetry::{record_ws_session_closed, record_ws_session_opened};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

struct ChatSession {
    user_name: String,
    outbound: Outbound,
    open: bool,
}

#[derive(Default)]
struct ChatState {
    sessions: BTreeMap<u64, ChatSession>,
    /// user_name → 口令
    accounts: BTreeMap<String, String>,
    chat_log: Vec<ChatEntry>,
    next_session_id: u64,
    stop: bool,
    sessions_have_closed: bool,
    join_pending: bool,
}

pub struct ChatRoom {
    state: Mutex<ChatState>,
    wake: Notify,
    poll_period: Duration,
}

impl ChatRoom {
    pub fn new(poll_period: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChatState {
                next_session_id: 1,
                ..ChatState::default()
            }),
            wake: Notify::new(),
            poll_period,
        })
    }

    /// 启动 worker。重复调用会再起一个任务，调用方只应启动一次。
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let room = self.clone();
        tokio::spawn(async move { room.worker().await })
    }

    pub fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.stop = true;
        }
        self.wake.notify_one();
    }

    /// 接入新会话，返回分配的会话 id（从 1 起严格递增）。
    pub fn add_session(&self, outbound: Outbound) -> u64 {
        record_ws_session_opened();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.sessions.insert(
            session_id,
            ChatSession {
                user_name: String::new(),
                outbound,
                open: true,
            },
        );
        session_id
    }

    /// 传输断开回调：置 open=false 并唤醒 worker 做清理。
    pub fn close_session(&self, session_id: u64) {
        record_ws_session_closed();
        if let Ok(mut state) = self.state.lock() {
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.open = false;
                state.sessions_have_closed = true;
            }
        }
        self.wake.notify_one();
    }

    /// 处理一条入站文本帧。未知帧忽略。
    pub fn handle_message(&self, session_id: u64, text: &str) {
        let request: ChatRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "edge.rooms", session_id, error = %err, "bad chat frame");
                return;
            }
        };

        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.sessions.contains_key(&session_id) {
            return;
        }

        match request {
            ChatRequest::SetUserName {
                user_name,
                password,
            } => {
                let success = match state.accounts.get(&user_name) {
                    Some(stored) => *stored == password,
                    None => {
                        state.accounts.insert(user_name.clone(), password);
                        true
                    }
                };
                if success {
                    if let Some(session) = state.sessions.get_mut(&session_id) {
                        session.user_name = user_name;
                    }
                }
                send_to(&state, session_id, &ChatResponse::SetUserNameResult { success });
            }
            ChatRequest::GetUserNames => {
                let user_names = user_names_of(&state);
                send_to(&state, session_id, &ChatResponse::UserNames { user_names });
            }
            ChatRequest::PostChat { chat } => {
                let sender = state
                    .sessions
                    .get(&session_id)
                    .map(|session| session.user_name.clone())
                    .unwrap_or_default();
                let entry = ChatEntry {
                    time: now_epoch_ms(),
                    sender: sender.clone(),
                    chat: chat.clone(),
                };
                state.chat_log.push(entry.clone());
                state.chat_log.sort_by(|a, b| a.time.cmp(&b.time));
                broadcast(
                    &state,
                    &ChatResponse::PostChatResult {
                        time: entry.time,
                        sender,
                        chat,
                    },
                );
            }
            ChatRequest::JoinChatRoom => {
                let response = ChatResponse::JoinChatRoomResponse {
                    chat_log: state.chat_log.clone(),
                    user_names: user_names_of(&state),
                };
                send_to(&state, session_id, &response);
                state.join_pending = true;
                drop(state);
                self.wake.notify_one();
            }
        }
    }

    async fn worker(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_period) => {}
            }

            // 锁内摘出待析构会话，放锁后再丢弃
            let mut departed: Vec<ChatSession> = Vec::new();
            {
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if state.stop {
                    break;
                }

                if state.sessions_have_closed {
                    let closed_ids: Vec<u64> = state
                        .sessions
                        .iter()
                        .filter(|(_, session)| !session.open)
                        .map(|(id, _)| *id)
                        .collect();
                    let mut leave_names: Vec<String> = Vec::new();
                    for id in closed_ids {
                        if let Some(session) = state.sessions.remove(&id) {
                            let name = session.user_name.clone();
                            departed.push(session);
                            if !name.is_empty()
                                && !state
                                    .sessions
                                    .values()
                                    .any(|other| other.open && other.user_name == name)
                            {
                                leave_names.push(name);
                            }
                        }
                    }
                    state.sessions_have_closed = false;

                    for user_name in leave_names {
                        broadcast(&state, &ChatResponse::Leave { user_name });
                        broadcast(
                            &state,
                            &ChatResponse::UserNames {
                                user_names: user_names_of(&state),
                            },
                        );
                    }
                }

                if state.join_pending {
                    state.join_pending = false;
                    broadcast(
                        &state,
                        &ChatResponse::UserNames {
                            user_names: user_names_of(&state),
                        },
                    );
                }
            }
            departed.clear();
        }
    }
}

/// 当前开放会话的去重有序用户名集。
fn user_names_of(state: &ChatState) -> Vec<String> {
    let mut names: Vec<String> = state
        .sessions
        .values()
        .filter(|session| session.open && !session.user_name.is_empty())
        .map(|session| session.user_name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn send_to(state: &ChatState, session_id: u64, frame: &ChatResponse) {
    if let Some(session) = state.sessions.get(&session_id) {
        if let Ok(text) = serde_json::to_string(frame) {
            let _ = session.outbound.send(text);
        }
    }
}

fn broadcast(state: &ChatState, frame: &ChatResponse) {
    let Ok(text) = serde_json::to_string(frame) else {
        return;
    };
    for session in state.sessions.values() {
        if session.open {
            let _ = session.outbound.send(text.clone());
        }
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
