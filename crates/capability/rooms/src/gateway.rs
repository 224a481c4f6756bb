//! MQTT 网关房间
//!
//! 房间持有一个面向配置 broker 的 [`MqttSession`]；worker 负责初连、
//! 状态巡检（ping 槽）、SUB/UNSUB 队列与关闭会话清理。broker 掉线时
//! 会话保持开放，恢复可达后继续服务排队中的订阅命令。
//!
//! 入站 broker 发布按每会话的过滤器集合匹配（`+`/`#` 通配符），
//! 命中的会话收到 `{"Id","Type":"Publish","Topic","Payload"}`。

use api_contract::{GatewayRequest, GatewayResponse};
use crate::Outbound;
use edge_mqtt::{matches_filter, IncomingPublish, MqttSession, MqttSessionConfig, Outcome};
use edge_telemetry::{
    record_ws_frame_fanned_out, record_ws_session_closed, record_ws_session_opened,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{info, warn};

/// 网关指向的 broker 连接参数。
#[derive(Debug, Clone)]
pub struct GatewayBrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub qos: u8,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub will_retain: bool,
}

/// 房间运行参数。
#[derive(Debug, Clone)]
pub struct GatewayRoomConfig {
    pub broker: GatewayBrokerSettings,
    pub poll_period: Duration,
    pub ping_period: Duration,
    pub connect_timeout: Duration,
    pub suback_timeout: Duration,
}

enum EndpointCommandKind {
    Subscribe,
    Unsubscribe,
}

struct EndpointCommand {
    kind: EndpointCommandKind,
    session_id: u64,
    topic: String,
    qos: u8,
}

struct GatewaySession {
    outbound: Outbound,
    open: bool,
    topics: Vec<String>,
}

#[derive(Default)]
struct GatewayState {
    sessions: BTreeMap<u64, GatewaySession>,
    next_session_id: u64,
    pending_commands: VecDeque<EndpointCommand>,
    stop: bool,
    sessions_have_closed: bool,
    initial_connect_pending: bool,
    ping: bool,
    mqtt_connected: bool,
    mqtt: Option<Arc<MqttSession>>,
}

pub struct GatewayRoom {
    state: Mutex<GatewayState>,
    wake: Notify,
    config: GatewayRoomConfig,
}

impl GatewayRoom {
    pub fn new(config: GatewayRoomConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GatewayState {
                next_session_id: 1,
                initial_connect_pending: true,
                ..GatewayState::default()
            }),
            wake: Notify::new(),
            config,
        })
    }

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
            GatewaySession {
                outbound,
                open: true,
                topics: Vec::new(),
            },
        );
        session_id
    }

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

    /// 处理一条入站文本帧。
    pub fn handle_message(&self, session_id: u64, text: &str) {
        let request: GatewayRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "edge.rooms", session_id, error = %err, "bad gateway frame");
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
            GatewayRequest::JoinServer => {
                let subscription: Vec<String> = if state.mqtt_connected {
                    state
                        .sessions
                        .values()
                        .flat_map(|session| session.topics.iter().cloned())
                        .collect()
                } else {
                    Vec::new()
                };
                let response = GatewayResponse::JoinChatRoomResponse {
                    success: true,
                    mqtt_status: if state.mqtt_connected {
                        "Connected".to_string()
                    } else {
                        "Disconnected".to_string()
                    },
                    subscription,
                };
                send_to(&state, session_id, &response);
                state.ping = true;
                drop(state);
                self.wake.notify_one();
            }
            GatewayRequest::Subscribe { topic, qo_s } => {
                state.pending_commands.push_back(EndpointCommand {
                    kind: EndpointCommandKind::Subscribe,
                    session_id,
                    topic,
                    qos: qo_s.unwrap_or(1),
                });
                drop(state);
                self.wake.notify_one();
            }
            GatewayRequest::UnSubscribe { topic, qo_s } => {
                state.pending_commands.push_back(EndpointCommand {
                    kind: EndpointCommandKind::Unsubscribe,
                    session_id,
                    topic,
                    qos: qo_s.unwrap_or(1),
                });
                drop(state);
                self.wake.notify_one();
            }
        }
    }

    /// 入站 broker 发布的扇出：命中过滤器的会话逐一转发。
    pub fn fan_out_publish(&self, publish: &IncomingPublish) {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let frame = GatewayResponse::Publish {
            id: publish.packet_id,
            topic: publish.topic.clone(),
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
        };
        let Ok(text) = serde_json::to_string(&frame) else {
            return;
        };
        for session in state.sessions.values() {
            if !session.open {
                continue;
            }
            let matched = session
                .topics
                .iter()
                .any(|filter| matches_filter(filter, &publish.topic));
            if matched {
                record_ws_frame_fanned_out();
                let _ = session.outbound.send(text.clone());
            }
        }
    }

    async fn worker(self: Arc<Self>) {
        let mut last_ping = Instant::now();
        loop {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.config.poll_period) => {}
            }
            if last_ping.elapsed() >= self.config.ping_period {
                if let Ok(mut state) = self.state.lock() {
                    state.ping = true;
                }
            }

            // 固定顺序：stop → 初连 → ping → SUB/UNSUB 队列 → 关闭清理
            let stop_session = {
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if state.stop { state.mqtt.take() } else { None }
            };
            if let Some(session) = stop_session {
                if let Err(err) = session.disconnect().await {
                    warn!(target: "edge.rooms", error = %err, "gateway broker teardown failed");
                }
                break;
            }
            {
                let state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if state.stop {
                    break;
                }
            }

            self.drive_initial_connect().await;

            {
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if state.ping {
                    state.ping = false;
                    last_ping = Instant::now();
                    info!(
                        target: "edge.rooms",
                        connected = state.mqtt_connected,
                        sessions = state.sessions.len(),
                        "gateway status"
                    );
                }
            }

            self.service_one_pending_command().await;
            self.sweep_closed_sessions();
        }
    }

    /// 初连：仅在尚无会话时建立；掉线重连由会话自身的事件循环推进。
    async fn drive_initial_connect(self: &Arc<Self>) {
        let should_connect = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.initial_connect_pending && state.mqtt.is_none() {
                state.initial_connect_pending = false;
                true
            } else {
                false
            }
        };
        if !should_connect {
            return;
        }

        let broker = &self.config.broker;
        let session = MqttSession::spawn(MqttSessionConfig {
            broker_id: "ws-gateway".to_string(),
            host: broker.host.clone(),
            port: broker.port,
            client_id: broker.client_id.clone(),
            username: broker.username.clone(),
            password: broker.password.clone(),
            clean_session: broker.clean_session,
            keep_alive: broker.keep_alive,
            will_topic: broker.will_topic.clone(),
            will_payload: broker.will_payload.clone(),
            will_retain: broker.will_retain,
            will_qos: broker.qos,
        });
        let connected = session.wait_reachable(self.config.connect_timeout).await;
        if connected {
            info!(target: "edge.rooms", "gateway broker connected");
        } else {
            warn!(target: "edge.rooms", "gateway broker connection not confirmed in time");
        }

        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.mqtt_connected = connected;
            state.mqtt = Some(session.clone());
        }

        // 可达性变化回写房间状态并唤醒 worker
        let room = Arc::clone(self);
        let mut reachable = session.watch_reachable();
        tokio::spawn(async move {
            while reachable.changed().await.is_ok() {
                let connected = *reachable.borrow();
                if let Ok(mut state) = room.state.lock() {
                    state.mqtt_connected = connected;
                }
                room.wake.notify_one();
            }
        });

        // 入站发布转发任务
        let room = Arc::clone(self);
        let mut incoming = session.subscribe_incoming();
        tokio::spawn(async move {
            while let Ok(publish) = incoming.recv().await {
                room.fan_out_publish(&publish);
            }
        });
    }

    /// 每次醒来服务一条排队命令；还有剩余时自行再唤醒。
    async fn service_one_pending_command(&self) {
        let (command, session, more) = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !state.mqtt_connected {
                return;
            }
            let Some(mqtt) = state.mqtt.clone() else {
                return;
            };
            let Some(command) = state.pending_commands.pop_front() else {
                return;
            };
            let more = !state.pending_commands.is_empty();
            (command, mqtt, more)
        };

        match command.kind {
            EndpointCommandKind::Subscribe => {
                let transaction = session.subscribe(&command.topic, command.qos);
                let outcome = transaction.await_completion(self.config.suback_timeout).await;
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let (status, message) = match outcome {
                    Outcome::Acked => ("Success", None),
                    Outcome::Rejected(reason) => ("Error", Some(reason)),
                    Outcome::Unknown => ("Error", Some("no suback within bound".to_string())),
                };
                if status == "Success" {
                    if let Some(entry) = state.sessions.get_mut(&command.session_id) {
                        entry.topics.push(command.topic.clone());
                    }
                }
                send_to(
                    &state,
                    command.session_id,
                    &GatewayResponse::SubscribeResult {
                        topic: command.topic,
                        status: status.to_string(),
                        message,
                    },
                );
            }
            EndpointCommandKind::Unsubscribe => {
                let transaction = session.unsubscribe(&command.topic);
                let outcome = transaction.await_completion(self.config.suback_timeout).await;
                let mut state = match self.state.lock() {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let (status, message) = match outcome {
                    Outcome::Acked => ("Success", None),
                    Outcome::Rejected(reason) => ("Error", Some(reason)),
                    Outcome::Unknown => ("Error", Some("no unsuback within bound".to_string())),
                };
                if status == "Success" {
                    if let Some(entry) = state.sessions.get_mut(&command.session_id) {
                        entry.topics.retain(|topic| topic != &command.topic);
                    }
                }
                send_to(
                    &state,
                    command.session_id,
                    &GatewayResponse::UnSubscribeResult {
                        topic: command.topic,
                        status: status.to_string(),
                        message,
                    },
                );
            }
        }

        if more {
            self.wake.notify_one();
        }
    }

    fn sweep_closed_sessions(&self) {
        let mut departed: Vec<GatewaySession> = Vec::new();
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !state.sessions_have_closed {
                return;
            }
            let closed_ids: Vec<u64> = state
                .sessions
                .iter()
                .filter(|(_, session)| !session.open)
                .map(|(id, _)| *id)
                .collect();
            for id in closed_ids {
                if let Some(session) = state.sessions.remove(&id) {
                    departed.push(session);
                }
            }
            state.sessions_have_closed = false;
        }
        // 锁外析构
        departed.clear();
    }
}

fn send_to(state: &GatewayState, session_id: u64, frame: &GatewayResponse) {
    if let Some(session) = state.sessions.get(&session_id) {
        if let Ok(text) = serde_json::to_string(frame) {
            let _ = session.outbound.send(text);
        }
    }
}
