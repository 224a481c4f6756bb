//! Broker 会话
//!
//! 每个 broker 一个 [`MqttSession`]：内部持有 rumqttc 客户端与事件循环任务。
//! 出站 PUBLISH/SUBSCRIBE/UNSUBSCRIBE 以事务跟踪：请求入队时登记等待者，
//! 事件循环按 `Outgoing(pkid)` 顺序与等待者配对，`PubAck/PubComp/SubAck/UnsubAck`
//! 到达时完成事务。QoS 0 发布在出网即完成。
//!
//! 可达性：CONNACK 置真，连接错误置假；事件循环带退避继续轮询（重连由
//! rumqttc 驱动），重连前登记的在途事务保留等待，由各自的有界等待决定结局。

use crate::MqttError;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS, SubscribeReasonCode,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{info, warn};

const EVENT_LOOP_CAPACITY: usize = 64;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const INCOMING_CHANNEL_CAPACITY: usize = 256;

/// 事务终态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Acked,
    Rejected(String),
}

/// 有界等待的结果。`Unknown` 表示超时内未见终态，由调用方自行决断。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Rejected(String),
    Unknown,
}

/// 出站请求的跟踪句柄。
pub struct Transaction {
    rx: oneshot::Receiver<Completion>,
}

impl Transaction {
    fn pair() -> (oneshot::Sender<Completion>, Transaction) {
        let (tx, rx) = oneshot::channel();
        (tx, Transaction { rx })
    }

    /// 构造已带终态的事务（入队失败折叠用，也便于替身实现）。
    pub fn resolved(completion: Completion) -> Transaction {
        let (tx, transaction) = Transaction::pair();
        let _ = tx.send(completion);
        transaction
    }

    fn rejected(reason: String) -> Transaction {
        Transaction::resolved(Completion::Rejected(reason))
    }

    /// 有界等待完成。超时或会话结束返回 `Unknown`。
    pub async fn await_completion(self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(Completion::Acked)) => Outcome::Acked,
            Ok(Ok(Completion::Rejected(reason))) => Outcome::Rejected(reason),
            Ok(Err(_)) | Err(_) => Outcome::Unknown,
        }
    }
}

/// 收到的 broker 发布，向网关房间与遥测链路再广播。
#[derive(Debug, Clone)]
pub struct IncomingPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub packet_id: u16,
}

/// 会话连接参数。
#[derive(Debug, Clone)]
pub struct MqttSessionConfig {
    pub broker_id: String,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub will_retain: bool,
    pub will_qos: u8,
}

struct PendingPublish {
    qos: QoS,
    tx: oneshot::Sender<Completion>,
}

#[derive(Default)]
struct Waiters {
    publish_queue: VecDeque<PendingPublish>,
    publish_inflight: HashMap<u16, oneshot::Sender<Completion>>,
    subscribe_queue: VecDeque<oneshot::Sender<Completion>>,
    subscribe_inflight: HashMap<u16, oneshot::Sender<Completion>>,
    unsubscribe_queue: VecDeque<oneshot::Sender<Completion>>,
    unsubscribe_inflight: HashMap<u16, oneshot::Sender<Completion>>,
}

/// 单 broker 的客户端会话。
pub struct MqttSession {
    broker_id: String,
    client: AsyncClient,
    waiters: Mutex<Waiters>,
    reachable_rx: watch::Receiver<bool>,
    incoming_tx: broadcast::Sender<IncomingPublish>,
    stopping: Arc<AtomicBool>,
}

impl MqttSession {
    /// 建立会话并启动事件循环任务。连接在后台推进，
    /// 调用方用 [`wait_reachable`](Self::wait_reachable) 做有界等待。
    pub fn spawn(config: MqttSessionConfig) -> Arc<MqttSession> {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive.max(5))));
        options.set_clean_session(config.clean_session);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }
        if let Some(topic) = &config.will_topic {
            let payload = config.will_payload.clone().unwrap_or_default();
            options.set_last_will(LastWill::new(
                topic,
                payload,
                qos_from_u8(config.will_qos),
                config.will_retain,
            ));
        }

        let (client, eventloop) = AsyncClient::new(options, EVENT_LOOP_CAPACITY);
        let (reachable_tx, reachable_rx) = watch::channel(false);
        let (incoming_tx, _) = broadcast::channel(INCOMING_CHANNEL_CAPACITY);
        let stopping = Arc::new(AtomicBool::new(false));

        let session = Arc::new(MqttSession {
            broker_id: config.broker_id,
            client,
            waiters: Mutex::new(Waiters::default()),
            reachable_rx,
            incoming_tx: incoming_tx.clone(),
            stopping: stopping.clone(),
        });

        tokio::spawn(run_event_loop(
            session.clone(),
            eventloop,
            reachable_tx,
            stopping,
        ));
        session
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    pub fn is_reachable(&self) -> bool {
        *self.reachable_rx.borrow()
    }

    /// 有界等待首个成功的 CONNACK。
    pub async fn wait_reachable(&self, timeout: Duration) -> bool {
        if self.is_reachable() {
            return true;
        }
        let mut rx = self.reachable_rx.clone();
        let wait = async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    /// 订阅收到的 broker 发布流。
    pub fn subscribe_incoming(&self) -> broadcast::Receiver<IncomingPublish> {
        self.incoming_tx.subscribe()
    }

    /// 可达性观察句柄（连接丢失/恢复时变化）。
    pub fn watch_reachable(&self) -> watch::Receiver<bool> {
        self.reachable_rx.clone()
    }

    /// 发布。入队失败折叠为已拒绝的事务。
    pub fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: u8,
    ) -> Transaction {
        let qos = qos_from_u8(qos);
        let mut waiters = match self.waiters.lock() {
            Ok(waiters) => waiters,
            Err(_) => return Transaction::rejected("session poisoned".to_string()),
        };
        match self.client.try_publish(topic, qos, retain, payload) {
            Ok(()) => {
                let (tx, transaction) = Transaction::pair();
                waiters.publish_queue.push_back(PendingPublish { qos, tx });
                transaction
            }
            Err(err) => Transaction::rejected(err.to_string()),
        }
    }

    /// 订阅主题过滤器。
    pub fn subscribe(&self, filter: &str, qos: u8) -> Transaction {
        let mut waiters = match self.waiters.lock() {
            Ok(waiters) => waiters,
            Err(_) => return Transaction::rejected("session poisoned".to_string()),
        };
        match self.client.try_subscribe(filter, qos_from_u8(qos)) {
            Ok(()) => {
                let (tx, transaction) = Transaction::pair();
                waiters.subscribe_queue.push_back(tx);
                transaction
            }
            Err(err) => Transaction::rejected(err.to_string()),
        }
    }

    /// 退订主题过滤器。
    pub fn unsubscribe(&self, filter: &str) -> Transaction {
        let mut waiters = match self.waiters.lock() {
            Ok(waiters) => waiters,
            Err(_) => return Transaction::rejected("session poisoned".to_string()),
        };
        match self.client.try_unsubscribe(filter) {
            Ok(()) => {
                let (tx, transaction) = Transaction::pair();
                waiters.unsubscribe_queue.push_back(tx);
                transaction
            }
            Err(err) => Transaction::rejected(err.to_string()),
        }
    }

    /// 发 DISCONNECT 并停止事件循环。在途事务按各自的有界等待收尾。
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.stopping.store(true, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|err| MqttError::Client(err.to_string()))
    }
}

async fn run_event_loop(
    session: Arc<MqttSession>,
    mut eventloop: EventLoop,
    reachable_tx: watch::Sender<bool>,
    stopping: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let connected = ack.code == ConnectReturnCode::Success;
                let _ = reachable_tx.send(connected);
                if connected {
                    info!(
                        target: "edge.mqtt",
                        broker_id = %session.broker_id,
                        "broker connected"
                    );
                } else {
                    warn!(
                        target: "edge.mqtt",
                        broker_id = %session.broker_id,
                        code = ?ack.code,
                        "broker refused connection"
                    );
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let _ = session.incoming_tx.send(IncomingPublish {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    packet_id: publish.pkid,
                });
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                resolve_inflight(&session, |waiters| {
                    waiters.publish_inflight.remove(&ack.pkid)
                });
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                resolve_inflight(&session, |waiters| {
                    waiters.publish_inflight.remove(&comp.pkid)
                });
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let granted = ack
                    .return_codes
                    .iter()
                    .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
                if let Ok(mut waiters) = session.waiters.lock() {
                    if let Some(tx) = waiters.subscribe_inflight.remove(&ack.pkid) {
                        let completion = if granted {
                            Completion::Acked
                        } else {
                            Completion::Rejected("subscription refused".to_string())
                        };
                        let _ = tx.send(completion);
                    }
                }
            }
            Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
                resolve_inflight(&session, |waiters| {
                    waiters.unsubscribe_inflight.remove(&ack.pkid)
                });
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                if let Ok(mut waiters) = session.waiters.lock() {
                    if let Some(pending) = waiters.publish_queue.pop_front() {
                        if pending.qos == QoS::AtMostOnce {
                            let _ = pending.tx.send(Completion::Acked);
                        } else {
                            waiters.publish_inflight.insert(pkid, pending.tx);
                        }
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                if let Ok(mut waiters) = session.waiters.lock() {
                    if let Some(tx) = waiters.subscribe_queue.pop_front() {
                        waiters.subscribe_inflight.insert(pkid, tx);
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                if let Ok(mut waiters) = session.waiters.lock() {
                    if let Some(tx) = waiters.unsubscribe_queue.pop_front() {
                        waiters.unsubscribe_inflight.insert(pkid, tx);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                let _ = reachable_tx.send(false);
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                warn!(
                    target: "edge.mqtt",
                    broker_id = %session.broker_id,
                    error = %err,
                    "event loop error, retrying"
                );
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }
}

fn resolve_inflight(
    session: &MqttSession,
    take: impl FnOnce(&mut Waiters) -> Option<oneshot::Sender<Completion>>,
) {
    if let Ok(mut waiters) = session.waiters.lock() {
        if let Some(tx) = take(&mut waiters) {
            let _ = tx.send(Completion::Acked);
        }
    }
}

pub(crate) fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
