//! 设备管理器
//!
//! 编排存储、注册表与 broker 会话：
//!
//! - `reload_all`：清空注册表与会话表，重新加载全部拓扑，
//!   为每台启用的 MQTT 服务器建立会话（有界等待 CONNACK）
//! - `sync_all_mqtt_devices`：对每台启用的 MQTT 设备做订阅对账
//! - `publish_to_broker`：仅当目标 broker 会话存在且可达时发布
//!
//! 加载是尽力而为的：基础设施错误记录诊断后继续，缺失的 broker
//! 会话只是让对应设备被跳过。

use crate::registry::DeviceRegistry;
use domain::{Event, EventSeverity, EventSource, Server};
use edge_mqtt::{MqttDeviceConnector, MqttSession, MqttSessionConfig, Transaction};
use edge_storage::{
    DeviceStore, EventStore, ServerStore, SiteStore, StorageError, TopicStore, ZoneStore,
};
use edge_telemetry::{
    record_broker_connect, record_broker_connect_failure, record_fleet_reload,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 会话建立与订阅对账的有界等待。
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub connect_timeout: Duration,
    pub suback_timeout: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(100),
            suback_timeout: Duration::from_millis(30),
        }
    }
}

pub struct DeviceManager {
    sites: Arc<dyn SiteStore>,
    zones: Arc<dyn ZoneStore>,
    servers: Arc<dyn ServerStore>,
    devices: Arc<dyn DeviceStore>,
    topics: Arc<dyn TopicStore>,
    events: Arc<dyn EventStore>,
    registry: RwLock<DeviceRegistry>,
    connectors: Mutex<HashMap<String, MqttDeviceConnector>>,
    config: FleetConfig,
}

impl DeviceManager {
    pub fn new(
        sites: Arc<dyn SiteStore>,
        zones: Arc<dyn ZoneStore>,
        servers: Arc<dyn ServerStore>,
        devices: Arc<dyn DeviceStore>,
        topics: Arc<dyn TopicStore>,
        events: Arc<dyn EventStore>,
        config: FleetConfig,
    ) -> Self {
        Self {
            sites,
            zones,
            servers,
            devices,
            topics,
            events,
            registry: RwLock::new(DeviceRegistry::new()),
            connectors: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// 注册表快照（独立副本）。
    pub fn snapshot(&self) -> DeviceRegistry {
        self.registry
            .read()
            .map(|registry| registry.clone())
            .unwrap_or_default()
    }

    pub fn get_device(&self, id: &str) -> Option<domain::Device> {
        self.registry.read().ok().and_then(|r| r.get_device(id))
    }

    pub fn topics_for_device(&self, device_id: &str) -> Vec<domain::MqttTopic> {
        self.registry
            .read()
            .map(|r| r.topics_for_device(device_id))
            .unwrap_or_default()
    }

    /// 全量重载：清空注册表与会话表，重新加载并重建 broker 会话。
    pub async fn reload_all(&self) {
        record_fleet_reload();

        // 先拆旧会话，再清注册表
        {
            let mut connectors = self.connectors.lock().await;
            for (server_id, connector) in connectors.drain() {
                if let Err(err) = connector.session().disconnect().await {
                    warn!(
                        target: "edge.fleet",
                        server_id = %server_id,
                        error = %err,
                        "session teardown failed"
                    );
                }
            }
        }
        if let Ok(mut registry) = self.registry.write() {
            registry.clear();
        }

        let sites = load_or_empty(self.sites.find_all().await, "sites");
        let zones = load_or_empty(self.zones.find_all().await, "zones");
        let servers = load_or_empty(self.servers.find_all().await, "servers");
        let devices = load_or_empty(self.devices.find_all().await, "devices");
        let topics = load_or_empty(self.topics.find_all().await, "topics");

        let mut by_device: BTreeMap<String, Vec<domain::MqttTopic>> = BTreeMap::new();
        for topic in topics {
            by_device.entry(topic.device_id.clone()).or_default().push(topic);
        }

        if let Ok(mut registry) = self.registry.write() {
            for site in sites {
                registry.upsert_site(site);
            }
            for zone in zones {
                registry.upsert_zone(zone);
            }
            for server in &servers {
                registry.upsert_server(server.clone());
            }
            for device in devices {
                registry.upsert_device(device);
            }
            for (device_id, topics) in by_device {
                registry.set_topics_for_device(&device_id, topics);
            }
        }

        self.build_broker_sessions(&servers).await;
    }

    async fn build_broker_sessions(&self, servers: &[Server]) {
        let mut connectors = self.connectors.lock().await;
        for server in servers {
            if !server.enabled {
                continue;
            }
            let Some(detail) = server.mqtt_detail() else {
                continue;
            };

            let session = MqttSession::spawn(MqttSessionConfig {
                broker_id: server.id.clone(),
                host: server.host.clone(),
                port: server.port,
                client_id: format!("edge-fleet-{}", server.id),
                username: non_empty(&detail.user_name),
                password: non_empty(&detail.password),
                clean_session: detail.clean_session,
                keep_alive: detail.keep_alive,
                will_topic: non_empty(&detail.will_topic),
                will_payload: non_empty(&detail.will_payload),
                will_retain: detail.will_retain,
                will_qos: detail.qos,
            });

            if session.wait_reachable(self.config.connect_timeout).await {
                record_broker_connect();
                info!(
                    target: "edge.fleet",
                    server_id = %server.id,
                    host = %server.host,
                    "broker connection established"
                );
                self.record_broker_event(server, "broker.connected", EventSeverity::Info)
                    .await;
            } else {
                record_broker_connect_failure();
                warn!(
                    target: "edge.fleet",
                    server_id = %server.id,
                    host = %server.host,
                    "broker connection not confirmed in time"
                );
                self.record_broker_event(server, "broker.connect_failed", EventSeverity::Warning)
                    .await;
            }

            // 连接未确认也保留会话：事件循环继续重连，下次对账生效
            connectors.insert(
                server.id.clone(),
                MqttDeviceConnector::new(session, self.config.suback_timeout),
            );
        }
    }

    async fn record_broker_event(&self, server: &Server, event_type: &str, severity: EventSeverity) {
        let event = Event {
            id: domain::new_id(),
            ts_ms: now_epoch_ms(),
            source: EventSource::System,
            event_type: event_type.to_string(),
            severity,
            site_id: server.site_id().unwrap_or_default().to_string(),
            zone_id: String::new(),
            device_id: String::new(),
            correlation_id: server.id.clone(),
            payload: json!({ "server_id": server.id, "host": server.host }),
        };
        if let Err(err) = self.events.insert(event).await {
            warn!(target: "edge.fleet", error = %err, "event insert failed");
        }
    }

    /// 对每台启用的 MQTT 设备做订阅对账。没有对应 broker 会话的设备跳过。
    pub async fn sync_all_mqtt_devices(&self) {
        let devices = {
            let Ok(registry) = self.registry.read() else {
                return;
            };
            registry.all_mqtt_devices()
        };
        let mut connectors = self.connectors.lock().await;
        for device in devices {
            if !device.enabled {
                continue;
            }
            let Some(connector) = connectors.get_mut(&device.server_id) else {
                continue;
            };
            let topics = self.topics_for_device(&device.id);
            connector.sync_device(&device, &topics).await;
        }
    }

    /// 解析目标服务器为 MQTT broker 并发布。
    ///
    /// broker 会话存在且可达才返回事务，否则返回 None。
    pub async fn publish_to_broker(
        &self,
        server_id: &str,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: u8,
    ) -> Option<Transaction> {
        let connectors = self.connectors.lock().await;
        let connector = connectors.get(server_id)?;
        let session = connector.session();
        if !session.is_reachable() {
            return None;
        }
        Some(session.publish(topic, payload, retain, qos))
    }

    /// 当前持有会话的 broker 数（诊断用）。
    pub async fn broker_session_count(&self) -> usize {
        self.connectors.lock().await.len()
    }
}

fn load_or_empty<T>(result: Result<Vec<T>, StorageError>, what: &str) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(err) => {
            warn!(target: "edge.fleet", error = %err, "failed to load {what}, keeping empty");
            Vec::new()
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
