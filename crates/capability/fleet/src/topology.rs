//! 拓扑快照
//!
//! 由注册表物化层级视图：站点 →（服务器 by metadata.site_id，区域 by site_id）
//! → 设备 by zone_id → 主题。渲染为
//! `{"type":"topologie.update","sites":{…},"ts":<epoch-seconds>}` 文本帧。
//!
//! 注册表使用有序映射，同一份数据两次物化渲染出逐字节相同的帧。

use crate::manager::DeviceManager;
use crate::registry::DeviceRegistry;
use domain::{Device, MqttTopic, Server, Site, Zone};
use edge_storage::ChangeStream;
use edge_telemetry::record_topology_snapshot;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct DeviceNode {
    pub device: Device,
    pub topics: Vec<MqttTopic>,
}

pub struct ZoneNode {
    pub zone: Zone,
    pub devices: Vec<DeviceNode>,
}

pub struct SiteNode {
    pub site: Site,
    pub servers: Vec<Server>,
    pub zones: Vec<ZoneNode>,
}

/// 物化后的层级快照。
#[derive(Default)]
pub struct TopologyGraph {
    sites: Vec<SiteNode>,
}

impl TopologyGraph {
    /// 从注册表快照物化层级。
    pub fn from_registry(registry: &DeviceRegistry) -> Self {
        let mut sites = Vec::new();
        for site in registry.all_sites() {
            let servers: Vec<Server> = registry
                .all_servers()
                .into_iter()
                .filter(|server| server.site_id() == Some(site.id.as_str()))
                .collect();

            let mut zones = Vec::new();
            for zone in registry.all_zones() {
                if zone.site_id != site.id {
                    continue;
                }
                let devices: Vec<DeviceNode> = registry
                    .all_devices()
                    .into_iter()
                    .filter(|device| device.zone_id == zone.id)
                    .map(|device| {
                        let topics = registry.topics_for_device(&device.id);
                        DeviceNode { device, topics }
                    })
                    .collect();
                zones.push(ZoneNode { zone, devices });
            }
            sites.push(SiteNode {
                site,
                servers,
                zones,
            });
        }
        Self { sites }
    }

    pub fn sites(&self) -> &[SiteNode] {
        &self.sites
    }

    /// 渲染 `sites` 对象。凭据字段不进快照。
    pub fn render_sites(&self) -> Value {
        let mut sites = Map::new();
        for site_node in &self.sites {
            let mut site_obj = to_object(&site_node.site);

            let mut servers = Map::new();
            for server in &site_node.servers {
                let mut server_obj = to_object(server);
                server_obj.remove("password");
                servers.insert(server.id.clone(), Value::Object(server_obj));
            }
            site_obj.insert("servers".to_string(), Value::Object(servers));

            let mut zones = Map::new();
            for zone_node in &site_node.zones {
                let mut zone_obj = to_object(&zone_node.zone);
                let mut devices = Map::new();
                for device_node in &zone_node.devices {
                    let mut device_obj = to_object(&device_node.device);
                    let topics: Vec<Value> = device_node
                        .topics
                        .iter()
                        .map(|topic| serde_json::to_value(topic).unwrap_or(Value::Null))
                        .collect();
                    device_obj.insert("topics".to_string(), Value::Array(topics));
                    devices.insert(device_node.device.id.clone(), Value::Object(device_obj));
                }
                zone_obj.insert("devices".to_string(), Value::Object(devices));
                zones.insert(zone_node.zone.id.clone(), Value::Object(zone_obj));
            }
            site_obj.insert("zones".to_string(), Value::Object(zones));

            sites.insert(site_node.site.id.clone(), Value::Object(site_obj));
        }
        Value::Object(sites)
    }

    /// 渲染完整快照帧。
    pub fn render_frame(&self, ts_epoch_seconds: f64) -> Value {
        json!({
            "type": "topologie.update",
            "sites": self.render_sites(),
            "ts": ts_epoch_seconds,
        })
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    }
}

/// 无通知流（内存模式）时的兜底重载周期。
const FALLBACK_RELOAD_PERIOD: Duration = Duration::from_secs(30);

/// 拓扑更新器：监听 `iot_changes`，重载拓扑并广播快照帧。
pub struct TopologyUpdater {
    manager: Arc<DeviceManager>,
    broadcaster: broadcast::Sender<String>,
}

impl TopologyUpdater {
    pub fn new(manager: Arc<DeviceManager>, broadcaster: broadcast::Sender<String>) -> Self {
        Self {
            manager,
            broadcaster,
        }
    }

    /// 重载 + 对账 + 物化 + 广播。消费者要么看到旧快照要么看到新快照。
    pub async fn reload_and_broadcast(&self) {
        self.manager.reload_all().await;
        self.manager.sync_all_mqtt_devices().await;

        let graph = TopologyGraph::from_registry(&self.manager.snapshot());
        let frame = graph.render_frame(now_epoch_seconds());
        match serde_json::to_string(&frame) {
            Ok(text) => {
                record_topology_snapshot();
                // 没有订阅者时发送失败，属正常情况
                let _ = self.broadcaster.send(text);
                info!(
                    target: "edge.fleet",
                    sites = graph.sites().len(),
                    "topology snapshot published"
                );
            }
            Err(err) => {
                warn!(target: "edge.fleet", error = %err, "snapshot encode failed");
            }
        }
    }

    /// 先做一次初始重载，然后逐条消费变更通知。
    pub async fn run(self: Arc<Self>, changes: Option<ChangeStream>) {
        self.reload_and_broadcast().await;
        match changes {
            Some(mut stream) => loop {
                stream.next().await;
                self.reload_and_broadcast().await;
            },
            None => loop {
                tokio::time::sleep(FALLBACK_RELOAD_PERIOD).await;
                self.reload_and_broadcast().await;
            },
        }
    }
}

fn now_epoch_seconds() -> f64 {
    let now = std::time::SystemTime::now();
    now.duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or_default()
}
