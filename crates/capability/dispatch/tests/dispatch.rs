use domain::{CommandStatus, Device, MqttTopic, Site, Zone};
use edge_dispatch::{CommandDispatcher, DeviceFleet, DispatchConfig};
use edge_fleet::{DeviceManager, FleetConfig};
use edge_mqtt::{Completion, Transaction};
use edge_storage::{
    CommandStore, DeviceStore, InMemoryCommandStore, InMemoryDeviceStore, InMemoryEventStore,
    InMemoryServerStore, InMemorySiteStore, InMemoryTopicStore, InMemoryZoneStore, SiteStore,
    TopicStore, ZoneStore,
};
use serde_json::json;
use std::sync::Arc;

struct Fixture {
    commands: Arc<InMemoryCommandStore>,
    events: Arc<InMemoryEventStore>,
    manager: Arc<DeviceManager>,
}

async fn fixture() -> Fixture {
    let sites = Arc::new(InMemorySiteStore::new());
    let zones = Arc::new(InMemoryZoneStore::new());
    let servers = Arc::new(InMemoryServerStore::new());
    let devices = Arc::new(InMemoryDeviceStore::new());
    let topics = Arc::new(InMemoryTopicStore::new());
    let events = Arc::new(InMemoryEventStore::new());

    sites
        .insert(Site {
            id: "site-1".to_string(),
            name: "Plant A".to_string(),
            ..Site::default()
        })
        .await
        .expect("site");
    zones
        .insert(Zone {
            id: "zone-1".to_string(),
            site_id: "site-1".to_string(),
            name: "Hall".to_string(),
            ..Zone::default()
        })
        .await
        .expect("zone");
    devices
        .insert(Device {
            id: "dev-mqtt".to_string(),
            server_id: "srv-1".to_string(),
            site_id: "site-1".to_string(),
            zone_id: "zone-1".to_string(),
            name: "sensor".to_string(),
            protocol: "mqtt".to_string(),
            enabled: true,
            ..Device::default()
        })
        .await
        .expect("device");
    devices
        .insert(Device {
            id: "dev-modbus".to_string(),
            server_id: "srv-2".to_string(),
            site_id: "site-1".to_string(),
            zone_id: "zone-1".to_string(),
            name: "plc".to_string(),
            protocol: "modbus-tcp".to_string(),
            enabled: true,
            ..Device::default()
        })
        .await
        .expect("device");
    topics
        .insert(MqttTopic {
            id: "tp-cmd".to_string(),
            device_id: "dev-mqtt".to_string(),
            role: "command".to_string(),
            topic: "reboot".to_string(),
            direction: "pub".to_string(),
            qos: 1,
            enabled: true,
            ..MqttTopic::default()
        })
        .await
        .expect("topic");

    let manager = Arc::new(DeviceManager::new(
        sites,
        zones,
        servers,
        devices,
        topics,
        events.clone(),
        FleetConfig::default(),
    ));
    manager.reload_all().await;

    Fixture {
        commands: Arc::new(InMemoryCommandStore::new()),
        events,
        manager,
    }
}

fn dispatcher(fixture: &Fixture) -> CommandDispatcher {
    CommandDispatcher::new(
        fixture.commands.clone(),
        fixture.events.clone(),
        fixture.manager.clone(),
        None,
        DispatchConfig::default(),
    )
}

#[tokio::test]
async fn unknown_device_fails_with_device_not_found() {
    let fixture = fixture().await;
    let command = fixture
        .commands
        .insert_pending("no-such-device", "reboot", json!({}))
        .await
        .expect("insert");

    dispatcher(&fixture).dispatch_pending(10).await.expect("dispatch");

    let loaded = fixture
        .commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("device_not_found"));
}

#[tokio::test]
async fn non_mqtt_device_fails_with_not_mqtt_device() {
    let fixture = fixture().await;
    let command = fixture
        .commands
        .insert_pending("dev-modbus", "reboot", json!({}))
        .await
        .expect("insert");

    dispatcher(&fixture).dispatch_pending(10).await.expect("dispatch");

    let loaded = fixture
        .commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("not_mqtt_device"));
}

#[tokio::test]
async fn missing_command_topic_fails_with_no_command_topic() {
    let fixture = fixture().await;
    let command = fixture
        .commands
        .insert_pending("dev-mqtt", "self-destruct", json!({}))
        .await
        .expect("insert");

    dispatcher(&fixture).dispatch_pending(10).await.expect("dispatch");

    let loaded = fixture
        .commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("no_command_topic"));
}

#[tokio::test]
async fn unreachable_broker_leaves_command_pending() {
    let fixture = fixture().await;
    let command = fixture
        .commands
        .insert_pending("dev-mqtt", "reboot", json!({}))
        .await
        .expect("insert");

    // srv-1 没有会话：命令保持 pending，等待下一轮
    dispatcher(&fixture).dispatch_pending(10).await.expect("dispatch");

    let loaded = fixture
        .commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Pending);
}

#[tokio::test]
async fn failures_are_recorded_as_events() {
    let fixture = fixture().await;
    fixture
        .commands
        .insert_pending("no-such-device", "reboot", json!({}))
        .await
        .expect("insert");

    dispatcher(&fixture).dispatch_pending(10).await.expect("dispatch");

    use edge_storage::EventStore;
    let events = fixture.events.list_recent(10).await.expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "command.dispatch_failed");
}

fn mqtt_device() -> Device {
    Device {
        id: "dev-mqtt".to_string(),
        server_id: "srv-1".to_string(),
        site_id: "site-1".to_string(),
        zone_id: "zone-1".to_string(),
        name: "sensor".to_string(),
        protocol: "mqtt".to_string(),
        enabled: true,
        ..Device::default()
    }
}

fn command_topic() -> MqttTopic {
    MqttTopic {
        id: "tp-cmd".to_string(),
        device_id: "dev-mqtt".to_string(),
        role: "command".to_string(),
        topic: "reboot".to_string(),
        direction: "pub".to_string(),
        qos: 1,
        enabled: true,
        ..MqttTopic::default()
    }
}

/// broker 总是拒绝发布的机群替身。
struct RejectingFleet {
    device: Device,
    topics: Vec<MqttTopic>,
}

#[async_trait::async_trait]
impl DeviceFleet for RejectingFleet {
    fn get_device(&self, id: &str) -> Option<Device> {
        (self.device.id == id).then(|| self.device.clone())
    }

    fn topics_for_device(&self, device_id: &str) -> Vec<MqttTopic> {
        if self.device.id == device_id {
            self.topics.clone()
        } else {
            Vec::new()
        }
    }

    async fn publish_to_broker(
        &self,
        _server_id: &str,
        _topic: &str,
        _payload: Vec<u8>,
        _retain: bool,
        _qos: u8,
    ) -> Option<Transaction> {
        Some(Transaction::resolved(Completion::Rejected(
            "connection reset by broker".to_string(),
        )))
    }
}

#[tokio::test]
async fn rejected_publish_fails_with_the_broker_error_literal() {
    let commands = Arc::new(InMemoryCommandStore::new());
    let events = Arc::new(InMemoryEventStore::new());
    let fleet = Arc::new(RejectingFleet {
        device: mqtt_device(),
        topics: vec![command_topic()],
    });
    let (events_tx, mut frames) = tokio::sync::broadcast::channel::<String>(16);
    let dispatcher = CommandDispatcher::new(
        commands.clone(),
        events.clone(),
        fleet,
        Some(events_tx),
        DispatchConfig::default(),
    );

    let command = commands
        .insert_pending("dev-mqtt", "reboot", json!({}))
        .await
        .expect("insert");
    dispatcher.dispatch_pending(10).await.expect("dispatch");

    let loaded = commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("publish_failed_shunkedPacket"));

    // 先 command.sent 再 command.failed，两帧携带行的最新状态
    let first: serde_json::Value =
        serde_json::from_str(&frames.recv().await.expect("frame")).expect("json");
    assert_eq!(first["type"], "command.sent");
    assert_eq!(first["command"]["status"], "sent");
    let second: serde_json::Value =
        serde_json::from_str(&frames.recv().await.expect("frame")).expect("json");
    assert_eq!(second["type"], "command.failed");
    assert_eq!(second["command"]["error"], "publish_failed_shunkedPacket");

    use edge_storage::EventStore;
    let recorded = events.list_recent(10).await.expect("events");
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].event_type, "command.dispatch_failed");
    assert_eq!(recorded[0].payload["detail"], "connection reset by broker");
}

#[tokio::test]
async fn sweep_promotes_due_retries_back_to_pending() {
    let fixture = fixture().await;
    let command = fixture
        .commands
        .insert_pending("dev-mqtt", "reboot", json!({}))
        .await
        .expect("insert");
    fixture.commands.mark_sent(&command.id).await.expect("sent");
    fixture
        .commands
        .schedule_retry(&command.id, 1, 0, "publish_timeout")
        .await
        .expect("retry");

    // delay 0 → 立即到期；sweep 回迁后 broker 仍不可达 → 重新 pending
    dispatcher(&fixture).sweep().await;

    let loaded = fixture
        .commands
        .find_by_id(&command.id)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(loaded.status, CommandStatus::Pending);
    assert_eq!(loaded.attempts, 1);
}
