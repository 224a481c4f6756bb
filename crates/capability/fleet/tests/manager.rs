use domain::{Device, MqttTopic, Site, Zone};
use edge_fleet::{DeviceManager, FleetConfig};
use edge_storage::{
    DeviceStore, InMemoryDeviceStore, InMemoryEventStore, InMemoryServerStore, InMemorySiteStore,
    InMemoryTopicStore, InMemoryZoneStore, SiteStore, TopicStore, ZoneStore,
};
use std::sync::Arc;

async fn seeded_manager() -> Arc<DeviceManager> {
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
            id: "dev-1".to_string(),
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
    topics
        .insert(MqttTopic {
            id: "tp-1".to_string(),
            device_id: "dev-1".to_string(),
            role: "command".to_string(),
            topic: "reboot".to_string(),
            direction: "pub".to_string(),
            enabled: true,
            ..MqttTopic::default()
        })
        .await
        .expect("topic");

    Arc::new(DeviceManager::new(
        sites,
        zones,
        servers,
        devices,
        topics,
        events,
        FleetConfig::default(),
    ))
}

#[tokio::test]
async fn reload_populates_registry_and_groups_topics() {
    let manager = seeded_manager().await;
    manager.reload_all().await;

    let device = manager.get_device("dev-1").expect("device");
    assert_eq!(device.protocol, "mqtt");
    let topics = manager.topics_for_device("dev-1");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].role, "command");

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.all_sites().len(), 1);
    assert_eq!(snapshot.all_mqtt_devices().len(), 1);
}

#[tokio::test]
async fn reload_is_idempotent_for_unchanged_rows() {
    let manager = seeded_manager().await;
    manager.reload_all().await;
    let first = manager.snapshot();
    manager.reload_all().await;
    let second = manager.snapshot();
    assert_eq!(first.all_devices(), second.all_devices());
    assert_eq!(
        first.topics_for_device("dev-1"),
        second.topics_for_device("dev-1")
    );
}

#[tokio::test]
async fn publish_without_broker_session_returns_none() {
    let manager = seeded_manager().await;
    manager.reload_all().await;
    // srv-1 不在 servers 表中：没有会话，发布被拒绝
    let transaction = manager
        .publish_to_broker("srv-1", "reboot", b"{}".to_vec(), false, 1)
        .await;
    assert!(transaction.is_none());
    assert_eq!(manager.broker_session_count().await, 0);
}
