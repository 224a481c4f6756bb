use domain::{Device, MqttBrokerDetail, MqttTopic, Server, ServerDetail, Site, Zone};
use edge_fleet::{DeviceRegistry, TopologyGraph};
use serde_json::json;

fn fixed_registry() -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();
    registry.upsert_site(Site {
        id: "site-1".to_string(),
        name: "Plant A".to_string(),
        timezone: "Europe/Paris".to_string(),
        created_at_ms: 100,
        updated_at_ms: 100,
        ..Site::default()
    });
    registry.upsert_zone(Zone {
        id: "zone-1".to_string(),
        site_id: "site-1".to_string(),
        name: "Hall".to_string(),
        created_at_ms: 100,
        updated_at_ms: 100,
        ..Zone::default()
    });
    registry.upsert_server(Server {
        id: "srv-1".to_string(),
        name: "broker".to_string(),
        host: "localhost".to_string(),
        port: 1883,
        enabled: true,
        use_tls: false,
        tags: Vec::new(),
        metadata: json!({ "site_id": "site-1" }),
        created_at_ms: 100,
        updated_at_ms: 100,
        detail: ServerDetail::Mqtt(MqttBrokerDetail {
            user_name: "edge".to_string(),
            password: "secret".to_string(),
            ..MqttBrokerDetail::default()
        }),
    });
    registry.upsert_device(Device {
        id: "dev-1".to_string(),
        server_id: "srv-1".to_string(),
        site_id: "site-1".to_string(),
        zone_id: "zone-1".to_string(),
        name: "sensor".to_string(),
        protocol: "mqtt".to_string(),
        enabled: true,
        created_at_ms: 100,
        updated_at_ms: 100,
        ..Device::default()
    });
    registry.set_topics_for_device(
        "dev-1",
        vec![MqttTopic {
            id: "tp-1".to_string(),
            device_id: "dev-1".to_string(),
            role: "telemetry".to_string(),
            topic: "plant-a/hall/sensor/temp".to_string(),
            direction: "sub".to_string(),
            enabled: true,
            created_at_ms: 100,
            updated_at_ms: 100,
            ..MqttTopic::default()
        }],
    );
    registry
}

#[test]
fn snapshot_follows_site_zone_device_topic_hierarchy() {
    let registry = fixed_registry();
    let graph = TopologyGraph::from_registry(&registry);
    let frame = graph.render_frame(1_700_000_000.0);

    assert_eq!(frame["type"], "topologie.update");
    let site = &frame["sites"]["site-1"];
    assert_eq!(site["name"], "Plant A");
    assert_eq!(site["servers"]["srv-1"]["host"], "localhost");
    let zone = &site["zones"]["zone-1"];
    assert_eq!(zone["name"], "Hall");
    let device = &zone["devices"]["dev-1"];
    assert_eq!(device["protocol"], "mqtt");
    assert_eq!(device["topics"][0]["topic"], "plant-a/hall/sensor/temp");
}

#[test]
fn broker_credentials_stay_out_of_snapshots() {
    let registry = fixed_registry();
    let graph = TopologyGraph::from_registry(&registry);
    let sites = graph.render_sites();
    let server = &sites["site-1"]["servers"]["srv-1"];
    assert!(server.get("password").is_none());
}

#[test]
fn consecutive_renders_are_byte_identical() {
    let registry = fixed_registry();
    let first = TopologyGraph::from_registry(&registry).render_frame(1_700_000_000.0);
    let second = TopologyGraph::from_registry(&registry).render_frame(1_700_000_000.0);
    assert_eq!(
        serde_json::to_string(&first).expect("encode"),
        serde_json::to_string(&second).expect("encode"),
    );
}

#[test]
fn devices_land_under_their_owning_zone_only() {
    let mut registry = fixed_registry();
    registry.upsert_zone(Zone {
        id: "zone-2".to_string(),
        site_id: "site-1".to_string(),
        name: "Annex".to_string(),
        ..Zone::default()
    });
    let graph = TopologyGraph::from_registry(&registry);
    let sites = graph.render_sites();
    assert!(sites["site-1"]["zones"]["zone-2"]["devices"]
        .as_object()
        .expect("object")
        .is_empty());
    assert!(sites["site-1"]["zones"]["zone-1"]["devices"]
        .as_object()
        .expect("object")
        .contains_key("dev-1"));
}
