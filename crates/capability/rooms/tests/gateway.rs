use edge_rooms::{GatewayBrokerSettings, GatewayRoom, GatewayRoomConfig};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn config() -> GatewayRoomConfig {
    GatewayRoomConfig {
        broker: GatewayBrokerSettings {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "ws-gateway-test".to_string(),
            clean_session: true,
            keep_alive: 10,
            qos: 1,
            will_topic: None,
            will_payload: None,
            will_retain: false,
        },
        poll_period: Duration::from_millis(10),
        ping_period: Duration::from_secs(50),
        connect_timeout: Duration::from_millis(50),
        suback_timeout: Duration::from_millis(30),
    }
}

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame within deadline")
        .expect("channel open");
    serde_json::from_str(&text).expect("json frame")
}

#[tokio::test]
async fn session_ids_increase_strictly_from_one() {
    let room = GatewayRoom::new(config());
    let (tx, _rx) = mpsc::unbounded_channel();
    assert_eq!(room.add_session(tx.clone()), 1);
    assert_eq!(room.add_session(tx), 2);
}

#[tokio::test]
async fn join_server_reports_disconnected_without_broker() {
    // 不启动 worker：不触发任何 broker 连接
    let room = GatewayRoom::new(config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = room.add_session(tx);

    room.handle_message(session, r#"{"Type":"JoinServer"}"#);
    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame["Type"], "JoinChatRoomResponse");
    assert_eq!(frame["Success"], true);
    assert_eq!(frame["MqttStatus"], "Disconnected");
    assert_eq!(frame["Subscription"], serde_json::json!([]));
}

#[tokio::test]
async fn subscribe_is_queued_until_broker_is_reachable() {
    let room = GatewayRoom::new(config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = room.add_session(tx);

    // broker 不可达：命令排队，不立即回应
    room.handle_message(session, r#"{"Type":"Subscribe","Topic":"plant/+/temp","QoS":1}"#);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}
