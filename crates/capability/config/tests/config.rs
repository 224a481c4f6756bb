use edge_config::AppConfig;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("EDGE_STORE", "memory");
        std::env::set_var("EDGE_JWT_SECRET", "secret");
        std::env::set_var("EDGE_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("EDGE_GATEWAY_MQTT_PORT", "1884");
        std::env::set_var("EDGE_DISPATCH_BATCH_LIMIT", "50");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.store, "memory");
    assert_eq!(config.jwt_ttl_seconds, 3600);
    assert_eq!(config.gateway_mqtt.port, 1884);
    assert_eq!(config.gateway_mqtt.client_id, "ws-gateway");
    assert_eq!(config.dispatch_batch_limit, 50);
    assert_eq!(config.room_poll_ms, 50);
    assert_eq!(config.room_ping_ms, 50_000);
    assert_eq!(config.mqtt_suback_timeout_ms, 30);
    assert_eq!(config.dispatch_publish_timeout_ms, 200);
}
