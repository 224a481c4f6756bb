//! IoT 边缘服务入口
//!
//! 装配顺序：配置 → 日志 → 存储（Postgres 或内存演示）→ 认证服务 →
//! 设备管理器 → 拓扑更新器 / 命令下发泵（后台任务）→ WS 房间 → HTTP 服务。

mod handlers;
mod middleware;
mod routes;
mod utils;

use axum::middleware::from_fn;
use domain::Tenant;
use edge_auth::{AuthService, JwtSigner, SigninUser};
use edge_config::AppConfig;
use edge_dispatch::{CommandDispatcher, DispatchConfig};
use edge_fleet::{DeviceManager, FleetConfig, TopologyUpdater};
use edge_rooms::{ChatRoom, GatewayBrokerSettings, GatewayRoom, GatewayRoomConfig};
use edge_storage::{
    CHANGES_CHANNEL, COMMANDS_CHANNEL, ChangeStream, CommandStore, DeviceStore, EventStore,
    InMemoryCommandStore, InMemoryDeviceStore, InMemoryEventStore, InMemoryServerStore,
    InMemorySiteStore, InMemoryTenantStore, InMemoryTopicStore, InMemoryUserStore,
    InMemoryZoneStore, PgCommandStore, PgDeviceStore, PgEventStore, PgServerStore, PgSiteStore,
    PgTenantStore, PgTopicStore, PgUserStore, PgZoneStore, ServerStore, SiteStore, TenantStore,
    TopicStore, UserStore, ZoneStore, connect_pool,
};
use edge_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 路由与 handler 共享的应用状态。
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub tenants: Arc<dyn TenantStore>,
    pub users: Arc<dyn UserStore>,
    pub chat_room: Arc<ChatRoom>,
    pub gateway_room: Arc<GatewayRoom>,
    pub events_tx: broadcast::Sender<String>,
}

struct Stores {
    tenants: Arc<dyn TenantStore>,
    users: Arc<dyn UserStore>,
    sites: Arc<dyn SiteStore>,
    zones: Arc<dyn ZoneStore>,
    servers: Arc<dyn ServerStore>,
    devices: Arc<dyn DeviceStore>,
    topics: Arc<dyn TopicStore>,
    commands: Arc<dyn CommandStore>,
    events: Arc<dyn EventStore>,
    pool: Option<edge_storage::PgPool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let stores = build_stores(&config).await?;

    let signer = JwtSigner::new(
        config.jwt_secret.clone(),
        config.jwt_ttl_seconds,
        config.jwt_iss.clone(),
        config.jwt_aud.clone(),
    );
    let auth = Arc::new(AuthService::new(stores.users.clone(), signer));

    if config.store == "memory" {
        seed_demo_admin(&stores, &auth).await;
    }

    // 拓扑快照与命令事件的推送通道
    let (events_tx, _) = broadcast::channel::<String>(256);

    let manager = Arc::new(DeviceManager::new(
        stores.sites.clone(),
        stores.zones.clone(),
        stores.servers.clone(),
        stores.devices.clone(),
        stores.topics.clone(),
        stores.events.clone(),
        FleetConfig {
            connect_timeout: Duration::from_millis(config.mqtt_connect_timeout_ms),
            suback_timeout: Duration::from_millis(config.mqtt_suback_timeout_ms),
        },
    ));

    if config.fleet_enabled {
        let updater = Arc::new(TopologyUpdater::new(manager.clone(), events_tx.clone()));
        let changes = change_stream(&stores, CHANGES_CHANNEL).await;
        tokio::spawn(updater.run(changes));
        info!("topology updater started");
    } else {
        info!("topology updater disabled (EDGE_FLEET=off)");
    }

    if config.dispatch_enabled {
        let dispatcher = Arc::new(CommandDispatcher::new(
            stores.commands.clone(),
            stores.events.clone(),
            manager.clone(),
            Some(events_tx.clone()),
            DispatchConfig {
                batch_limit: config.dispatch_batch_limit,
                publish_timeout: Duration::from_millis(config.dispatch_publish_timeout_ms),
                retry_delay_seconds: config.dispatch_retry_delay_seconds,
                ..DispatchConfig::default()
            },
        ));
        let changes = change_stream(&stores, COMMANDS_CHANNEL).await;
        tokio::spawn(dispatcher.run(changes));
        info!("command dispatcher started");
    } else {
        info!("command dispatcher disabled (EDGE_DISPATCH=off)");
    }

    let chat_room = ChatRoom::new(Duration::from_millis(config.room_poll_ms));
    let _chat_worker = chat_room.start();

    let gateway_room = GatewayRoom::new(GatewayRoomConfig {
        broker: GatewayBrokerSettings {
            host: config.gateway_mqtt.host.clone(),
            port: config.gateway_mqtt.port,
            username: config.gateway_mqtt.username.clone(),
            password: config.gateway_mqtt.password.clone(),
            client_id: config.gateway_mqtt.client_id.clone(),
            clean_session: config.gateway_mqtt.clean_session,
            keep_alive: config.gateway_mqtt.keep_alive,
            qos: config.gateway_mqtt.qos,
            will_topic: config.gateway_mqtt.will_topic.clone(),
            will_payload: config.gateway_mqtt.will_payload.clone(),
            will_retain: config.gateway_mqtt.will_retain,
        },
        poll_period: Duration::from_millis(config.room_poll_ms),
        ping_period: Duration::from_millis(config.room_ping_ms),
        connect_timeout: Duration::from_millis(config.mqtt_connect_timeout_ms),
        suback_timeout: Duration::from_millis(config.mqtt_suback_timeout_ms),
    });
    let _gateway_worker = gateway_room.start();

    let state = AppState {
        auth,
        tenants: stores.tenants.clone(),
        users: stores.users.clone(),
        chat_room,
        gateway_room,
        events_tx,
    };

    let app = routes::create_api_router()
        .with_state(state)
        .layer(from_fn(middleware::request_context))
        .layer(from_fn(middleware::cors));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "edge api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_stores(config: &AppConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    if config.store == "memory" {
        info!("store: in-memory (EDGE_STORE=memory)");
        return Ok(Stores {
            tenants: Arc::new(InMemoryTenantStore::new()),
            users: Arc::new(InMemoryUserStore::new()),
            sites: Arc::new(InMemorySiteStore::new()),
            zones: Arc::new(InMemoryZoneStore::new()),
            servers: Arc::new(InMemoryServerStore::new()),
            devices: Arc::new(InMemoryDeviceStore::new()),
            topics: Arc::new(InMemoryTopicStore::new()),
            commands: Arc::new(InMemoryCommandStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
            pool: None,
        });
    }

    let database_url = config
        .database_url
        .as_deref()
        .ok_or("EDGE_DATABASE_URL is required for the postgres store")?;
    let pool = connect_pool(database_url).await?;
    info!("store: postgres");
    Ok(Stores {
        tenants: Arc::new(PgTenantStore::new(pool.clone())),
        users: Arc::new(PgUserStore::new(pool.clone())),
        sites: Arc::new(PgSiteStore::new(pool.clone())),
        zones: Arc::new(PgZoneStore::new(pool.clone())),
        servers: Arc::new(PgServerStore::new(pool.clone())),
        devices: Arc::new(PgDeviceStore::new(pool.clone())),
        topics: Arc::new(PgTopicStore::new(pool.clone())),
        commands: Arc::new(PgCommandStore::new(pool.clone())),
        events: Arc::new(PgEventStore::new(pool.clone())),
        pool: Some(pool),
    })
}

async fn change_stream(stores: &Stores, channel: &str) -> Option<ChangeStream> {
    let pool = stores.pool.as_ref()?;
    match ChangeStream::connect(pool, channel).await {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(channel, error = %err, "listen channel unavailable, falling back to polling");
            None
        }
    }
}

/// 内存演示模式：默认租户 t1 与 admin 帐号。
async fn seed_demo_admin(stores: &Stores, auth: &Arc<AuthService>) {
    let _ = stores
        .tenants
        .insert(Tenant {
            id: "tenant-1".to_string(),
            slug: "t1".to_string(),
            name: "Default Tenant".to_string(),
        })
        .await;
    match auth
        .signin_create_user(SigninUser {
            tenant_id: "tenant-1".to_string(),
            user_name: "admin".to_string(),
            password: "admin123".to_string(),
            email: String::new(),
            role: domain::Role::Admin,
            mfa_enabled: false,
            totp_digits: 6,
            totp_period: 30,
        })
        .await
    {
        Ok(_) => info!("seeded demo admin (tenant t1, user admin)"),
        Err(err) => warn!(error = %err, "demo admin seed skipped"),
    }
}
