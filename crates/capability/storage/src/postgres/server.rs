//! Postgres 服务器存储实现
//!
//! ## 设计要点
//!
//! - **判别列分发**：`protocol` 决定构造哪个 [`ServerDetail`] 变体，未知值报错
//! - **凭据拆表**：MQTT 用户名/口令存于 `iot.server_credentials`，查询时左联
//! - **级联删除**：删除服务器时先删凭据行，走事务

use crate::error::StorageError;
use crate::traits::ServerStore;
use super::{json_text, json_value, now_epoch_ms};
use domain::{MqttBrokerDetail, Server, ServerDetail};
use sqlx::{PgPool, Row};

const SERVER_COLUMNS: &str = "s.id, s.name, s.host, s.port, s.protocol, s.enabled, s.use_tls, \
     s.clean_session, s.will_retain, s.will_topic, s.will_payload, s.qos, s.keep_alive, \
     s.tags, s.metadata::text as metadata, s.created_at_ms, s.updated_at_ms, \
     c.username as cred_username, c.password_enc as cred_password";

const SERVER_FROM: &str =
    "from iot.servers s left join iot.server_credentials c on c.server_id = s.id";

pub struct PgServerStore {
    pool: PgPool,
}

impl PgServerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 行工厂：按 `protocol` 判别列构造具体变体。
fn row_to_server(row: &sqlx::postgres::PgRow) -> Result<Server, StorageError> {
    let protocol: String = row.try_get("protocol")?;
    let detail = match protocol.as_str() {
        "mqtt" => ServerDetail::Mqtt(MqttBrokerDetail {
            user_name: row
                .try_get::<Option<String>, _>("cred_username")?
                .unwrap_or_default(),
            password: row
                .try_get::<Option<String>, _>("cred_password")?
                .unwrap_or_default(),
            clean_session: row.try_get("clean_session")?,
            will_retain: row.try_get("will_retain")?,
            will_topic: row.try_get("will_topic")?,
            will_payload: row.try_get("will_payload")?,
            qos: row.try_get::<i16, _>("qos")? as u8,
            keep_alive: row.try_get::<i32, _>("keep_alive")? as u16,
        }),
        "modbus-tcp" => ServerDetail::ModbusTcp,
        "opcua" => ServerDetail::OpcUa,
        other => {
            return Err(StorageError::new(format!("unknown server protocol: {other}")));
        }
    };
    Ok(Server {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        host: row.try_get("host")?,
        port: row.try_get::<i32, _>("port")? as u16,
        enabled: row.try_get("enabled")?,
        use_tls: row.try_get("use_tls")?,
        tags: row.try_get("tags")?,
        metadata: json_value(row.try_get("metadata")?),
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
        detail,
    })
}

fn mqtt_columns(server: &Server) -> (bool, bool, String, String, i16, i32) {
    match server.mqtt_detail() {
        Some(detail) => (
            detail.clean_session,
            detail.will_retain,
            detail.will_topic.clone(),
            detail.will_payload.clone(),
            i16::from(detail.qos),
            i32::from(detail.keep_alive),
        ),
        None => (true, false, String::new(), String::new(), 1, 10),
    }
}

#[async_trait::async_trait]
impl ServerStore for PgServerStore {
    async fn find_all(&self) -> Result<Vec<Server>, StorageError> {
        let sql = format!("select {SERVER_COLUMNS} {SERVER_FROM} order by s.id asc");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_server).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Server>, StorageError> {
        let sql = format!("select {SERVER_COLUMNS} {SERVER_FROM} where s.id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_server).transpose()
    }

    async fn insert(&self, server: Server) -> Result<String, StorageError> {
        let (clean_session, will_retain, will_topic, will_payload, qos, keep_alive) =
            mqtt_columns(&server);
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "insert into iot.servers (id, name, host, port, protocol, enabled, use_tls, \
             clean_session, will_retain, will_topic, will_payload, qos, keep_alive, tags, \
             metadata, created_at_ms, updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15::jsonb, \
             $16, $17) returning id",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.host)
        .bind(i32::from(server.port))
        .bind(server.protocol())
        .bind(server.enabled)
        .bind(server.use_tls)
        .bind(clean_session)
        .bind(will_retain)
        .bind(&will_topic)
        .bind(&will_payload)
        .bind(qos)
        .bind(keep_alive)
        .bind(&server.tags)
        .bind(json_text(&server.metadata))
        .bind(server.created_at_ms)
        .bind(server.updated_at_ms)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(detail) = server.mqtt_detail() {
            sqlx::query(
                "insert into iot.server_credentials (server_id, username, password_enc) \
                 values ($1, $2, $3) \
                 on conflict (server_id) do update set username = $2, password_enc = $3",
            )
            .bind(&server.id)
            .bind(&detail.user_name)
            .bind(&detail.password)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, server: &Server) -> Result<(), StorageError> {
        let (clean_session, will_retain, will_topic, will_payload, qos, keep_alive) =
            mqtt_columns(server);
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "update iot.servers set name = $2, host = $3, port = $4, protocol = $5, \
             enabled = $6, use_tls = $7, clean_session = $8, will_retain = $9, \
             will_topic = $10, will_payload = $11, qos = $12, keep_alive = $13, tags = $14, \
             metadata = $15::jsonb, updated_at_ms = $16 where id = $1",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.host)
        .bind(i32::from(server.port))
        .bind(server.protocol())
        .bind(server.enabled)
        .bind(server.use_tls)
        .bind(clean_session)
        .bind(will_retain)
        .bind(&will_topic)
        .bind(&will_payload)
        .bind(qos)
        .bind(keep_alive)
        .bind(&server.tags)
        .bind(json_text(&server.metadata))
        .bind(now_epoch_ms())
        .execute(&mut *tx)
        .await?;

        if let Some(detail) = server.mqtt_detail() {
            sqlx::query(
                "insert into iot.server_credentials (server_id, username, password_enc) \
                 values ($1, $2, $3) \
                 on conflict (server_id) do update set username = $2, password_enc = $3",
            )
            .bind(&server.id)
            .bind(&detail.user_name)
            .bind(&detail.password)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("delete from iot.server_credentials where server_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("delete from iot.servers where id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StorageError> {
        sqlx::query("update iot.servers set enabled = $2, updated_at_ms = $3 where id = $1")
            .bind(id)
            .bind(enabled)
            .bind(now_epoch_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
