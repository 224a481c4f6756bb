//! 设备订阅对账
//!
//! 每个 broker 一个连接器，维护单调增长的已对账主题 id 集合。
//! 订阅失败只记录并跳过，重试由拓扑重载路径完成（重载会重建连接器）。

use crate::session::{MqttSession, Outcome};
use domain::{Device, MqttTopic};
use edge_telemetry::{record_topic_subscribe_failure, record_topic_subscribed};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct MqttDeviceConnector {
    session: Arc<MqttSession>,
    subscribed_topic_ids: HashSet<String>,
    suback_timeout: Duration,
}

impl MqttDeviceConnector {
    pub fn new(session: Arc<MqttSession>, suback_timeout: Duration) -> Self {
        Self {
            session,
            subscribed_topic_ids: HashSet::new(),
            suback_timeout,
        }
    }

    pub fn session(&self) -> &Arc<MqttSession> {
        &self.session
    }

    /// 对账设备的订阅：启用且方向为 sub|pubsub 的主题，未在集合中的发起 SUBSCRIBE。
    ///
    /// 按主题迭代顺序对账。对账只对集合幂等，不保证每次调用都产生网络 SUBSCRIBE。
    pub async fn sync_device(&mut self, device: &Device, topics: &[MqttTopic]) {
        if !self.session.is_reachable() {
            return;
        }
        if !device.enabled {
            return;
        }

        for topic in topics {
            if !topic.is_subscribed() {
                continue;
            }
            if topic.topic.is_empty() {
                continue;
            }
            if !self.subscribed_topic_ids.insert(topic.id.clone()) {
                continue;
            }

            let transaction = self.session.subscribe(&topic.topic, topic.qos);
            match transaction.await_completion(self.suback_timeout).await {
                Outcome::Acked => {
                    record_topic_subscribed();
                    info!(
                        target: "edge.mqtt",
                        broker_id = %self.session.broker_id(),
                        device_id = %device.id,
                        topic = %topic.topic,
                        "topic subscribed"
                    );
                }
                Outcome::Rejected(reason) => {
                    record_topic_subscribe_failure();
                    warn!(
                        target: "edge.mqtt",
                        broker_id = %self.session.broker_id(),
                        device_id = %device.id,
                        topic = %topic.topic,
                        reason = %reason,
                        "topic subscription failed"
                    );
                }
                Outcome::Unknown => {
                    warn!(
                        target: "edge.mqtt",
                        broker_id = %self.session.broker_id(),
                        device_id = %device.id,
                        topic = %topic.topic,
                        "topic subscription outcome unknown"
                    );
                }
            }
        }
    }

    /// 对称退订该设备所有已对账的主题。
    pub async fn unsync_device(&mut self, device: &Device, topics: &[MqttTopic]) {
        if !self.session.is_reachable() {
            return;
        }
        for topic in topics {
            if topic.topic.is_empty() {
                continue;
            }
            if self.subscribed_topic_ids.remove(&topic.id) {
                let transaction = self.session.unsubscribe(&topic.topic);
                if let Outcome::Rejected(reason) =
                    transaction.await_completion(self.suback_timeout).await
                {
                    warn!(
                        target: "edge.mqtt",
                        broker_id = %self.session.broker_id(),
                        device_id = %device.id,
                        topic = %topic.topic,
                        reason = %reason,
                        "unsubscribe failed"
                    );
                }
            }
        }
    }
}
