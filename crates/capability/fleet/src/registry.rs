//! 设备注册表
//!
//! 已加载拓扑的内存索引：站点、区域、服务器、设备四张 id 映射，
//! 外加 device_id → 主题序列。写入方只有 Device Manager（单写多读），
//! 读取一律返回独立副本。有序映射保证枚举顺序稳定。

use domain::{Device, MqttTopic, Server, Site, Zone};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    sites: BTreeMap<String, Site>,
    zones: BTreeMap<String, Zone>,
    servers: BTreeMap<String, Server>,
    devices: BTreeMap<String, Device>,
    device_topics: BTreeMap<String, Vec<MqttTopic>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 丢弃全部条目。
    pub fn clear(&mut self) {
        self.sites.clear();
        self.zones.clear();
        self.servers.clear();
        self.devices.clear();
        self.device_topics.clear();
    }

    pub fn upsert_site(&mut self, site: Site) {
        self.sites.insert(site.id.clone(), site);
    }

    pub fn upsert_zone(&mut self, zone: Zone) {
        self.zones.insert(zone.id.clone(), zone);
    }

    pub fn upsert_server(&mut self, server: Server) {
        self.servers.insert(server.id.clone(), server);
    }

    pub fn upsert_device(&mut self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn set_topics_for_device(&mut self, device_id: &str, topics: Vec<MqttTopic>) {
        self.device_topics.insert(device_id.to_string(), topics);
    }

    pub fn get_site(&self, id: &str) -> Option<Site> {
        self.sites.get(id).cloned()
    }

    pub fn get_zone(&self, id: &str) -> Option<Zone> {
        self.zones.get(id).cloned()
    }

    pub fn get_server(&self, id: &str) -> Option<Server> {
        self.servers.get(id).cloned()
    }

    pub fn get_device(&self, id: &str) -> Option<Device> {
        self.devices.get(id).cloned()
    }

    pub fn topics_for_device(&self, device_id: &str) -> Vec<MqttTopic> {
        self.device_topics
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_sites(&self) -> Vec<Site> {
        self.sites.values().cloned().collect()
    }

    pub fn all_zones(&self) -> Vec<Zone> {
        self.zones.values().cloned().collect()
    }

    pub fn all_servers(&self) -> Vec<Server> {
        self.servers.values().cloned().collect()
    }

    pub fn all_devices(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    /// 协议收窄扫描：protocol == "mqtt" 的设备。
    pub fn all_mqtt_devices(&self) -> Vec<Device> {
        self.devices
            .values()
            .filter(|device| device.is_mqtt())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, protocol: &str) -> Device {
        Device {
            id: id.to_string(),
            site_id: "s1".to_string(),
            zone_id: "z1".to_string(),
            name: id.to_string(),
            protocol: protocol.to_string(),
            enabled: true,
            ..Device::default()
        }
    }

    #[test]
    fn mqtt_scan_narrows_by_protocol() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_device(device("d1", "mqtt"));
        registry.upsert_device(device("d2", "modbus-tcp"));
        registry.upsert_device(device("d3", "mqtt"));

        let mqtt = registry.all_mqtt_devices();
        assert_eq!(mqtt.len(), 2);
        assert!(mqtt.iter().all(|d| d.is_mqtt()));
    }

    #[test]
    fn clear_drops_every_entry() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_device(device("d1", "mqtt"));
        registry.set_topics_for_device("d1", vec![MqttTopic::default()]);
        registry.clear();
        assert!(registry.get_device("d1").is_none());
        assert!(registry.topics_for_device("d1").is_empty());
    }

    #[test]
    fn reads_return_copies() {
        let mut registry = DeviceRegistry::new();
        registry.upsert_device(device("d1", "mqtt"));
        let mut copy = registry.get_device("d1").expect("device");
        copy.name = "mutated".to_string();
        assert_eq!(registry.get_device("d1").expect("device").name, "d1");
    }
}
