//! 机群能力：设备注册表、设备管理器、拓扑快照与更新器。

mod manager;
mod registry;
mod topology;

pub use manager::{DeviceManager, FleetConfig};
pub use registry::DeviceRegistry;
pub use topology::{DeviceNode, SiteNode, TopologyGraph, TopologyUpdater, ZoneNode};
