//! Simulated network nodes

use std::fmt;
use std::time::SystemTime;

use rand::Rng;
use serde::{Deserialize, Serialize};
use zb_protocol::{ActiveNodeEntry, KnownNodeEntry, LongAddress, NodeType};

use crate::meter::MeterTelemetry;

/// Firmware reported by nodes that were never updated
pub const DEFAULT_FIRMWARE: &str = "ZigBee-3.0-1.0.0";

/// Nodes whose name contains this marker carry meter telemetry
pub const METER_NAME_MARKER: &str = "Meter";

/// RSSI range of a healthy link, dBm
pub const RSSI_RANGE: std::ops::RangeInclusive<i8> = -80..=-40;
/// LQI range of a healthy link
pub const LQI_RANGE: std::ops::RangeInclusive<u8> = 60..=100;

/// Lifecycle status of a node
///
/// Only `Online` and `Offline` are stable. The others mark an operation in
/// flight and are always resolved by a scheduled completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Online,
    Offline,
    Rebooting,
    Reconnecting,
    ChannelChanging,
    Updating,
}

impl NodeStatus {
    /// True for statuses that are waiting on a scheduled completion
    pub fn is_transient(&self) -> bool {
        !matches!(self, NodeStatus::Online | NodeStatus::Offline)
    }

    /// Returns a human-readable name for the status
    pub fn name(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Rebooting => "rebooting",
            NodeStatus::Reconnecting => "reconnecting",
            NodeStatus::ChannelChanging => "channel changing",
            NodeStatus::Updating => "updating",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of a node to create at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSeed {
    /// Display name; names containing "Meter" get telemetry
    pub name: String,
    /// Long address
    pub long_address: LongAddress,
    /// Short address; allocated from the counter when absent
    #[serde(default)]
    pub short_address: Option<u16>,
    /// Device role
    pub node_type: NodeType,
    /// Initial RSSI in dBm
    pub rssi: i8,
    /// Initial LQI
    pub lqi: u8,
}

impl NodeSeed {
    fn demo(addr: u64, name: &str, node_type: NodeType, rssi: i8, lqi: u8) -> Self {
        Self {
            name: name.to_string(),
            long_address: LongAddress(addr),
            short_address: Some(addr as u16),
            node_type,
            rssi,
            lqi,
        }
    }
}

/// The fixed node set every coordinator starts with
pub fn demo_nodes() -> Vec<NodeSeed> {
    vec![
        NodeSeed::demo(0x01, "Router-1", NodeType::Router, -65, 95),
        NodeSeed::demo(0x02, "Meter-1", NodeType::EndDevice, -72, 88),
        NodeSeed::demo(0x03, "Meter-2", NodeType::EndDevice, -68, 92),
        NodeSeed::demo(0x04, "Router-2", NodeType::Router, -70, 90),
        NodeSeed::demo(0x05, "Meter-3", NodeType::SleepyEndDevice, -80, 80),
    ]
}

/// One simulated network device
#[derive(Debug, Clone)]
pub struct Node {
    pub long_address: LongAddress,
    pub name: String,
    pub short_address: u16,
    pub node_type: NodeType,
    pub rssi: i8,
    pub lqi: u8,
    pub status: NodeStatus,
    pub firmware_version: String,
    pub meter: Option<MeterTelemetry>,
    pub debug_mode: bool,
    pub debug_type: u8,
    pub debug_level: u8,
    /// False while the node is dark after a simulated power outage
    pub powered: bool,
    pub last_seen: SystemTime,
}

impl Node {
    /// Create an online node; metering capability follows from the name
    pub fn new<R: Rng + ?Sized>(
        long_address: LongAddress,
        name: impl Into<String>,
        short_address: u16,
        node_type: NodeType,
        rssi: i8,
        lqi: u8,
        rng: &mut R,
    ) -> Self {
        let name = name.into();
        let meter = name
            .contains(METER_NAME_MARKER)
            .then(|| MeterTelemetry::initial(rng));
        Self {
            long_address,
            name,
            short_address,
            node_type,
            rssi,
            lqi,
            status: NodeStatus::Online,
            firmware_version: DEFAULT_FIRMWARE.to_string(),
            meter,
            debug_mode: false,
            debug_type: 0,
            debug_level: 0,
            powered: true,
            last_seen: SystemTime::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// Stable status a finished operation should leave the node in
    pub fn settled_status(&self) -> NodeStatus {
        if self.powered {
            NodeStatus::Online
        } else {
            NodeStatus::Offline
        }
    }

    /// Finish an in-flight operation if the node is still in `expected`
    ///
    /// Returns false when another operation has taken over the node since.
    pub fn resolve(&mut self, expected: NodeStatus) -> bool {
        if self.status != expected {
            return false;
        }
        self.status = self.settled_status();
        true
    }

    /// Entry for the `GetActiveNodes` reply
    pub fn active_entry(&self) -> ActiveNodeEntry {
        ActiveNodeEntry {
            address: self.long_address,
            short_address: self.short_address,
            node_type: self.node_type,
            rssi: self.rssi,
            lqi: self.lqi,
        }
    }

    /// Entry for the `GetAllNodes` reply
    pub fn known_entry(&self) -> KnownNodeEntry {
        KnownNodeEntry {
            address: self.long_address,
            online: self.is_online(),
        }
    }
}
