//! Node model mirrored from the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned node identifier.
///
/// Only unique within one engine session; the engine reassigns handles on
/// restart. Never use it as a persistence key, use the stable id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(u32);

impl NodeHandle {
    /// Get the raw ID value (for serialization)
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Create from raw ID value (for deserialization)
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for NodeHandle {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeHandle> for u32 {
    fn from(handle: NodeHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port (channel) index on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u8);

impl PortId {
    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for PortId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl From<PortId> for u8 {
    fn from(port: PortId) -> Self {
        port.0
    }
}

/// Node kind without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Source,
    Bus,
    Sink,
}

/// Where a source node takes its audio from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Channel of the built-in multiplexed Prism input
    Prism { channel: u8 },
    /// Channel of a physical input device
    Device { device_id: u32, channel: u8 },
    /// The engine sent something we could not interpret
    Unknown,
}

/// Output destination. Sub-devices of an aggregate device are told apart by
/// `channel_offset`; plain devices use offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId {
    pub device_id: u32,
    pub channel_offset: u8,
    pub channel_count: u8,
}

impl SinkId {
    /// Create a simple sink (non-aggregate device)
    pub fn new(device_id: u32, channel_count: u8) -> Self {
        Self {
            device_id,
            channel_offset: 0,
            channel_count,
        }
    }

    /// Create a sink for aggregate sub-device
    pub fn with_offset(device_id: u32, channel_offset: u8, channel_count: u8) -> Self {
        Self {
            device_id,
            channel_offset,
            channel_count,
        }
    }
}

/// Plugin inserted on a bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInstance {
    pub instance_id: String,
    pub plugin_id: String,
    pub name: String,
    pub manufacturer: String,
    pub enabled: bool,
}

/// Kind-specific node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Source {
        origin: SourceOrigin,
        sub_label: Option<String>,
    },
    Bus {
        /// Engine-generated bus identifier. Empty when the engine omitted it.
        bus_id: String,
        /// Ordered plugin chain
        plugins: Vec<PluginInstance>,
    },
    Sink {
        /// `None` when the engine sent an unusable sink descriptor
        sink: Option<SinkId>,
    },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Source { .. } => NodeType::Source,
            NodeKind::Bus { .. } => NodeType::Bus,
            NodeKind::Sink { .. } => NodeType::Sink,
        }
    }

    /// Source with an origin we could not decode
    pub fn unknown_source() -> Self {
        NodeKind::Source {
            origin: SourceOrigin::Unknown,
            sub_label: None,
        }
    }
}

/// A node as the editor sees it: the engine's description plus its resolved
/// stable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub handle: NodeHandle,
    pub stable_id: String,
    pub kind: NodeKind,
    pub port_count: u8,
    pub label: String,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}
