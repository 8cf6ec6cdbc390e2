//! Data Transfer Objects for the engine command surface
//!
//! These are the shapes the engine speaks today. Older payload shapes are
//! handled in `api::decode`, never here.

use crate::graph::node::{PluginInstance, SinkId, SourceOrigin};
use crate::layout::position::{CanvasTransform, Position, UiStateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// 基本型
// =============================================================================

/// ノードハンドル
pub type NodeHandle = u32;

/// エッジID
pub type EdgeId = u32;

/// ポートID
pub type PortId = u8;

/// UI state payload version written by this crate
pub const UI_STATE_VERSION: u32 = 2;

// =============================================================================
// Source / Sink 識別
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceIdDto {
    #[serde(rename = "prism")]
    PrismChannel { channel: u8 },
    #[serde(rename = "device")]
    InputDevice { device_id: u32, channel: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSinkDto {
    pub device_id: u32,
    pub channel_offset: u8,
    pub channel_count: u8,
}

// =============================================================================
// Node DTOs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInstanceDto {
    pub instance_id: String,
    pub plugin_id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeInfoDto {
    #[serde(rename = "source")]
    Source {
        handle: NodeHandle,
        #[serde(default)]
        stable_id: String,
        source_id: SourceIdDto,
        port_count: u8,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sub_label: Option<String>,
    },
    #[serde(rename = "bus")]
    Bus {
        handle: NodeHandle,
        #[serde(default)]
        stable_id: String,
        bus_id: String,
        label: String,
        port_count: u8,
        plugins: Vec<PluginInstanceDto>,
    },
    #[serde(rename = "sink")]
    Sink {
        handle: NodeHandle,
        #[serde(default)]
        stable_id: String,
        sink: OutputSinkDto,
        port_count: u8,
        label: String,
    },
}

impl NodeInfoDto {
    pub fn handle(&self) -> NodeHandle {
        match self {
            NodeInfoDto::Source { handle, .. }
            | NodeInfoDto::Bus { handle, .. }
            | NodeInfoDto::Sink { handle, .. } => *handle,
        }
    }

    pub fn stable_id(&self) -> &str {
        match self {
            NodeInfoDto::Source { stable_id, .. }
            | NodeInfoDto::Bus { stable_id, .. }
            | NodeInfoDto::Sink { stable_id, .. } => stable_id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeInfoDto::Source { label, .. }
            | NodeInfoDto::Bus { label, .. }
            | NodeInfoDto::Sink { label, .. } => label,
        }
    }

    pub fn port_count(&self) -> u8 {
        match self {
            NodeInfoDto::Source { port_count, .. }
            | NodeInfoDto::Bus { port_count, .. }
            | NodeInfoDto::Sink { port_count, .. } => *port_count,
        }
    }

    pub(crate) fn set_handle(&mut self, new_handle: NodeHandle) {
        match self {
            NodeInfoDto::Source { handle, .. }
            | NodeInfoDto::Bus { handle, .. }
            | NodeInfoDto::Sink { handle, .. } => *handle = new_handle,
        }
    }
}

// =============================================================================
// Edge / Graph DTOs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfoDto {
    pub id: EdgeId,
    pub source: NodeHandle,
    pub source_port: PortId,
    pub target: NodeHandle,
    pub target_port: PortId,
    pub gain: f32,
    pub muted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDto {
    pub nodes: Vec<NodeInfoDto>,
    pub edges: Vec<EdgeInfoDto>,
}

// =============================================================================
// State DTOs (永続化用)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasTransformDto {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UIStateDto {
    #[serde(default)]
    pub version: u32,

    /// Stable-keyed node positions.
    /// Keys are strings like `source:prism:0`, `bus:<bus_id>`, etc.
    #[serde(default)]
    pub node_positions: BTreeMap<String, NodePosition>,

    /// Backward-compat: old handle-keyed positions. Never written by us.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_positions_by_handle: BTreeMap<NodeHandle, NodePosition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_transform: Option<CanvasTransformDto>,
}

impl UIStateDto {
    pub fn is_empty(&self) -> bool {
        self.node_positions.is_empty()
            && self.node_positions_by_handle.is_empty()
            && self.canvas_transform.is_none()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<SourceIdDto> for SourceOrigin {
    fn from(dto: SourceIdDto) -> Self {
        match dto {
            SourceIdDto::PrismChannel { channel } => SourceOrigin::Prism { channel },
            SourceIdDto::InputDevice { device_id, channel } => {
                SourceOrigin::Device { device_id, channel }
            }
        }
    }
}

impl From<SinkId> for OutputSinkDto {
    fn from(sink: SinkId) -> Self {
        OutputSinkDto {
            device_id: sink.device_id,
            channel_offset: sink.channel_offset,
            channel_count: sink.channel_count,
        }
    }
}

impl From<OutputSinkDto> for SinkId {
    fn from(dto: OutputSinkDto) -> Self {
        SinkId {
            device_id: dto.device_id,
            channel_offset: dto.channel_offset,
            channel_count: dto.channel_count,
        }
    }
}

impl From<PluginInstanceDto> for PluginInstance {
    fn from(dto: PluginInstanceDto) -> Self {
        PluginInstance {
            instance_id: dto.instance_id,
            plugin_id: dto.plugin_id,
            name: dto.name,
            manufacturer: dto.manufacturer,
            enabled: dto.enabled,
        }
    }
}

impl From<Position> for NodePosition {
    fn from(p: Position) -> Self {
        NodePosition { x: p.x, y: p.y }
    }
}

impl From<CanvasTransform> for CanvasTransformDto {
    fn from(t: CanvasTransform) -> Self {
        CanvasTransformDto {
            x: t.x,
            y: t.y,
            scale: t.scale,
        }
    }
}

impl From<&UiStateSnapshot> for UIStateDto {
    fn from(snapshot: &UiStateSnapshot) -> Self {
        UIStateDto {
            version: UI_STATE_VERSION,
            node_positions: snapshot
                .positions
                .iter()
                .map(|(id, pos)| (id.clone(), NodePosition::from(*pos)))
                .collect(),
            node_positions_by_handle: BTreeMap::new(),
            canvas_transform: Some(CanvasTransformDto::from(snapshot.canvas)),
        }
    }
}
