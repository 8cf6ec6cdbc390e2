//! Boundary adapter for engine payloads
//!
//! Engine responses are decoded field by field. A missing or invalid field
//! falls back to a default instead of failing the whole payload, and older
//! field spellings (camelCase, `kind` instead of `type`, externally tagged
//! source ids, handle-keyed positions) are normalized here so nothing past
//! this module ever sees them.
//!
//! Defaults:
//! - `port_count`: sink channel count, else 2
//! - `label`: empty
//! - edge ports: 0, edge `gain`: 1.0 (clamped to >= 0), edge `muted`: false
//! - plugin `enabled`: true, plugin `name`: its plugin id
//! - canvas `x`/`y`: 0, canvas `scale`: 1
//!
//! A node without a usable handle, or an edge without id/source/target, is
//! dropped and counted.

use crate::api::dto::UI_STATE_VERSION;
use crate::error::{SyncError, SyncResult};
use crate::graph::edge::{Edge, EdgeId};
use crate::graph::node::{
    Node, NodeHandle, NodeKind, PluginInstance, PortId, SinkId, SourceOrigin,
};
use crate::graph::stable_id;
use crate::layout::position::{CanvasTransform, Position};
use serde_json::{Map, Value};
use std::cell::Cell;
use std::collections::BTreeMap;

/// First UI state version keyed by stable id only
const STABLE_KEYED_SINCE: u32 = 2;

/// Which spelling a payload used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Current,
    Legacy,
}

/// Normalized node description, before identity resolution
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub handle: NodeHandle,
    /// Identity supplied by the engine, if any
    pub stable_id: Option<String>,
    pub kind: NodeKind,
    pub port_count: u8,
    pub label: String,
    pub shape: PayloadShape,
}

impl NodeDescriptor {
    pub fn resolve_stable_id(&self) -> String {
        stable_id::resolve(self.stable_id.as_deref(), &self.kind)
    }

    pub fn into_node(self) -> Node {
        let stable_id = self.resolve_stable_id();
        Node {
            handle: self.handle,
            stable_id,
            kind: self.kind,
            port_count: self.port_count,
            label: self.label,
        }
    }
}

/// Normalized `getGraph` response
#[derive(Debug, Clone, Default)]
pub struct GraphDescriptor {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<Edge>,
    pub skipped_nodes: usize,
    pub skipped_edges: usize,
}

/// Normalized UI state payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiStateDescriptor {
    /// Payload version; 0 when the writer did not say
    pub version: u32,
    pub positions: BTreeMap<String, Position>,
    /// Positions keyed by engine handle, from old payloads
    pub legacy_by_handle: BTreeMap<NodeHandle, Position>,
    pub canvas: Option<CanvasTransform>,
    pub skipped: usize,
}

// =============================================================================
// Field access
// =============================================================================

/// Object view that remembers whether a legacy spelling was used
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    legacy: Cell<bool>,
}

impl<'a> Fields<'a> {
    fn new(obj: &'a Map<String, Value>) -> Self {
        Self {
            obj,
            legacy: Cell::new(false),
        }
    }

    fn get(&self, current: &str, legacy: &[&str]) -> Option<&'a Value> {
        if let Some(v) = self.obj.get(current).filter(|v| !v.is_null()) {
            return Some(v);
        }
        for name in legacy {
            if let Some(v) = self.obj.get(*name).filter(|v| !v.is_null()) {
                self.legacy.set(true);
                return Some(v);
            }
        }
        None
    }

    fn u32(&self, current: &str, legacy: &[&str]) -> Option<u32> {
        self.get(current, legacy).and_then(as_u32)
    }

    fn u8(&self, current: &str, legacy: &[&str]) -> Option<u8> {
        self.get(current, legacy)
            .and_then(as_u32)
            .and_then(|v| u8::try_from(v).ok())
    }

    fn f64(&self, current: &str, legacy: &[&str]) -> Option<f64> {
        self.get(current, legacy)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    fn bool(&self, current: &str, legacy: &[&str]) -> Option<bool> {
        self.get(current, legacy).and_then(Value::as_bool)
    }

    fn string(&self, current: &str, legacy: &[&str]) -> Option<String> {
        self.get(current, legacy)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn shape(&self) -> PayloadShape {
        if self.legacy.get() {
            PayloadShape::Legacy
        } else {
            PayloadShape::Current
        }
    }
}

fn as_u32(v: &Value) -> Option<u32> {
    // Older engines sent some integers as strings
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Graph
// =============================================================================

/// Decode a `getGraph` response.
///
/// Fails only when the payload is not an object at all. Missing `nodes` or
/// `edges` arrays decode as empty.
pub fn decode_graph(value: &Value) -> SyncResult<GraphDescriptor> {
    let obj = value
        .as_object()
        .ok_or_else(|| SyncError::MalformedResponse(format!("graph is not an object: {}", kind_of(value))))?;

    let mut out = GraphDescriptor::default();

    for raw in obj.get("nodes").and_then(Value::as_array).into_iter().flatten() {
        match decode_node(raw) {
            Some(node) => out.nodes.push(node),
            None => out.skipped_nodes += 1,
        }
    }

    for raw in obj.get("edges").and_then(Value::as_array).into_iter().flatten() {
        match decode_edge(raw) {
            Some(edge) => out.edges.push(edge),
            None => out.skipped_edges += 1,
        }
    }

    let legacy = out.nodes.iter().filter(|n| n.shape == PayloadShape::Legacy).count();
    if legacy > 0 {
        log::debug!("[graph] decode: {} nodes in the legacy spelling", legacy);
    }

    if out.skipped_nodes > 0 || out.skipped_edges > 0 {
        log::warn!(
            "[graph] decode: skipped nodes={} edges={} (missing handle/id)",
            out.skipped_nodes,
            out.skipped_edges
        );
    }

    Ok(out)
}

pub fn decode_node(value: &Value) -> Option<NodeDescriptor> {
    let f = Fields::new(value.as_object()?);

    let handle = NodeHandle::from(f.u32("handle", &["nodeHandle"])?);
    let type_tag = f
        .string("type", &["kind", "node_type", "nodeType"])
        .map(|s| s.to_ascii_lowercase());

    let kind = match type_tag.as_deref() {
        Some("source") => NodeKind::Source {
            origin: f
                .get("source_id", &["sourceId", "source"])
                .map(decode_source_origin)
                .unwrap_or(SourceOrigin::Unknown),
            sub_label: f.string("sub_label", &["subLabel"]),
        },
        Some("bus") => NodeKind::Bus {
            bus_id: f.string("bus_id", &["busId"]).unwrap_or_default(),
            plugins: f
                .get("plugins", &[])
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(decode_plugin)
                .collect(),
        },
        Some("sink") => NodeKind::Sink {
            sink: f.get("sink", &[]).and_then(decode_sink),
        },
        other => {
            log::warn!("[graph] decode: node {} has unknown type {:?}", handle, other);
            NodeKind::unknown_source()
        }
    };

    let port_count = f.u8("port_count", &["portCount"]).unwrap_or(match &kind {
        NodeKind::Sink { sink: Some(sink) } => sink.channel_count,
        _ => 2,
    });

    Some(NodeDescriptor {
        handle,
        stable_id: f.string("stable_id", &["stableId"]),
        kind,
        port_count,
        label: f.string("label", &["name"]).unwrap_or_default(),
        shape: f.shape(),
    })
}

fn decode_source_origin(value: &Value) -> SourceOrigin {
    let Some(obj) = value.as_object() else {
        return SourceOrigin::Unknown;
    };
    let f = Fields::new(obj);

    if let Some(tag) = f.string("type", &["kind"]) {
        return match tag.to_ascii_lowercase().as_str() {
            "prism" => f
                .u8("channel", &[])
                .map(|channel| SourceOrigin::Prism { channel })
                .unwrap_or(SourceOrigin::Unknown),
            "device" => match (f.u32("device_id", &["deviceId"]), f.u8("channel", &[])) {
                (Some(device_id), Some(channel)) => SourceOrigin::Device { device_id, channel },
                _ => SourceOrigin::Unknown,
            },
            _ => SourceOrigin::Unknown,
        };
    }

    // Externally tagged: {"prism": {"channel": 3}} / {"PrismChannel": {...}}
    if let Some(inner) = f.get("prism", &["PrismChannel"]).and_then(Value::as_object) {
        return Fields::new(inner)
            .u8("channel", &[])
            .map(|channel| SourceOrigin::Prism { channel })
            .unwrap_or(SourceOrigin::Unknown);
    }
    if let Some(inner) = f.get("device", &["InputDevice"]).and_then(Value::as_object) {
        let inner = Fields::new(inner);
        if let (Some(device_id), Some(channel)) =
            (inner.u32("device_id", &["deviceId"]), inner.u8("channel", &[]))
        {
            return SourceOrigin::Device { device_id, channel };
        }
    }

    SourceOrigin::Unknown
}

fn decode_sink(value: &Value) -> Option<SinkId> {
    let f = Fields::new(value.as_object()?);
    let device_id = f.u32("device_id", &["deviceId"])?;
    Some(SinkId {
        device_id,
        channel_offset: f.u8("channel_offset", &["channelOffset"]).unwrap_or(0),
        channel_count: f.u8("channel_count", &["channelCount"]).unwrap_or(2),
    })
}

fn decode_plugin(value: &Value) -> Option<PluginInstance> {
    let f = Fields::new(value.as_object()?);
    let instance_id = f.string("instance_id", &["instanceId"])?;
    let plugin_id = f.string("plugin_id", &["pluginId"])?;
    Some(PluginInstance {
        name: f.string("name", &[]).unwrap_or_else(|| plugin_id.clone()),
        manufacturer: f.string("manufacturer", &[]).unwrap_or_default(),
        enabled: f.bool("enabled", &[]).unwrap_or(true),
        instance_id,
        plugin_id,
    })
}

pub fn decode_edge(value: &Value) -> Option<Edge> {
    let f = Fields::new(value.as_object()?);
    let id = f.u32("id", &["edgeId", "edge_id"])?;
    let source = f.u32("source", &["source_handle", "sourceHandle"])?;
    let target = f.u32("target", &["target_handle", "targetHandle"])?;

    let edge = Edge::new(
        EdgeId::from(id),
        NodeHandle::from(source),
        PortId::new(f.u8("source_port", &["sourcePort"]).unwrap_or(0)),
        NodeHandle::from(target),
        PortId::new(f.u8("target_port", &["targetPort"]).unwrap_or(0)),
    );
    let gain = f.f64("gain", &[]).unwrap_or(1.0) as f32;
    let muted = f.bool("muted", &[]).unwrap_or(false);
    Some(edge.with_params(gain, muted))
}

// =============================================================================
// UI state
// =============================================================================

/// Decode a UI state payload (`getUiStateCache` / `restoreState`).
///
/// `null` means "nothing stored". Anything but an object is malformed.
pub fn decode_ui_state(value: &Value) -> SyncResult<Option<UiStateDescriptor>> {
    if value.is_null() {
        return Ok(None);
    }
    let obj = value.as_object().ok_or_else(|| {
        SyncError::MalformedResponse(format!("ui state is not an object: {}", kind_of(value)))
    })?;
    let f = Fields::new(obj);
    let mut out = UiStateDescriptor {
        version: f.u32("version", &[]).unwrap_or(0),
        ..UiStateDescriptor::default()
    };
    if out.version > UI_STATE_VERSION {
        log::warn!(
            "[state] decode: unknown ui state version {} (newest known {}), reading what fits",
            out.version,
            UI_STATE_VERSION
        );
    }

    if let Some(map) = f
        .get("node_positions", &["nodePositions", "positions"])
        .and_then(Value::as_object)
    {
        for (id, raw) in map {
            match decode_position(raw) {
                Some(pos) if !id.trim().is_empty() && !stable_id::is_sentinel(id) => {
                    out.positions.insert(id.clone(), pos);
                }
                _ => out.skipped += 1,
            }
        }
    }

    if let Some(map) = f
        .get("node_positions_by_handle", &["nodePositionsByHandle"])
        .and_then(Value::as_object)
    {
        if out.version < STABLE_KEYED_SINCE {
            for (key, raw) in map {
                match (key.trim().parse::<u32>().ok(), decode_position(raw)) {
                    (Some(handle), Some(pos)) => {
                        out.legacy_by_handle.insert(NodeHandle::from(handle), pos);
                    }
                    _ => out.skipped += 1,
                }
            }
        } else if !map.is_empty() {
            // Stable-keyed writers never produce these
            log::warn!(
                "[state] decode: version {} payload has {} handle-keyed positions, ignored",
                out.version,
                map.len()
            );
            out.skipped += map.len();
        }
    }

    if let Some(raw) = f.get("canvas_transform", &["canvasTransform", "canvas"]) {
        match decode_canvas(raw) {
            Some(canvas) => out.canvas = Some(canvas),
            None => out.skipped += 1,
        }
    }

    if out.skipped > 0 {
        log::warn!("[state] decode: skipped {} invalid ui state entries", out.skipped);
    }

    Ok(Some(out))
}

fn decode_position(value: &Value) -> Option<Position> {
    let f = Fields::new(value.as_object()?);
    let pos = Position::new(f.f64("x", &[])?, f.f64("y", &[])?);
    pos.is_finite().then_some(pos)
}

fn decode_canvas(value: &Value) -> Option<CanvasTransform> {
    let f = Fields::new(value.as_object()?);
    CanvasTransform::new(
        f.f64("x", &[]).unwrap_or(0.0),
        f.f64("y", &[]).unwrap_or(0.0),
        f.f64("scale", &["zoom"]).unwrap_or(1.0),
    )
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{GraphDto, NodeInfoDto, OutputSinkDto, SourceIdDto};
    use serde_json::json;

    #[test]
    fn test_current_shape() {
        let graph = GraphDto {
            nodes: vec![NodeInfoDto::Sink {
                handle: 9,
                stable_id: String::new(),
                sink: OutputSinkDto {
                    device_id: 42,
                    channel_offset: 2,
                    channel_count: 2,
                },
                port_count: 2,
                label: "Speakers".into(),
            }],
            edges: vec![],
        };
        let decoded = decode_graph(&serde_json::to_value(&graph).unwrap()).unwrap();
        let node = &decoded.nodes[0];
        assert_eq!(node.shape, PayloadShape::Current);
        assert_eq!(node.handle, NodeHandle::from(9));
        assert_eq!(node.resolve_stable_id(), "sink:42:2:2");
        assert_eq!(node.label, "Speakers");
    }

    #[test]
    fn test_legacy_shape_normalized() {
        let value = json!({
            "nodes": [{
                "kind": "source",
                "handle": "5",
                "sourceId": {"prism": {"channel": 3}},
                "portCount": 2,
                "name": "Music"
            }],
            "edges": [{
                "edgeId": 1,
                "sourceHandle": 5,
                "sourcePort": 1,
                "targetHandle": 6,
                "targetPort": 0,
                "gain": 0.5
            }]
        });
        let decoded = decode_graph(&value).unwrap();
        let node = &decoded.nodes[0];
        assert_eq!(node.shape, PayloadShape::Legacy);
        assert_eq!(node.resolve_stable_id(), "source:prism:3");
        assert_eq!(node.label, "Music");

        let edge = &decoded.edges[0];
        assert_eq!(edge.source_port, PortId::new(1));
        assert_eq!(edge.gain(), 0.5);
        assert!(!edge.muted);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let value = json!({
            "nodes": [
                {"type": "bus", "handle": 2},
                {"type": "mystery", "handle": 3},
                {"type": "sink", "handle": 4, "sink": {"device_id": 7, "channel_count": 8}},
                {"type": "source"}
            ],
            "edges": [
                {"id": 1, "source": 2, "target": 4, "gain": -2.0},
                {"id": 2, "source": 2}
            ]
        });
        let decoded = decode_graph(&value).unwrap();
        assert_eq!(decoded.nodes.len(), 3);
        assert_eq!(decoded.skipped_nodes, 1);
        assert_eq!(decoded.skipped_edges, 1);

        let bus = &decoded.nodes[0];
        assert_eq!(bus.port_count, 2);
        assert_eq!(bus.resolve_stable_id(), stable_id::UNKNOWN_STABLE_ID);

        assert_eq!(decoded.nodes[1].kind, NodeKind::unknown_source());
        assert_eq!(decoded.nodes[2].port_count, 8);
        assert_eq!(decoded.nodes[2].resolve_stable_id(), "sink:7:0:8");

        assert_eq!(decoded.edges[0].gain(), 0.0);
    }

    #[test]
    fn test_explicit_stable_id_kept() {
        let value = json!({
            "nodes": [{
                "type": "source",
                "handle": 1,
                "stable_id": "source:prism:12",
                "source_id": {"type": "prism", "channel": 0},
                "port_count": 2,
                "label": ""
            }]
        });
        let decoded = decode_graph(&value).unwrap();
        assert_eq!(decoded.nodes[0].resolve_stable_id(), "source:prism:12");
    }

    #[test]
    fn test_device_source() {
        let node = decode_node(&json!({
            "type": "source",
            "handle": 1,
            "source_id": serde_json::to_value(SourceIdDto::InputDevice { device_id: 80, channel: 1 }).unwrap()
        }))
        .unwrap();
        assert_eq!(node.resolve_stable_id(), "source:device:80:1");
    }

    #[test]
    fn test_graph_must_be_object() {
        assert!(matches!(
            decode_graph(&json!([1, 2])),
            Err(SyncError::MalformedResponse(_))
        ));
        assert!(decode_graph(&json!({})).unwrap().nodes.is_empty());
    }

    #[test]
    fn test_ui_state_version_gates_handle_keys() {
        let legacy = decode_ui_state(&json!({
            "version": 1,
            "node_positions_by_handle": {"4": {"x": 1.0, "y": 2.0}}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(legacy.version, 1);
        assert_eq!(legacy.legacy_by_handle[&NodeHandle::from(4)], Position::new(1.0, 2.0));

        let current = decode_ui_state(&json!({
            "version": 2,
            "node_positions": {"bus:a": {"x": 3.0, "y": 4.0}},
            "node_positions_by_handle": {"4": {"x": 1.0, "y": 2.0}}
        }))
        .unwrap()
        .unwrap();
        assert!(current.legacy_by_handle.is_empty());
        assert_eq!(current.skipped, 1);
        assert_eq!(current.positions.len(), 1);

        // Newer than we know: still read what fits
        let newer = decode_ui_state(&json!({
            "version": 7,
            "node_positions": {"bus:a": {"x": 3.0, "y": 4.0}},
            "futureField": true
        }))
        .unwrap()
        .unwrap();
        assert_eq!(newer.version, 7);
        assert_eq!(newer.positions["bus:a"], Position::new(3.0, 4.0));
    }

    #[test]
    fn test_ui_state_field_by_field() {
        let value = json!({
            "nodePositions": {
                "source:prism:3": {"x": 240.0, "y": 180.0},
                "bus:broken": {"x": "left", "y": 1.0},
                "source:unknown": {"x": 1.0, "y": 1.0}
            },
            "node_positions_by_handle": {"7": {"x": 5.0, "y": 6.0}, "nope": {"x": 1.0, "y": 1.0}},
            "canvasTransform": {"x": 10.0, "y": 20.0, "scale": 1.5}
        });
        let decoded = decode_ui_state(&value).unwrap().unwrap();
        assert_eq!(decoded.positions.len(), 1);
        assert_eq!(decoded.positions["source:prism:3"], Position::new(240.0, 180.0));
        assert_eq!(decoded.legacy_by_handle.len(), 1);
        assert_eq!(decoded.skipped, 3);
        assert_eq!(
            decoded.canvas,
            Some(CanvasTransform {
                x: 10.0,
                y: 20.0,
                scale: 1.5
            })
        );
    }

    #[test]
    fn test_ui_state_null_and_bad_canvas() {
        assert_eq!(decode_ui_state(&Value::Null).unwrap(), None);
        assert!(decode_ui_state(&json!("x")).is_err());

        let decoded = decode_ui_state(&json!({"canvas_transform": {"scale": 0}}))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.canvas, None);
        assert_eq!(decoded.skipped, 1);
    }
}
