//! Stable node identities (for persistence)
//!
//! Handles change on every engine restart; these keys do not. A key is a
//! pure function of what the node *is*:
//!
//! - `source:prism:<channel>`
//! - `source:device:<device_id>:<channel>`
//! - `bus:<bus_id>`
//! - `sink:<device_id>:<channel_offset>:<channel_count>`

use super::node::{NodeKind, SinkId, SourceOrigin};

/// Identity given to nodes we could not interpret.
///
/// Not unique. Nodes carrying it are positioned by handle and never persisted.
pub const UNKNOWN_STABLE_ID: &str = "source:unknown";

pub fn is_sentinel(stable_id: &str) -> bool {
    stable_id == UNKNOWN_STABLE_ID
}

pub fn for_source(origin: &SourceOrigin) -> String {
    match origin {
        SourceOrigin::Prism { channel } => format!("source:prism:{}", channel),
        SourceOrigin::Device { device_id, channel } => {
            format!("source:device:{}:{}", device_id, channel)
        }
        SourceOrigin::Unknown => UNKNOWN_STABLE_ID.to_string(),
    }
}

pub fn for_bus(bus_id: &str) -> String {
    let bus_id = bus_id.trim();
    if bus_id.is_empty() {
        return UNKNOWN_STABLE_ID.to_string();
    }
    format!("bus:{}", bus_id)
}

pub fn for_sink(sink: &SinkId) -> String {
    format!(
        "sink:{}:{}:{}",
        sink.device_id, sink.channel_offset, sink.channel_count
    )
}

/// Derive the stable id from the node's semantic fields alone
pub fn resolve_kind(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Source { origin, .. } => for_source(origin),
        NodeKind::Bus { bus_id, .. } => for_bus(bus_id),
        NodeKind::Sink { sink: Some(sink) } => for_sink(sink),
        NodeKind::Sink { sink: None } => UNKNOWN_STABLE_ID.to_string(),
    }
}

/// Resolve a node's stable id. A non-empty id supplied by the engine wins
/// over derivation.
pub fn resolve(explicit: Option<&str>, kind: &NodeKind) -> String {
    match explicit.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => resolve_kind(kind),
    }
}
