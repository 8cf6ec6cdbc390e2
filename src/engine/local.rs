//! In-process engine
//!
//! Implements the engine command surface without any audio: graph
//! bookkeeping, the fast UI cache, and disk-backed persist/restore of
//! `graph_state.json`. Used for headless runs and as the reference engine in
//! tests.

use super::{EngineClient, EngineError, EngineResult};
use crate::api::dto::*;
use crate::graph::node::{SinkId, SourceOrigin};
use crate::graph::stable_id;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const STATE_FILE: &str = "graph_state.json";
const GRAPH_STATE_VERSION: u32 = 2;

/// On-disk format: the graph plus the editor's UI state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphStateDto {
    version: u32,
    nodes: Vec<NodeInfoDto>,
    edges: Vec<EdgeInfoDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ui_state: Option<UIStateDto>,
}

struct LocalState {
    nodes: BTreeMap<NodeHandle, NodeInfoDto>,
    edges: Vec<EdgeInfoDto>,
    next_handle: u32,
    next_edge_id: u32,
    ui_cache: Option<UIStateDto>,
}

impl LocalState {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            next_handle: 1, // Start from 1 (0 is reserved)
            next_edge_id: 1,
            ui_cache: None,
        }
    }

    fn alloc_handle(&mut self) -> NodeHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn alloc_edge_id(&mut self) -> EdgeId {
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        id
    }

    fn find_by_stable_id(&self, target: &str) -> Option<NodeHandle> {
        self.nodes
            .values()
            .find(|n| n.stable_id() == target)
            .map(|n| n.handle())
    }

    /// Replace every node with a fresh handle, remapping edges. Edges whose
    /// endpoints vanish are dropped.
    fn reissue(&mut self, nodes: Vec<NodeInfoDto>, edges: Vec<EdgeInfoDto>) -> HashMap<NodeHandle, NodeHandle> {
        let mut remap = HashMap::new();
        self.nodes.clear();
        self.edges.clear();

        for mut node in nodes {
            let new_handle = self.alloc_handle();
            remap.insert(node.handle(), new_handle);
            node.set_handle(new_handle);
            self.nodes.insert(new_handle, node);
        }

        for edge in edges {
            let (Some(&source), Some(&target)) = (remap.get(&edge.source), remap.get(&edge.target)) else {
                continue;
            };
            let id = self.alloc_edge_id();
            self.edges.push(EdgeInfoDto {
                id,
                source,
                target,
                ..edge
            });
        }

        remap
    }
}

pub struct LocalEngine {
    state: Mutex<LocalState>,
    state_dir: Option<PathBuf>,
    started: Instant,
    persist_seq: AtomicU64,
    restore_seq: AtomicU64,
}

impl LocalEngine {
    /// Engine that persists under `state_dir` (no persistence when `None`)
    pub fn new(state_dir: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(LocalState::new()),
            state_dir,
            started: Instant::now(),
            persist_seq: AtomicU64::new(0),
            restore_seq: AtomicU64::new(0),
        }
    }

    pub fn with_state_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Some(dir.into()))
    }

    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|d| d.join(STATE_FILE))
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().edges.len()
    }

    /// Simulate an engine restart: every node gets a new handle, every edge a
    /// new id, and the non-durable UI cache is lost.
    ///
    /// Returns old handle -> new handle.
    pub fn simulate_restart(&self) -> HashMap<NodeHandle, NodeHandle> {
        let mut state = self.state.lock();
        let nodes: Vec<NodeInfoDto> = std::mem::take(&mut state.nodes).into_values().collect();
        let edges = std::mem::take(&mut state.edges);
        state.ui_cache = None;
        let remap = state.reissue(nodes, edges);
        log::info!("[engine] restart: reissued {} node handles", remap.len());
        remap
    }

    fn uptime_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn graph_dto(&self) -> GraphDto {
        let state = self.state.lock();
        GraphDto {
            nodes: state.nodes.values().cloned().collect(),
            edges: state.edges.clone(),
        }
    }

    fn read_state_file(path: &Path) -> EngineResult<Option<GraphStateDto>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str::<GraphStateDto>(&json)?))
    }
}

impl EngineClient for LocalEngine {
    async fn get_graph(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self.graph_dto())?)
    }

    async fn add_source_node(&self, source_id: SourceIdDto, label: Option<String>) -> EngineResult<u32> {
        let origin = SourceOrigin::from(source_id.clone());
        let target_stable_id = stable_id::for_source(&origin);
        let mut state = self.state.lock();

        // De-dup: one node per logical source (Prism channel / device input)
        if let Some(existing) = state.find_by_stable_id(&target_stable_id) {
            log::debug!(
                "[engine] add_source_node de-dup: source_id={:?} -> existing_handle={}",
                source_id, existing
            );
            return Ok(existing);
        }

        let label = label.unwrap_or_else(|| match &source_id {
            SourceIdDto::PrismChannel { channel } => format!("Prism Ch {}", channel),
            SourceIdDto::InputDevice { device_id, channel } => format!("Input {}/{}", device_id, channel),
        });
        let handle = state.alloc_handle();
        state.nodes.insert(
            handle,
            NodeInfoDto::Source {
                handle,
                stable_id: target_stable_id,
                source_id,
                port_count: 2,
                label,
                sub_label: None,
            },
        );
        Ok(handle)
    }

    async fn add_bus_node(&self, label: Option<String>, port_count: Option<u8>) -> EngineResult<u32> {
        let port_count = port_count.unwrap_or(2).max(1);
        let mut state = self.state.lock();

        // De-dup: (label + port_count) is the logical identity of a bus
        if let Some(label) = &label {
            let existing = state.nodes.values().find(|n| {
                matches!(n, NodeInfoDto::Bus { .. }) && n.label() == label && n.port_count() == port_count
            });
            if let Some(existing) = existing {
                log::debug!(
                    "[engine] add_bus_node de-dup: label={:?} port_count={} -> existing_handle={}",
                    label,
                    port_count,
                    existing.handle()
                );
                return Ok(existing.handle());
            }
        }

        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let bus_id = format!("bus_{}", &uuid[..8]);
        let handle = state.alloc_handle();
        let label = label.unwrap_or_else(|| format!("Bus {}", handle));
        state.nodes.insert(
            handle,
            NodeInfoDto::Bus {
                handle,
                stable_id: stable_id::for_bus(&bus_id),
                bus_id,
                label,
                port_count,
                plugins: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn add_sink_node(&self, sink: OutputSinkDto, label: Option<String>) -> EngineResult<u32> {
        let target_stable_id = stable_id::for_sink(&SinkId::from(sink));
        let mut state = self.state.lock();

        // De-dup: one node per logical sink (device + offset + count)
        if let Some(existing) = state.find_by_stable_id(&target_stable_id) {
            log::debug!(
                "[engine] add_sink_node de-dup: sink={:?} -> existing_handle={}",
                sink, existing
            );
            return Ok(existing);
        }

        let handle = state.alloc_handle();
        state.nodes.insert(
            handle,
            NodeInfoDto::Sink {
                handle,
                stable_id: target_stable_id,
                sink,
                port_count: sink.channel_count,
                label: label.unwrap_or_else(|| format!("Output {}", sink.device_id)),
            },
        );
        Ok(handle)
    }

    async fn remove_node(&self, handle: u32) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.nodes.remove(&handle).is_none() {
            return Err(EngineError::Rejected(format!("Node {} not found", handle)));
        }
        state.edges.retain(|e| e.source != handle && e.target != handle);
        Ok(())
    }

    async fn add_edge(
        &self,
        source: u32,
        source_port: u8,
        target: u32,
        target_port: u8,
        gain: f32,
        muted: bool,
    ) -> EngineResult<u32> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&source) || !state.nodes.contains_key(&target) {
            return Err(EngineError::Rejected(
                "Failed to add edge (nodes may not exist or edge already exists)".to_string(),
            ));
        }
        let exists = state.edges.iter().any(|e| {
            e.source == source
                && e.source_port == source_port
                && e.target == target
                && e.target_port == target_port
        });
        if exists {
            return Err(EngineError::Rejected(
                "Failed to add edge (nodes may not exist or edge already exists)".to_string(),
            ));
        }

        let id = state.alloc_edge_id();
        state.edges.push(EdgeInfoDto {
            id,
            source,
            source_port,
            target,
            target_port,
            gain: gain.max(0.0),
            muted,
        });
        log::debug!(
            "[engine] add_edge ok: edge_id={} {}:{} -> {}:{}",
            id, source, source_port, target, target_port
        );
        Ok(id)
    }

    async fn remove_edge(&self, id: u32) -> EngineResult<()> {
        let mut state = self.state.lock();
        let before = state.edges.len();
        state.edges.retain(|e| e.id != id);
        if state.edges.len() == before {
            return Err(EngineError::Rejected(format!("Edge {} not found", id)));
        }
        Ok(())
    }

    async fn set_edge_gain(&self, id: u32, gain: f32) -> EngineResult<()> {
        let mut state = self.state.lock();
        let edge = state
            .edges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| EngineError::Rejected(format!("Edge {} not found", id)))?;
        edge.gain = gain.max(0.0);
        Ok(())
    }

    async fn set_edge_muted(&self, id: u32, muted: bool) -> EngineResult<()> {
        let mut state = self.state.lock();
        let edge = state
            .edges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| EngineError::Rejected(format!("Edge {} not found", id)))?;
        edge.muted = muted;
        Ok(())
    }

    async fn get_ui_state_cache(&self) -> EngineResult<Option<Value>> {
        let cache = self.state.lock().ui_cache.clone();
        cache.map(|ui| serde_json::to_value(ui).map_err(EngineError::from)).transpose()
    }

    async fn set_ui_state_cache(&self, state: UIStateDto) -> EngineResult<()> {
        self.state.lock().ui_cache = Some(state);
        Ok(())
    }

    async fn persist_state(&self, ui_state: UIStateDto) -> EngineResult<()> {
        let call_id = self.persist_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let uptime = self.uptime_ms();

        let dir = self
            .state_dir
            .as_ref()
            .ok_or_else(|| EngineError::Io("Could not find app data directory".to_string()))?;
        fs::create_dir_all(dir)?;
        let state_file = dir.join(STATE_FILE);

        let graph = self.graph_dto();
        let mut state = GraphStateDto {
            version: GRAPH_STATE_VERSION,
            nodes: graph.nodes,
            edges: graph.edges,
            ui_state: Some(ui_state),
        };

        // Never clobber a non-empty on-disk graph with an empty one
        if state.nodes.is_empty() && state.edges.is_empty() {
            if let Ok(Some(existing)) = Self::read_state_file(&state_file) {
                if !existing.nodes.is_empty() || !existing.edges.is_empty() {
                    log::info!(
                        "[engine] persist#{} @{}ms: refusing to clobber non-empty graph with empty snapshot; updating ui_state only",
                        call_id, uptime
                    );
                    state.nodes = existing.nodes;
                    state.edges = existing.edges;
                }
            }
        }

        log::info!(
            "[engine] persist#{} @{}ms: writing {} (nodes={} edges={})",
            call_id,
            uptime,
            state_file.display(),
            state.nodes.len(),
            state.edges.len()
        );

        let json = serde_json::to_string_pretty(&state)?;
        fs::write(&state_file, json)?;
        Ok(())
    }

    async fn restore_state(&self) -> EngineResult<Option<Value>> {
        let call_id = self.restore_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let uptime = self.uptime_ms();

        let Some(state_file) = self.state_file() else {
            return Ok(None);
        };
        let Some(mut saved) = Self::read_state_file(&state_file)? else {
            log::info!("[engine] restore#{} @{}ms: no {} found", call_id, uptime, STATE_FILE);
            return Ok(None);
        };

        log::info!(
            "[engine] restore#{} @{}ms: parsed {} (version={} nodes={} edges={})",
            call_id,
            uptime,
            STATE_FILE,
            saved.version,
            saved.nodes.len(),
            saved.edges.len()
        );

        // Older files may lack stable ids
        for node in &mut saved.nodes {
            if node.stable_id().trim().is_empty() {
                let computed = match &*node {
                    NodeInfoDto::Source { source_id, .. } => {
                        stable_id::for_source(&SourceOrigin::from(source_id.clone()))
                    }
                    NodeInfoDto::Bus { bus_id, .. } => stable_id::for_bus(bus_id),
                    NodeInfoDto::Sink { sink, .. } => stable_id::for_sink(&SinkId::from(*sink)),
                };
                match node {
                    NodeInfoDto::Source { stable_id, .. }
                    | NodeInfoDto::Bus { stable_id, .. }
                    | NodeInfoDto::Sink { stable_id, .. } => *stable_id = computed,
                }
            }
        }

        // Handle-keyed positions belong to the handles in this file, which
        // are about to be reissued; rekey them by stable id now.
        if let Some(ui) = saved.ui_state.as_mut() {
            if !ui.node_positions_by_handle.is_empty() {
                let handle_to_stable: HashMap<NodeHandle, String> = saved
                    .nodes
                    .iter()
                    .map(|node| (node.handle(), node.stable_id().to_string()))
                    .collect();

                let mut converted = 0usize;
                for (handle, pos) in &ui.node_positions_by_handle {
                    let Some(stable) = handle_to_stable.get(handle) else {
                        continue;
                    };
                    if stable_id::is_sentinel(stable) || ui.node_positions.contains_key(stable) {
                        continue;
                    }
                    ui.node_positions.insert(stable.clone(), *pos);
                    converted += 1;
                }
                log::info!(
                    "[engine] restore#{} @{}ms: converted handle-keyed positions {}/{}",
                    call_id,
                    uptime,
                    converted,
                    ui.node_positions_by_handle.len()
                );
                ui.node_positions_by_handle.clear();
            }
        }

        // A freshly started engine rebuilds its graph from disk
        {
            let mut state = self.state.lock();
            if state.nodes.is_empty() && !saved.nodes.is_empty() {
                let remap = state.reissue(saved.nodes, saved.edges);
                log::info!(
                    "[engine] restore#{} @{}ms: loaded graph nodes={} edges={}",
                    call_id,
                    uptime,
                    remap.len(),
                    state.edges.len()
                );
            }
        }

        saved
            .ui_state
            .map(|ui| serde_json::to_value(ui).map_err(EngineError::from))
            .transpose()
    }
}
