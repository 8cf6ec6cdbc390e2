//! GraphMirror - local copy of the engine graph
//!
//! Every refresh rebuilds the node and edge maps from a full engine snapshot
//! and publishes them in one swap, so readers only ever see a complete
//! graph. Layout is not stored here: positions live in the `PositionStore`
//! under stable ids and are looked up (or allocated) during the rebuild.
//!
//! Local edits are applied optimistically and reconciled by the next
//! refresh. Applying one invalidates refreshes that were already in flight,
//! so a slow, older snapshot cannot undo it.

use super::edge::{Edge, EdgeId};
use super::node::{Node, NodeHandle};
use super::stable_id;
use crate::api::decode::{decode_graph, GraphDescriptor};
use crate::engine::{Availability, EngineClient};
use crate::error::{SyncError, SyncResult};
use crate::layout::position::Position;
use crate::layout::tiling::{Tiler, TilingPolicy};
use crate::layout::SharedStore;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Immutable view of the mirrored graph
#[derive(Debug, Clone, Default)]
pub struct MirrorSnapshot {
    nodes: BTreeMap<NodeHandle, Node>,
    edges: BTreeMap<EdgeId, Edge>,
}

impl MirrorSnapshot {
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(&handle)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges that currently pass signal
    pub fn active_edge_count(&self) -> usize {
        self.edges.values().filter(|e| e.is_active()).count()
    }

    pub fn edges_touching(&self, handle: NodeHandle) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.touches(handle))
    }

    /// Edges ending at `handle`
    pub fn incoming_edges(&self, handle: NodeHandle) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.target == handle)
    }

    /// Edges leaving `handle`
    pub fn outgoing_edges(&self, handle: NodeHandle) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.source == handle)
    }

    pub fn find_by_stable_id(&self, stable_id: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.stable_id == stable_id)
    }
}

/// Key for a position recorded at creation time, before the first refresh
/// that returns the node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Stable(String),
    /// Used when the stable id is not known yet (buses get their id from
    /// the engine)
    Handle(NodeHandle),
}

struct MirrorInner {
    handle_to_stable: HashMap<NodeHandle, String>,
    pending: HashMap<PendingKey, Position>,
    /// Handle-keyed positions for nodes with the sentinel identity
    ephemeral: HashMap<NodeHandle, Position>,
    tiler: Tiler,
    issued: u64,
    applied: u64,
}

pub struct GraphMirror<E> {
    engine: Arc<E>,
    availability: Availability,
    store: SharedStore,
    published: ArcSwap<MirrorSnapshot>,
    inner: Mutex<MirrorInner>,
}

impl<E: EngineClient> GraphMirror<E> {
    pub fn new(engine: Arc<E>, availability: Availability, store: SharedStore, tiling: TilingPolicy) -> Self {
        Self {
            engine,
            availability,
            store,
            published: ArcSwap::from_pointee(MirrorSnapshot::default()),
            inner: Mutex::new(MirrorInner {
                handle_to_stable: HashMap::new(),
                pending: HashMap::new(),
                ephemeral: HashMap::new(),
                tiler: Tiler::new(tiling),
                issued: 0,
                applied: 0,
            }),
        }
    }

    /// Fetch the full graph and replace the mirror.
    ///
    /// On any failure the previous mirror stays as it was.
    pub async fn refresh(&self) -> SyncResult<()> {
        let ticket = {
            let mut inner = self.inner.lock();
            inner.issued += 1;
            inner.issued
        };

        let value = self.availability.observe(self.engine.get_graph().await)?;
        let decoded = decode_graph(&value)?;

        if !self.apply(ticket, decoded) {
            log::debug!("[graph] refresh #{} superseded, discarded", ticket);
        }
        Ok(())
    }

    /// Rebuild from a decoded snapshot. Returns `false` if the ticket is
    /// older than what is already applied.
    fn apply(&self, ticket: u64, decoded: GraphDescriptor) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if ticket <= inner.applied {
            return false;
        }

        let mut store = self.store.lock();
        let mut nodes = BTreeMap::new();
        let mut handle_to_stable = HashMap::new();
        let mut ephemeral = HashMap::new();
        let mut allocated = 0usize;

        for desc in decoded.nodes {
            let node = desc.into_node();
            let handle = node.handle;

            if stable_id::is_sentinel(&node.stable_id) {
                let pos = match inner.ephemeral.get(&handle).copied() {
                    Some(p) => p,
                    None => match inner.pending.remove(&PendingKey::Handle(handle)) {
                        Some(p) => p,
                        None => inner.tiler.next_position(),
                    },
                };
                ephemeral.insert(handle, pos);
            } else if !store.contains(&node.stable_id) {
                let pos = match inner.pending.remove(&PendingKey::Stable(node.stable_id.clone())) {
                    Some(p) => p,
                    None => match inner.pending.remove(&PendingKey::Handle(handle)) {
                        Some(p) => p,
                        None => {
                            allocated += 1;
                            inner.tiler.next_position()
                        }
                    },
                };
                store.set(&node.stable_id, pos);
            } else {
                inner.pending.remove(&PendingKey::Stable(node.stable_id.clone()));
                inner.pending.remove(&PendingKey::Handle(handle));
            }

            handle_to_stable.insert(handle, node.stable_id.clone());
            nodes.insert(handle, node);
        }

        let edges = decoded.edges.into_iter().map(|e| (e.id, e)).collect();

        inner.handle_to_stable = handle_to_stable;
        inner.ephemeral = ephemeral;
        inner.applied = ticket;
        drop(store);

        let snapshot = MirrorSnapshot { nodes, edges };
        log::debug!(
            "[graph] refresh #{} applied: nodes={} edges={} (active {}) new_positions={}",
            ticket,
            snapshot.node_count(),
            snapshot.edge_count(),
            snapshot.active_edge_count(),
            allocated
        );
        // Publish while still holding `inner` so optimistic edits serialize with us
        self.published.store(Arc::new(snapshot));
        true
    }

    /// Current published snapshot. Cheap; never blocks on a refresh.
    pub fn snapshot(&self) -> Arc<MirrorSnapshot> {
        self.published.load_full()
    }

    pub fn get_node(&self, handle: NodeHandle) -> Option<Node> {
        self.published.load().get_node(handle).cloned()
    }

    pub fn edges_touching(&self, handle: NodeHandle) -> Vec<Edge> {
        self.published.load().edges_touching(handle).cloned().collect()
    }

    pub fn incoming_edges(&self, handle: NodeHandle) -> Vec<Edge> {
        self.published.load().incoming_edges(handle).cloned().collect()
    }

    pub fn outgoing_edges(&self, handle: NodeHandle) -> Vec<Edge> {
        self.published.load().outgoing_edges(handle).cloned().collect()
    }

    pub fn stable_id_of(&self, handle: NodeHandle) -> Option<String> {
        self.inner.lock().handle_to_stable.get(&handle).cloned()
    }

    /// Where the node is drawn: its stored position, or its ephemeral one
    /// for sentinel-identity nodes
    pub fn position_of(&self, handle: NodeHandle) -> Option<Position> {
        let inner = self.inner.lock();
        if let Some(pos) = inner.ephemeral.get(&handle) {
            return Some(*pos);
        }
        let id = inner.handle_to_stable.get(&handle)?;
        self.store.lock().get(id)
    }

    /// Move a node. Returns `Ok(true)` when the change lands in the
    /// persisted layout, `Ok(false)` for handle-positioned (sentinel) nodes.
    pub fn set_position(&self, handle: NodeHandle, position: Position) -> SyncResult<bool> {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.ephemeral.get_mut(&handle) {
            *slot = position;
            return Ok(false);
        }
        let id = inner
            .handle_to_stable
            .get(&handle)
            .ok_or(SyncError::UnknownNode(handle.raw()))?;
        Ok(self.store.lock().set(id, position))
    }

    /// Remember where a just-created node should appear
    pub fn record_pending(&self, key: PendingKey, position: Position) {
        self.inner.lock().pending.insert(key, position);
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Drop pending entries that no refresh claimed. Returns how many were
    /// still waiting.
    pub fn discard_pending<'a>(&self, keys: impl IntoIterator<Item = &'a PendingKey>) -> usize {
        let mut inner = self.inner.lock();
        keys.into_iter()
            .filter(|k| inner.pending.remove(*k).is_some())
            .count()
    }

    /// Drop refreshes issued before now; a local edit is newer than them
    fn invalidate_in_flight(inner: &mut MirrorInner) {
        inner.applied = inner.issued;
    }

    /// Optimistically remove a node and its edges. Returns its stable id.
    pub fn forget_node(&self, handle: NodeHandle) -> Option<String> {
        let mut inner = self.inner.lock();
        Self::invalidate_in_flight(&mut inner);
        inner.ephemeral.remove(&handle);
        inner.pending.remove(&PendingKey::Handle(handle));
        let stable = inner.handle_to_stable.remove(&handle);

        let mut next = MirrorSnapshot::clone(&self.published.load());
        next.nodes.remove(&handle);
        next.edges.retain(|_, e| !e.touches(handle));
        self.published.store(Arc::new(next));
        stable
    }

    /// Optimistically insert or replace an edge
    pub fn upsert_edge(&self, edge: Edge) {
        let mut inner = self.inner.lock();
        Self::invalidate_in_flight(&mut inner);
        let mut next = MirrorSnapshot::clone(&self.published.load());
        next.edges.insert(edge.id, edge);
        self.published.store(Arc::new(next));
    }

    /// Optimistically change an edge in place. Returns `false` if unknown.
    pub fn update_edge(&self, id: EdgeId, f: impl FnOnce(&mut Edge)) -> bool {
        let mut inner = self.inner.lock();
        let mut next = MirrorSnapshot::clone(&self.published.load());
        let Some(edge) = next.edges.get_mut(&id) else {
            return false;
        };
        f(edge);
        Self::invalidate_in_flight(&mut inner);
        self.published.store(Arc::new(next));
        true
    }

    /// Optimistically remove an edge
    pub fn forget_edge(&self, id: EdgeId) -> Option<Edge> {
        let mut inner = self.inner.lock();
        let mut next = MirrorSnapshot::clone(&self.published.load());
        let removed = next.edges.remove(&id)?;
        Self::invalidate_in_flight(&mut inner);
        self.published.store(Arc::new(next));
        Some(removed)
    }
}
