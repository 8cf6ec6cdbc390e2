//! PositionStore - source of truth for layout
//!
//! Keyed by stable id, so it outlives engine restarts and mirror rebuilds.
//! Every position or canvas change goes through `set`/`set_canvas`, which
//! is what raises the dirty flag the save path keys off.

use super::position::{CanvasTransform, Position, UiStateSnapshot};
use crate::graph::stable_id;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct PositionStore {
    positions: BTreeMap<String, Position>,
    canvas: CanvasTransform,
    dirty: bool,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stable_id: &str) -> Option<Position> {
        self.positions.get(stable_id).copied()
    }

    pub fn contains(&self, stable_id: &str) -> bool {
        self.positions.contains_key(stable_id)
    }

    /// Store a position. Returns `false` (and stores nothing) for the
    /// sentinel identity or a non-finite position.
    pub fn set(&mut self, stable_id: &str, position: Position) -> bool {
        if stable_id::is_sentinel(stable_id) || stable_id.is_empty() || !position.is_finite() {
            return false;
        }
        let prev = self.positions.insert(stable_id.to_string(), position);
        if prev != Some(position) {
            self.dirty = true;
        }
        true
    }

    pub fn delete(&mut self, stable_id: &str) -> Option<Position> {
        let removed = self.positions.remove(stable_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn canvas(&self) -> CanvasTransform {
        self.canvas
    }

    /// Set the canvas transform. Invalid transforms (scale <= 0) are ignored.
    pub fn set_canvas(&mut self, canvas: CanvasTransform) -> bool {
        if !canvas.is_valid() {
            return false;
        }
        if self.canvas != canvas {
            self.canvas = canvas;
            self.dirty = true;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn snapshot(&self) -> UiStateSnapshot {
        UiStateSnapshot {
            positions: self.positions.clone(),
            canvas: self.canvas,
        }
    }

    /// Merge a restored snapshot. Entries that fail validation are skipped
    /// one by one. Restoring does not raise the dirty flag.
    ///
    /// Returns the number of positions taken over.
    pub fn load_from(&mut self, snapshot: UiStateSnapshot) -> usize {
        let mut loaded = 0;
        for (id, pos) in snapshot.positions {
            if stable_id::is_sentinel(&id) || id.is_empty() || !pos.is_finite() {
                continue;
            }
            self.positions.insert(id, pos);
            loaded += 1;
        }
        if snapshot.canvas.is_valid() {
            self.canvas = snapshot.canvas;
        }
        loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
