//! Canvas layout values

use std::collections::BTreeMap;

/// Node position in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Canvas pan/zoom. `scale` is always > 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

impl CanvasTransform {
    pub fn new(x: f64, y: f64, scale: f64) -> Option<Self> {
        let t = Self { x, y, scale };
        t.is_valid().then_some(t)
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.scale.is_finite() && self.scale > 0.0
    }
}

/// Everything the layout persists: positions keyed by stable id plus the
/// canvas transform. Unit of both the fast cache and the durable save.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UiStateSnapshot {
    pub positions: BTreeMap<String, Position>,
    pub canvas: CanvasTransform,
}

impl UiStateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.canvas == CanvasTransform::default()
    }
}
