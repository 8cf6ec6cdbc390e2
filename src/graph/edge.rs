//! Edge (Send) - All level control happens here

use super::node::{NodeHandle, PortId};
use std::fmt;

/// Engine-assigned edge identifier, scoped to one engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for EdgeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EdgeId> for u32 {
    fn from(edge: EdgeId) -> Self {
        edge.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Linear gain as the engine accepts it: negative and NaN become 0
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.max(0.0)
    }
}

/// A send from a source port to a target port.
///
/// Sends-on-fader: the edge gain is the fader; there is no separate send
/// level.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeHandle,
    pub source_port: PortId,
    pub target: NodeHandle,
    pub target_port: PortId,
    /// Linear gain, always >= 0
    gain: f32,
    pub muted: bool,
}

impl Edge {
    pub fn new(
        id: EdgeId,
        source: NodeHandle,
        source_port: PortId,
        target: NodeHandle,
        target_port: PortId,
    ) -> Self {
        Self {
            id,
            source,
            source_port,
            target,
            target_port,
            gain: 1.0,
            muted: false,
        }
    }

    pub fn with_params(mut self, gain: f32, muted: bool) -> Self {
        self.set_gain(gain);
        self.muted = muted;
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set gain; negative and NaN collapse to 0
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_gain(gain);
    }

    /// Audible: not muted and gain above the silence threshold
    pub fn is_active(&self) -> bool {
        !self.muted && self.gain > 0.0001
    }

    pub fn touches(&self, handle: NodeHandle) -> bool {
        self.source == handle || self.target == handle
    }
}
