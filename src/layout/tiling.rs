//! Default placement for nodes that have no remembered position

use super::position::Position;
use crate::config::SyncConfig;

/// Row-major tiling: advance x by `step_x`, start a new row once x passes
/// `wrap_width`. The constants are presentation defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingPolicy {
    pub origin_x: f64,
    pub origin_y: f64,
    pub step_x: f64,
    pub step_y: f64,
    pub wrap_width: f64,
}

impl Default for TilingPolicy {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for TilingPolicy {
    fn from(config: &SyncConfig) -> Self {
        Self {
            origin_x: config.tile_origin_x,
            origin_y: config.tile_origin_y,
            step_x: config.tile_step_x,
            step_y: config.tile_step_y,
            wrap_width: config.tile_wrap_width,
        }
    }
}

/// Placement cursor over a `TilingPolicy`
#[derive(Debug, Clone)]
pub struct Tiler {
    policy: TilingPolicy,
    cursor: Position,
}

impl Tiler {
    pub fn new(policy: TilingPolicy) -> Self {
        Self {
            policy,
            cursor: Position::new(policy.origin_x, policy.origin_y),
        }
    }

    /// Hand out the next slot and advance
    pub fn next_position(&mut self) -> Position {
        let slot = self.cursor;
        self.cursor.x += self.policy.step_x;
        if self.cursor.x > self.policy.wrap_width {
            self.cursor.x = self.policy.origin_x;
            self.cursor.y += self.policy.step_y;
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_wrap_rows() {
        let mut tiler = Tiler::new(TilingPolicy {
            origin_x: 0.0,
            origin_y: 0.0,
            step_x: 100.0,
            step_y: 50.0,
            wrap_width: 250.0,
        });
        let slots: Vec<Position> = (0..4).map(|_| tiler.next_position()).collect();
        assert_eq!(
            slots,
            vec![
                Position::new(0.0, 0.0),
                Position::new(100.0, 0.0),
                Position::new(200.0, 0.0),
                Position::new(0.0, 50.0),
            ]
        );
    }
}
