//! Measured camera drift.

use serde::{Deserialize, Serialize};

use crate::region::Point;

/// Total displacement of the scene between frame 0 and the last usable
/// frame, in signed source pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriftVector {
    pub dx: i64,
    pub dy: i64,
}

impl DriftVector {
    /// No drift.
    pub const ZERO: DriftVector = DriftVector { dx: 0, dy: 0 };

    pub fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    /// Drift from a reference point on the first frame to the same scene
    /// point on the last frame (`end - start`).
    pub fn between(start: Point, end: Point) -> Self {
        Self {
            dx: end.x as i64 - start.x as i64,
            dy: end.y as i64 - start.y as i64,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}
