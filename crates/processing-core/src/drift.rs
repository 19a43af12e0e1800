//! Constant-velocity drift model.
//!
//! The measured drift is spread linearly over the recording: frame `i` of
//! `total_frames` is displaced by `drift * i / total_frames`, truncated
//! toward zero on each axis independently. Frame 0 is never displaced and,
//! since only frames `0..total_frames` exist, the full drift vector is never
//! reached: the last frame sees `drift * (total_frames - 1) / total_frames`.

use arenacrop_job_model::drift::DriftVector;

/// Pixel offset applied to every box on one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Shift {
    pub dx: i64,
    pub dy: i64,
}

impl Shift {
    pub const NONE: Shift = Shift { dx: 0, dy: 0 };

    pub fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }
}

/// Offset of frame `frame_index` in a recording of `total_frames` frames.
///
/// Returns [`Shift::NONE`] for zero drift or a non-positive frame count.
/// Integer arithmetic only, so the result is exact and deterministic.
pub fn shift(frame_index: u64, total_frames: i64, drift: DriftVector) -> Shift {
    if drift.is_zero() || total_frames <= 0 {
        return Shift::NONE;
    }
    let along = |component: i64| -> i64 {
        (component as i128 * frame_index as i128 / total_frames as i128) as i64
    };
    Shift {
        dx: along(drift.dx),
        dy: along(drift.dy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_way_shift() {
        let s = shift(50, 100, DriftVector::new(20, 0));
        assert_eq!(s, Shift::new(10, 0));
    }

    #[test]
    fn test_first_frame_never_shifted() {
        assert_eq!(shift(0, 100, DriftVector::new(-37, 81)), Shift::NONE);
    }

    #[test]
    fn test_zero_drift_or_unknown_length() {
        assert_eq!(shift(42, 100, DriftVector::ZERO), Shift::NONE);
        assert_eq!(shift(42, 0, DriftVector::new(5, 5)), Shift::NONE);
        assert_eq!(shift(42, -3, DriftVector::new(5, 5)), Shift::NONE);
    }

    #[test]
    fn test_last_frame_stops_short_of_full_drift() {
        let drift = DriftVector::new(20, -20);
        assert_eq!(shift(99, 100, drift), Shift::new(19, -19));
        assert_eq!(shift(100, 100, drift), Shift::new(20, -20));
    }

    #[test]
    fn test_truncates_toward_zero() {
        assert_eq!(shift(1, 3, DriftVector::new(2, -2)), Shift::new(0, 0));
        assert_eq!(shift(2, 3, DriftVector::new(2, -2)), Shift::new(1, -1));
    }

    proptest! {
        #[test]
        fn shift_never_reverses(
            dx in -5_000i64..5_000,
            dy in -5_000i64..5_000,
            total in 1i64..20_000,
        ) {
            let drift = DriftVector::new(dx, dy);
            let mut prev = shift(0, total, drift);
            prop_assert_eq!(prev, Shift::NONE);
            let step = (total as u64 / 97).max(1);
            let mut i = step;
            while i < total as u64 {
                let s = shift(i, total, drift);
                prop_assert!(s.dx * dx.signum() >= prev.dx * dx.signum());
                prop_assert!(s.dy * dy.signum() >= prev.dy * dy.signum());
                prop_assert!(s.dx.abs() <= dx.abs() && s.dy.abs() <= dy.abs());
                prev = s;
                i += step;
            }
        }

        #[test]
        fn zero_drift_is_identity(frame in 0u64..1_000_000, total in -10i64..1_000_000) {
            prop_assert_eq!(shift(frame, total, DriftVector::ZERO), Shift::NONE);
        }
    }
}
