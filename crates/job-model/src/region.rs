//! Crop boxes and points in source-pixel coordinates.

use serde::{Deserialize, Serialize};

/// A point in source-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Map a point on a scaled display back to source pixels.
    ///
    /// Truncates toward zero; negative display coordinates map to 0.
    pub fn from_display(x: f64, y: f64, display_scale: f64) -> Self {
        let to_source = |v: f64| (v / display_scale).max(0.0) as u32;
        Self {
            x: to_source(x),
            y: to_source(y),
        }
    }
}

/// Positional name of the box at `index`: `A`..`Z`, then `A27`, `A28`, ...
pub fn box_name(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        format!("A{}", index + 1)
    }
}

/// Errors raised when constructing a region.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("Degenerate box ({x1},{y1})-({x2},{y2}): corners must satisfy x2>x1 and y2>y1")]
    Degenerate { x1: u32, y1: u32, x2: u32, y2: u32 },
}

/// A fixed-size axis-aligned region of interest assigned to one subject.
///
/// The invariant `x2 > x1 && y2 > y1` holds for every value of this type;
/// width and height never change once the box exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCropBox", into = "RawCropBox")]
pub struct CropBox {
    id: String,
    label: String,
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl CropBox {
    /// Create a box from explicit corners.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
    ) -> Result<Self, RegionError> {
        if x2 <= x1 || y2 <= y1 {
            return Err(RegionError::Degenerate { x1, y1, x2, y2 });
        }
        Ok(Self {
            id: id.into(),
            label: label.into(),
            x1,
            y1,
            x2,
            y2,
        })
    }

    /// Create a box from two opposite corners given in any order.
    pub fn from_corners(
        id: impl Into<String>,
        label: impl Into<String>,
        a: Point,
        b: Point,
    ) -> Result<Self, RegionError> {
        Self::new(
            id,
            label,
            a.x.min(b.x),
            a.y.min(b.y),
            a.x.max(b.x),
            a.y.max(b.y),
        )
    }

    /// Same geometry under a different id and label.
    pub fn relabeled(&self, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn x2(&self) -> u32 {
        self.x2
    }

    pub fn y2(&self) -> u32 {
        self.y2
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Corners `(x1, y1, x2, y2)` after adding a signed offset. No clamping.
    pub fn displaced(&self, dx: i64, dy: i64) -> (i64, i64, i64, i64) {
        (
            self.x1 as i64 + dx,
            self.y1 as i64 + dy,
            self.x2 as i64 + dx,
            self.y2 as i64 + dy,
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RawCropBox {
    id: String,
    #[serde(default)]
    label: String,
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl TryFrom<RawCropBox> for CropBox {
    type Error = RegionError;

    fn try_from(raw: RawCropBox) -> Result<Self, Self::Error> {
        CropBox::new(raw.id, raw.label, raw.x1, raw.y1, raw.x2, raw.y2)
    }
}

impl From<CropBox> for RawCropBox {
    fn from(b: CropBox) -> Self {
        Self {
            id: b.id,
            label: b.label,
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_box_dimensions() {
        let b = CropBox::new("A", "rat01", 10, 10, 110, 60).unwrap();
        assert_eq!(b.width(), 100);
        assert_eq!(b.height(), 50);
    }

    #[test]
    fn test_degenerate_box_rejected() {
        assert!(CropBox::new("A", "", 10, 10, 10, 20).is_err());
        assert!(CropBox::new("A", "", 10, 20, 30, 5).is_err());
    }

    #[test]
    fn test_from_corners_normalizes() {
        let b = CropBox::from_corners("B", "", Point::new(110, 80), Point::new(10, 20)).unwrap();
        assert_eq!((b.x1(), b.y1(), b.x2(), b.y2()), (10, 20, 110, 80));
    }

    #[test]
    fn test_from_display_scales_and_truncates() {
        let p = Point::from_display(50.7, 21.0, 0.5);
        assert_eq!(p, Point::new(101, 42));
        assert_eq!(Point::from_display(-3.0, 4.0, 0.5), Point::new(0, 8));
    }

    #[test]
    fn test_box_names() {
        assert_eq!(box_name(0), "A");
        assert_eq!(box_name(14), "O");
        assert_eq!(box_name(25), "Z");
        assert_eq!(box_name(26), "A27");
    }

    #[test]
    fn test_deserialize_validates_invariant() {
        let ok: CropBox =
            serde_json::from_str(r#"{"id":"A","label":"x","x1":0,"y1":0,"x2":4,"y2":4}"#)
                .unwrap();
        assert_eq!(ok.width(), 4);

        let bad = serde_json::from_str::<CropBox>(
            r#"{"id":"A","label":"x","x1":4,"y1":0,"x2":4,"y2":4}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_displaced_keeps_size() {
        let b = CropBox::new("A", "", 10, 10, 110, 110).unwrap();
        let (x1, y1, x2, y2) = b.displaced(-15, 3);
        assert_eq!((x1, y1), (-5, 13));
        assert_eq!(x2 - x1, 100);
        assert_eq!(y2 - y1, 100);
    }

    proptest! {
        #[test]
        fn corners_in_any_order_give_same_box(
            ax in 0u32..4096,
            ay in 0u32..4096,
            bx in 0u32..4096,
            by in 0u32..4096,
        ) {
            let forward = CropBox::from_corners("A", "", Point::new(ax, ay), Point::new(bx, by));
            let backward = CropBox::from_corners("A", "", Point::new(bx, by), Point::new(ax, ay));
            prop_assert_eq!(forward.clone(), backward);
            match forward {
                Ok(b) => {
                    prop_assert_eq!(b.width(), ax.abs_diff(bx));
                    prop_assert_eq!(b.height(), ay.abs_diff(by));
                }
                Err(_) => prop_assert!(ax == bx || ay == by),
            }
        }
    }
}
