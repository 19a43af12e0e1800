//! Region extraction: one frame, one box, one shift in, one fixed-size crop out.
//!
//! Near the frame edges the shifted box is clamped into the frame and the
//! clamped pixels are stretched back to the box size. Crops are never padded.

use arenacrop_job_model::region::CropBox;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::drift::Shift;

/// Decoded source frame (packed RGB, 8 bits per channel).
pub type Frame = RgbImage;

/// An in-bounds pixel rectangle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the rectangle has exactly the box's size (no stretch needed).
    pub fn matches_size(&self, region: &CropBox) -> bool {
        self.width == region.width() && self.height == region.height()
    }
}

/// Source rectangle read for `region` displaced by `shift` on a frame of
/// the given size.
///
/// The top-left corner is clamped into `[0, w-1] x [0, h-1]`; the
/// bottom-right corner is the clamped top-left plus the box size, clamped
/// to the frame while keeping at least one pixel on each axis.
pub fn crop_rect(frame_width: u32, frame_height: u32, region: &CropBox, shift: Shift) -> PixelRect {
    let (x, width) = clamp_axis(
        region.x1() as i64 + shift.dx,
        region.width() as i64,
        frame_width as i64,
    );
    let (y, height) = clamp_axis(
        region.y1() as i64 + shift.dy,
        region.height() as i64,
        frame_height as i64,
    );
    PixelRect {
        x,
        y,
        width,
        height,
    }
}

fn clamp_axis(start: i64, span: i64, limit: i64) -> (u32, u32) {
    let start = start.clamp(0, (limit - 1).max(0));
    let end = (start + span).min(limit).max(start + 1);
    (start as u32, (end - start) as u32)
}

/// Crop `region` displaced by `shift` out of `frame`.
///
/// The result is always exactly `region.width() x region.height()`.
pub fn extract(frame: &Frame, region: &CropBox, shift: Shift) -> Frame {
    let (target_w, target_h) = (region.width(), region.height());
    if frame.width() == 0 || frame.height() == 0 {
        return Frame::new(target_w, target_h);
    }

    let rect = crop_rect(frame.width(), frame.height(), region, shift);
    let crop = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    if rect.matches_size(region) {
        crop
    } else {
        imageops::resize(&crop, target_w, target_h, FilterType::Triangle)
    }
}
