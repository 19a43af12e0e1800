//! Contrast enhancement for dark subjects on dark bedding.
//!
//! Contrast-limited adaptive histogram equalization (CLAHE) runs on the
//! CIE L*a*b* lightness channel only, so hues are kept. Each tile of the
//! grid gets its own clipped equalization table; pixels blend the tables of
//! the four nearest tile centres.

use arenacrop_common::error::{CropError, CropResult};
use image::Rgb;

use crate::extract::Frame;

const BINS: usize = 256;

/// CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceOptions {
    /// Histogram clip limit, relative to a flat histogram.
    pub clip_limit: f64,
    /// Tiles per axis.
    pub grid_size: u32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            clip_limit: 3.0,
            grid_size: 8,
        }
    }
}

impl EnhanceOptions {
    pub fn validate(&self) -> CropResult<()> {
        if !(self.clip_limit.is_finite() && self.clip_limit > 0.0) {
            return Err(CropError::config("clip limit must be positive"));
        }
        if self.grid_size == 0 {
            return Err(CropError::config("grid size must be at least 1"));
        }
        Ok(())
    }
}

/// Equalize the lightness of `frame`.
pub fn enhance(frame: &Frame, options: EnhanceOptions) -> Frame {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return frame.clone();
    }

    let lab: Vec<Lab> = frame.pixels().map(|p| Lab::from_rgb(*p)).collect();
    let lightness: Vec<u8> = lab.iter().map(|c| c.l8()).collect();
    let equalized = clahe(&lightness, width as usize, height as usize, options);

    let mut out = Frame::new(width, height);
    for ((pixel, color), l) in out.pixels_mut().zip(&lab).zip(equalized) {
        *pixel = color.with_l8(l).to_rgb();
    }
    out
}

/// Tile layout along one axis.
#[derive(Debug, Clone, Copy)]
struct Axis {
    size: usize,
    tiles: usize,
}

impl Axis {
    fn new(size: usize, grid: u32) -> Self {
        Self {
            size,
            tiles: (grid as usize).clamp(1, size),
        }
    }

    fn bounds(&self, tile: usize) -> (usize, usize) {
        (tile * self.size / self.tiles, (tile + 1) * self.size / self.tiles)
    }

    /// Neighbouring tiles of pixel `pos` and the weight of the second one.
    fn neighbours(&self, pos: usize) -> (usize, usize, f64) {
        let tile_len = self.size as f64 / self.tiles as f64;
        let g = (pos as f64 + 0.5) / tile_len - 0.5;
        if g <= 0.0 {
            return (0, 0, 0.0);
        }
        let first = (g.floor() as usize).min(self.tiles - 1);
        let second = (first + 1).min(self.tiles - 1);
        (first, second, (g - first as f64).clamp(0.0, 1.0))
    }
}

fn clahe(lightness: &[u8], width: usize, height: usize, options: EnhanceOptions) -> Vec<u8> {
    let xs = Axis::new(width, options.grid_size);
    let ys = Axis::new(height, options.grid_size);

    let mut tables = Vec::with_capacity(xs.tiles * ys.tiles);
    for ty in 0..ys.tiles {
        let (y0, y1) = ys.bounds(ty);
        for tx in 0..xs.tiles {
            let (x0, x1) = xs.bounds(tx);
            let mut histogram = [0u32; BINS];
            for y in y0..y1 {
                for &v in &lightness[y * width + x0..y * width + x1] {
                    histogram[v as usize] += 1;
                }
            }
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            tables.push(equalization_table(histogram, area, options.clip_limit));
        }
    }

    let table = |tx: usize, ty: usize| &tables[ty * xs.tiles + tx];
    let mut out = Vec::with_capacity(lightness.len());
    for y in 0..height {
        let (ty0, ty1, wy) = ys.neighbours(y);
        for x in 0..width {
            let (tx0, tx1, wx) = xs.neighbours(x);
            let v = lightness[y * width + x] as usize;
            let blend = |row: usize| {
                f64::from(table(tx0, row)[v]) * (1.0 - wx) + f64::from(table(tx1, row)[v]) * wx
            };
            let (top, bottom) = (blend(ty0), blend(ty1));
            out.push((top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8);
        }
    }
    out
}

/// Clip `histogram` at `clip_limit` times the flat level, spread the excess
/// over every bin, and integrate into a lookup table.
fn equalization_table(mut histogram: [u32; BINS], area: u32, clip_limit: f64) -> [u8; BINS] {
    let limit = ((clip_limit * f64::from(area) / BINS as f64) as u32).max(1);

    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    let per_bin = excess / BINS as u32;
    let mut residual = (excess % BINS as u32) as usize;
    for count in histogram.iter_mut() {
        *count += per_bin;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        for index in (0..BINS).step_by(step) {
            if residual == 0 {
                break;
            }
            histogram[index] += 1;
            residual -= 1;
        }
    }

    let scale = 255.0 / f64::from(area.max(1));
    let mut table = [0u8; BINS];
    let mut sum = 0u32;
    for (entry, count) in table.iter_mut().zip(histogram) {
        sum += count;
        *entry = (f64::from(sum) * scale).round().min(255.0) as u8;
    }
    table
}

/// CIE L*a*b* colour (D65 white point), L in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Lab {
    l: f64,
    a: f64,
    b: f64,
}

const WHITE_X: f64 = 0.950456;
const WHITE_Z: f64 = 1.088754;
const EPSILON: f64 = 0.008856;
const KAPPA: f64 = 903.3;

impl Lab {
    fn from_rgb(Rgb([r, g, b]): Rgb<u8>) -> Self {
        let (r, g, b) = (to_linear(r), to_linear(g), to_linear(b));
        let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / WHITE_X;
        let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
        let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / WHITE_Z;

        let f = |t: f64| {
            if t > EPSILON {
                t.cbrt()
            } else {
                7.787 * t + 16.0 / 116.0
            }
        };
        let l = if y > EPSILON {
            116.0 * y.cbrt() - 16.0
        } else {
            KAPPA * y
        };
        Self {
            l,
            a: 500.0 * (f(x) - f(y)),
            b: 200.0 * (f(y) - f(z)),
        }
    }

    fn l8(&self) -> u8 {
        (self.l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
    }

    fn with_l8(self, l: u8) -> Self {
        Self {
            l: f64::from(l) * 100.0 / 255.0,
            ..self
        }
    }

    fn to_rgb(self) -> Rgb<u8> {
        let fy = (self.l + 16.0) / 116.0;
        let fx = fy + self.a / 500.0;
        let fz = fy - self.b / 200.0;
        let inverse = |t: f64| {
            let cube = t * t * t;
            if cube > EPSILON {
                cube
            } else {
                (t - 16.0 / 116.0) / 7.787
            }
        };
        let y = if self.l > KAPPA * EPSILON {
            fy * fy * fy
        } else {
            self.l / KAPPA
        };
        let x = inverse(fx) * WHITE_X;
        let z = inverse(fz) * WHITE_Z;

        let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
        let g = -0.969256 * x + 1.875991 * y + 0.041556 * z;
        let b = 0.055648 * x - 0.204043 * y + 1.057311 * z;
        Rgb([from_linear(r), from_linear(g), from_linear(b)])
    }
}

fn to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn from_linear(c: f64) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let encoded = if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lightness_spread(frame: &Frame) -> u8 {
        let ls: Vec<u8> = frame.pixels().map(|p| Lab::from_rgb(*p).l8()).collect();
        ls.iter().max().unwrap() - ls.iter().min().unwrap()
    }

    #[test]
    fn test_lab_conversion_round_trips() {
        for color in [
            Rgb([0, 0, 0]),
            Rgb([255, 255, 255]),
            Rgb([200, 30, 90]),
            Rgb([12, 140, 60]),
            Rgb([40, 40, 200]),
        ] {
            let back = Lab::from_rgb(color).to_rgb();
            for (a, b) in color.0.iter().zip(back.0) {
                assert!(a.abs_diff(b) <= 1, "{color:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn test_dark_low_contrast_frame_gains_contrast() {
        let frame = Frame::from_fn(64, 48, |x, y| {
            let v = 20 + ((x + y) % 12) as u8;
            Rgb([v, v, v])
        });
        let enhanced = enhance(&frame, EnhanceOptions::default());
        assert_eq!(enhanced.dimensions(), frame.dimensions());
        assert!(lightness_spread(&enhanced) > lightness_spread(&frame));
    }

    #[test]
    fn test_gray_stays_gray() {
        let frame = Frame::from_fn(32, 32, |x, _| {
            let v = (x * 8) as u8;
            Rgb([v, v, v])
        });
        for p in enhance(&frame, EnhanceOptions::default()).pixels() {
            let [r, g, b] = p.0;
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "{p:?}");
        }
    }

    #[test]
    fn test_tiny_frames_use_fewer_tiles() {
        let frame = Frame::from_pixel(3, 2, Rgb([90, 60, 30]));
        let enhanced = enhance(&frame, EnhanceOptions::default());
        assert_eq!(enhanced.dimensions(), (3, 2));
        assert_eq!(Axis::new(3, 8).tiles, 3);
    }

    #[test]
    fn test_clip_limit_bounds_the_table_slope() {
        // a single-valued tile: unclipped, the table would jump 0 -> 255 at 100
        let mut histogram = [0u32; BINS];
        histogram[100] = 64;
        let table = equalization_table(histogram, 64, 1.0);
        assert!(table.windows(2).all(|w| w[1] - w[0] <= 9));
        assert_eq!(table[255], 255);
    }

    #[test]
    fn test_options_validate() {
        assert!(EnhanceOptions::default().validate().is_ok());
        assert!(EnhanceOptions {
            clip_limit: 0.0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(EnhanceOptions {
            grid_size: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
