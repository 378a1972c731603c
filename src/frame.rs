//! Frame container and rectangle geometry.
//!
//! A `Frame` is a timestamped RGB pixel buffer with a monotonically
//! increasing sequence number. Frames are owned transiently by the loop
//! that produced them; downstream stages derive what they need (luma
//! planes, crops) instead of retaining whole frames.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Axis-aligned rectangle in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 > x1 && y2 > y1 {
            Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Intersection-over-union with another rectangle, in 0..=1.
    pub fn iou(&self, other: &Rect) -> f32 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter_area = inter.area();
        let union = self.area() + other.area() - inter_area;
        if union == 0 {
            return 0.0;
        }
        inter_area as f32 / union as f32
    }

    /// Clamp to frame bounds. Returns `None` when nothing remains.
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.w.min(width - self.x);
        let h = self.h.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Rect::new(self.x, self.y, w, h))
    }
}

/// One captured video frame: RGB pixels plus capture metadata.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per-source sequence number.
    pub seq: u64,
    /// Wall-clock capture time, seconds since the unix epoch.
    pub captured_epoch_s: u64,
    /// Monotonic capture instant, used for staleness and track timing.
    pub captured_at: Instant,
    pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame. `pixels` must be tightly packed RGB.
    pub fn new(
        width: u32,
        height: u32,
        seq: u64,
        captured_epoch_s: u64,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame pixel buffer has {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            seq,
            captured_epoch_s,
            captured_at: Instant::now(),
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access for overlay annotation.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Single-channel luminance plane (integer BT.601 approximation).
    pub fn luma(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(3)
            .map(|px| {
                let r = px[0] as u32;
                let g = px[1] as u32;
                let b = px[2] as u32;
                ((299 * r + 587 * g + 114 * b) / 1000) as u8
            })
            .collect()
    }

    /// Luma crop of `rect`, clamped to frame bounds.
    /// Returns `None` when the clamped rectangle is degenerate.
    pub fn crop_luma(&self, rect: &Rect) -> Option<Vec<u8>> {
        let rect = rect.clamped_to(self.width, self.height)?;
        let luma = self.luma();
        let mut out = Vec::with_capacity(rect.area() as usize);
        for row in rect.y..rect.bottom() {
            let start = (row * self.width + rect.x) as usize;
            out.extend_from_slice(&luma[start..start + rect.w as usize]);
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(
            width,
            height,
            1,
            0,
            vec![value; (width * height * 3) as usize],
        )
        .unwrap()
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(Frame::new(10, 10, 1, 0, vec![0u8; 5]).is_err());
        assert!(Frame::new(0, 10, 1, 0, vec![]).is_err());
    }

    #[test]
    fn luma_of_gray_frame_is_flat() {
        let frame = solid_frame(4, 4, 100);
        let luma = frame.luma();
        assert_eq!(luma.len(), 16);
        assert!(luma.iter().all(|&v| v == 100));
    }

    #[test]
    fn iou_of_identical_rects_is_one() {
        let a = Rect::new(10, 10, 20, 20);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_rects_is_zero() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(50, 50, 10, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 0, 10, 10);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn clamp_drops_out_of_bounds_rects() {
        let r = Rect::new(100, 100, 10, 10);
        assert!(r.clamped_to(50, 50).is_none());

        let r = Rect::new(45, 45, 20, 20);
        let clamped = r.clamped_to(50, 50).unwrap();
        assert_eq!(clamped, Rect::new(45, 45, 5, 5));
    }

    #[test]
    fn crop_luma_matches_rect_area() {
        let frame = solid_frame(8, 8, 50);
        let crop = frame.crop_luma(&Rect::new(2, 2, 4, 4)).unwrap();
        assert_eq!(crop.len(), 16);
        assert!(crop.iter().all(|&v| v == 50));
    }
}
