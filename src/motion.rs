//! Frame-differencing motion gate.
//!
//! Cheap per-frame check that rations the expensive face stages: luma
//! conversion, a small box blur to suppress sensor noise, absolute
//! difference against a running reference, binary threshold, and
//! connected-region extraction with a minimum-area filter.
//!
//! Reference policy: the first frame seeds the reference and reports no
//! motion. Afterwards the reference decays toward the current frame with a
//! fixed smoothing factor, except on frames whose changed-pixel fraction
//! is a gross discontinuity (large moving objects must not bleed into the
//! background model). Frames that fail quality checks (dimension change)
//! reseed instead of updating.

use crate::config::MotionSettings;
use crate::frame::{Frame, Rect};

/// Blend weight of the current frame when updating the reference.
const REFERENCE_ALPHA: f32 = 0.1;
/// Changed-pixel fraction above which the reference update is skipped.
const GROSS_CHANGE_FRACTION: f32 = 0.4;

/// Outcome of one motion check.
#[derive(Clone, Debug, Default)]
pub struct MotionResult {
    pub present: bool,
    /// Bounding boxes of changed regions that passed the area filter.
    pub regions: Vec<Rect>,
    /// Fraction of pixels above the difference cutoff, in 0..=1.
    pub changed_fraction: f32,
}

struct Reference {
    width: u32,
    height: u32,
    luma: Vec<f32>,
}

pub struct MotionGate {
    settings: MotionSettings,
    reference: Option<Reference>,
}

impl MotionGate {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            reference: None,
        }
    }

    /// Drop the reference; the next frame seeds a fresh one.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    /// Compare `frame` against the running reference.
    ///
    /// A disabled gate reports `present = true` with no regions so
    /// downstream stages always run.
    pub fn detect(&mut self, frame: &Frame) -> MotionResult {
        if !self.settings.enabled {
            return MotionResult {
                present: true,
                ..MotionResult::default()
            };
        }

        let blurred = box_blur(&frame.luma(), frame.width, frame.height);

        let reference = match &mut self.reference {
            Some(reference)
                if reference.width == frame.width && reference.height == frame.height =>
            {
                reference
            }
            _ => {
                // Seed (or reseed after a dimension change): no motion.
                self.reference = Some(Reference {
                    width: frame.width,
                    height: frame.height,
                    luma: blurred.iter().map(|&v| v as f32).collect(),
                });
                return MotionResult::default();
            }
        };

        let threshold = self.settings.threshold as f32;
        let mut mask = vec![false; blurred.len()];
        let mut changed = 0usize;
        for (i, (&current, reference_px)) in
            blurred.iter().zip(reference.luma.iter()).enumerate()
        {
            if (current as f32 - reference_px).abs() > threshold {
                mask[i] = true;
                changed += 1;
            }
        }
        let changed_fraction = changed as f32 / mask.len() as f32;

        let regions = changed_regions(
            &mask,
            frame.width,
            frame.height,
            self.settings.min_area as usize,
        );

        if changed_fraction <= GROSS_CHANGE_FRACTION {
            for (reference_px, &current) in reference.luma.iter_mut().zip(blurred.iter()) {
                *reference_px += REFERENCE_ALPHA * (current as f32 - *reference_px);
            }
        }

        MotionResult {
            present: !regions.is_empty(),
            regions,
            changed_fraction,
        }
    }
}

/// 3x3 box blur with clamped borders.
fn box_blur(luma: &[u8], width: u32, height: u32) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let mut out = vec![0u8; luma.len()];
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = y as i64 + dy;
                    let nx = x as i64 + dx;
                    if ny >= 0 && ny < height as i64 && nx >= 0 && nx < width as i64 {
                        sum += luma[ny as usize * width + nx as usize] as u32;
                        count += 1;
                    }
                }
            }
            out[y * width + x] = (sum / count) as u8;
        }
    }
    out
}

/// Bounding boxes of 4-connected mask components with at least `min_area`
/// set pixels. Shared with the blob face locator.
pub(crate) fn changed_regions(
    mask: &[bool],
    width: u32,
    height: u32,
    min_area: usize,
) -> Vec<Rect> {
    let width_us = width as usize;
    let mut visited = vec![false; mask.len()];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let mut count = 0usize;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        while let Some(idx) = stack.pop() {
            count += 1;
            let x = (idx % width_us) as u32;
            let y = (idx / width_us) as u32;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let mut push = |nidx: usize| {
                if mask[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            };
            if x > 0 {
                push(idx - 1);
            }
            if x + 1 < width {
                push(idx + 1);
            }
            if y > 0 {
                push(idx - width_us);
            }
            if y + 1 < height {
                push(idx + width_us);
            }
        }

        if count >= min_area {
            regions.push(Rect::new(
                min_x,
                min_y,
                max_x - min_x + 1,
                max_y - min_y + 1,
            ));
        }
    }

    regions
}
