//! Contrast-blob face locator.
//!
//! A dependency-free geometric strategy: pixels that deviate strongly from
//! the frame's mean luma are grouped into connected blobs, and blobs with
//! a plausible face aspect ratio become candidate regions. It is blind to
//! actual facial structure; real deployments register a model-backed
//! strategy alongside it and let the merge step reconcile the two.

use crate::detect::locator::FaceLocator;
use crate::detect::region::FaceRegion;
use crate::frame::Frame;
use crate::motion::changed_regions;

/// Minimum deviation from mean luma for a pixel to join a blob.
const CONTRAST_DELTA: f32 = 45.0;
/// Blobs smaller than this many pixels are noise.
const MIN_BLOB_PIXELS: usize = 64;
/// Acceptable width/height ratio band for a face-shaped blob.
const MIN_ASPECT: f32 = 0.4;
const MAX_ASPECT: f32 = 2.5;

#[derive(Default)]
pub struct BlobLocator;

impl BlobLocator {
    pub fn new() -> Self {
        Self
    }
}

impl FaceLocator for BlobLocator {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn locate(&mut self, frame: &Frame) -> Vec<FaceRegion> {
        let luma = frame.luma();
        let mean = luma.iter().map(|&v| v as f32).sum::<f32>() / luma.len() as f32;

        let mask: Vec<bool> = luma
            .iter()
            .map(|&v| (v as f32 - mean).abs() > CONTRAST_DELTA)
            .collect();

        changed_regions(&mask, frame.width, frame.height, MIN_BLOB_PIXELS)
            .into_iter()
            .filter_map(|rect| {
                let aspect = rect.w as f32 / rect.h as f32;
                if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
                    return None;
                }
                // Fuller blobs are more box-like and score higher.
                let fill = mask_count_in(&mask, frame.width, &rect) as f32 / rect.area() as f32;
                let confidence = (0.4 + 0.5 * fill).clamp(0.0, 0.9);
                FaceRegion::new(rect, confidence, "blob", frame.width, frame.height)
            })
            .collect()
    }
}

fn mask_count_in(mask: &[bool], frame_width: u32, rect: &crate::frame::Rect) -> usize {
    let mut count = 0;
    for y in rect.y..rect.bottom() {
        let start = (y * frame_width + rect.x) as usize;
        count += mask[start..start + rect.w as usize]
            .iter()
            .filter(|&&v| v)
            .count();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;

    fn frame_with_block(background: u8, block: Rect, value: u8) -> Frame {
        let (width, height) = (128u32, 128u32);
        let mut pixels = vec![background; (width * height * 3) as usize];
        for y in block.y..block.bottom() {
            for x in block.x..block.right() {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx..idx + 3].fill(value);
            }
        }
        Frame::new(width, height, 1, 0, pixels).unwrap()
    }

    #[test]
    fn bright_square_blob_is_located() {
        let block = Rect::new(30, 30, 40, 40);
        let frame = frame_with_block(50, block, 230);
        let mut locator = BlobLocator::new();

        let found = locator.locate(&frame);
        assert_eq!(found.len(), 1);
        assert!(found[0].rect.iou(&block) > 0.8);
        assert!(found[0].confidence > 0.4);
    }

    #[test]
    fn flat_frames_produce_no_detections() {
        let frame = frame_with_block(80, Rect::new(0, 0, 1, 1), 80);
        let mut locator = BlobLocator::new();
        assert!(locator.locate(&frame).is_empty());
    }

    #[test]
    fn extreme_aspect_blobs_are_rejected() {
        // A 100x8 stripe is not face-shaped.
        let stripe = Rect::new(10, 60, 100, 8);
        let frame = frame_with_block(50, stripe, 230);
        let mut locator = BlobLocator::new();
        assert!(locator.locate(&frame).is_empty());
    }
}
