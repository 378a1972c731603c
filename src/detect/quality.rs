//! Face crop quality scoring.
//!
//! A cheap filter that keeps blurry, washed-out or badly exposed crops
//! away from the embedder. Combines Laplacian-variance sharpness, contrast
//! and brightness balance into a single 0..=1 score.

use crate::frame::{Frame, Rect};

/// Laplacian variance at which sharpness saturates.
const SHARPNESS_SATURATION: f32 = 500.0;
/// Luma standard deviation at which contrast saturates.
const CONTRAST_SATURATION: f32 = 64.0;

const SHARPNESS_WEIGHT: f32 = 0.5;
const CONTRAST_WEIGHT: f32 = 0.3;
const BRIGHTNESS_WEIGHT: f32 = 0.2;

/// Quality of the crop of `rect`, in 0..=1. Degenerate crops score 0.
pub fn assess_quality(frame: &Frame, rect: &Rect) -> f32 {
    let Some(crop) = frame.crop_luma(rect) else {
        return 0.0;
    };
    let Some(rect) = rect.clamped_to(frame.width, frame.height) else {
        return 0.0;
    };
    if rect.w < 3 || rect.h < 3 {
        return 0.0;
    }

    let mean = crop.iter().map(|&v| v as f32).sum::<f32>() / crop.len() as f32;

    let variance = crop
        .iter()
        .map(|&v| {
            let d = v as f32 - mean;
            d * d
        })
        .sum::<f32>()
        / crop.len() as f32;
    let contrast_score = (variance.sqrt() / CONTRAST_SATURATION).min(1.0);

    let sharpness_score = (laplacian_variance(&crop, rect.w, rect.h) / SHARPNESS_SATURATION)
        .min(1.0);

    let brightness_score = 1.0 - (mean - 127.0).abs() / 127.0;

    (SHARPNESS_WEIGHT * sharpness_score
        + CONTRAST_WEIGHT * contrast_score
        + BRIGHTNESS_WEIGHT * brightness_score)
        .clamp(0.0, 1.0)
}

/// Variance of the 4-neighbour Laplacian response over interior pixels.
fn laplacian_variance(crop: &[u8], width: u32, height: u32) -> f32 {
    let width = width as usize;
    let height = height as usize;
    let mut responses = Vec::with_capacity((width - 2) * (height - 2));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = crop[y * width + x] as f32;
            let neighbours = crop[(y - 1) * width + x] as f32
                + crop[(y + 1) * width + x] as f32
                + crop[y * width + x - 1] as f32
                + crop[y * width + x + 1] as f32;
            responses.push(neighbours - 4.0 * center);
        }
    }
    if responses.is_empty() {
        return 0.0;
    }
    let mean = responses.iter().sum::<f32>() / responses.len() as f32;
    responses.iter().map(|r| (r - mean) * (r - mean)).sum::<f32>() / responses.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from_luma(width: u32, height: u32, luma: Vec<u8>) -> Frame {
        let pixels = luma.into_iter().flat_map(|v| [v, v, v]).collect();
        Frame::new(width, height, 1, 0, pixels).unwrap()
    }

    #[test]
    fn flat_crops_score_low() {
        let frame = frame_from_luma(32, 32, vec![127u8; 32 * 32]);
        let score = assess_quality(&frame, &Rect::new(4, 4, 16, 16));
        // brightness is perfect but there is no detail at all
        assert!(score <= BRIGHTNESS_WEIGHT + 1e-6);
    }

    #[test]
    fn textured_crops_score_higher_than_flat_ones() {
        let flat = frame_from_luma(32, 32, vec![127u8; 32 * 32]);
        let textured = frame_from_luma(
            32,
            32,
            (0..32 * 32)
                .map(|i| if (i / 2) % 2 == 0 { 40 } else { 210 })
                .collect(),
        );
        let rect = Rect::new(4, 4, 16, 16);
        assert!(assess_quality(&textured, &rect) > assess_quality(&flat, &rect));
    }

    #[test]
    fn degenerate_crops_score_zero() {
        let frame = frame_from_luma(32, 32, vec![127u8; 32 * 32]);
        assert_eq!(assess_quality(&frame, &Rect::new(100, 100, 10, 10)), 0.0);
        assert_eq!(assess_quality(&frame, &Rect::new(4, 4, 2, 2)), 0.0);
    }
}
