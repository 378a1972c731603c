use crate::frame::Rect;

/// Overlapping detections with IoU above this collapse into one region.
pub const MERGE_IOU: f32 = 0.3;

/// A candidate face rectangle within one frame's coordinate space.
#[derive(Clone, Debug)]
pub struct FaceRegion {
    pub rect: Rect,
    /// Detection confidence, 0..=1.
    pub confidence: f32,
    /// Name of the strategy that produced the detection.
    pub strategy: &'static str,
}

impl FaceRegion {
    /// Build a region clamped to the frame. Returns `None` when the
    /// clamped rectangle is degenerate (outside the frame or zero-sized).
    pub fn new(
        rect: Rect,
        confidence: f32,
        strategy: &'static str,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let rect = rect.clamped_to(frame_width, frame_height)?;
        Some(Self {
            rect,
            confidence: confidence.clamp(0.0, 1.0),
            strategy,
        })
    }
}

/// Collapse overlapping detections: any pair with IoU above `merge_iou`
/// keeps only the higher-confidence region. Strategy-agnostic; detections
/// from different strategies merge the same way.
pub fn merge_overlapping(mut regions: Vec<FaceRegion>, merge_iou: f32) -> Vec<FaceRegion> {
    if regions.len() <= 1 {
        return regions;
    }
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<FaceRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        let overlaps = kept
            .iter()
            .any(|existing| existing.rect.iou(&region.rect) > merge_iou);
        if !overlaps {
            kept.push(region);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: u32, y: u32, w: u32, h: u32, confidence: f32) -> FaceRegion {
        FaceRegion::new(Rect::new(x, y, w, h), confidence, "test", 640, 480).unwrap()
    }

    #[test]
    fn regions_outside_the_frame_are_rejected() {
        assert!(FaceRegion::new(Rect::new(700, 10, 50, 50), 0.9, "test", 640, 480).is_none());
    }

    #[test]
    fn regions_are_clamped_to_frame_bounds() {
        let r = FaceRegion::new(Rect::new(600, 440, 100, 100), 0.9, "test", 640, 480).unwrap();
        assert_eq!(r.rect, Rect::new(600, 440, 40, 40));
    }

    #[test]
    fn heavily_overlapping_detections_keep_the_highest_confidence() {
        // IoU of these two is ~0.9.
        let a = region(100, 100, 100, 100, 0.6);
        let b = region(100, 105, 100, 100, 0.8);
        let merged = merge_overlapping(vec![a, b], MERGE_IOU);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn disjoint_detections_survive_merging() {
        let a = region(0, 0, 50, 50, 0.6);
        let b = region(300, 300, 50, 50, 0.8);
        let merged = merge_overlapping(vec![a, b], MERGE_IOU);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_is_strategy_agnostic() {
        let mut a = region(100, 100, 100, 100, 0.6);
        a.strategy = "cascade";
        let mut b = region(102, 100, 100, 100, 0.7);
        b.strategy = "landmark";
        let merged = merge_overlapping(vec![a, b], MERGE_IOU);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].strategy, "landmark");
    }
}
