//! Face locating and matching pipeline.
//!
//! One full-detection pass over a frame: run every registered locating
//! strategy, merge overlapping detections, filter by size and crop
//! quality, cap the per-frame workload, then embed and classify each
//! surviving region against the current gallery snapshot.

use std::sync::Arc;

use crate::config::{FaceDetectionSettings, FaceRecognitionSettings};
use crate::detect::{assess_quality, FaceRegion, LocatorRegistry};
use crate::frame::Frame;
use crate::recognize::{FaceEmbedder, GalleryHandle};

/// One classified face on one frame.
#[derive(Clone, Debug)]
pub struct FaceObservation {
    pub region: FaceRegion,
    pub label: String,
    pub confidence: f32,
    pub distance: f32,
}

pub struct FacePipeline {
    registry: LocatorRegistry,
    embedder: Box<dyn FaceEmbedder>,
    gallery: Arc<GalleryHandle>,
    detection: FaceDetectionSettings,
    recognition: FaceRecognitionSettings,
    max_faces_per_frame: usize,
}

impl FacePipeline {
    pub fn new(
        registry: LocatorRegistry,
        embedder: Box<dyn FaceEmbedder>,
        gallery: Arc<GalleryHandle>,
        detection: FaceDetectionSettings,
        recognition: FaceRecognitionSettings,
        max_faces_per_frame: usize,
    ) -> Self {
        Self {
            registry,
            embedder,
            gallery,
            detection,
            recognition,
            max_faces_per_frame,
        }
    }

    /// Merged, filtered, capped candidate regions for `frame`.
    ///
    /// Regions beyond `max_faces_per_frame` are deferred to a later frame,
    /// largest area first.
    pub fn locate(&mut self, frame: &Frame) -> Vec<FaceRegion> {
        let merged = self.registry.locate(frame);
        let mut candidates: Vec<FaceRegion> = merged
            .into_iter()
            .filter(|region| region.confidence >= self.detection.min_confidence)
            .filter(|region| {
                let rect = &region.rect;
                rect.w >= self.detection.min_face_size
                    && rect.h >= self.detection.min_face_size
                    && rect.w <= self.detection.max_face_size
                    && rect.h <= self.detection.max_face_size
            })
            .filter(|region| {
                assess_quality(frame, &region.rect) >= self.detection.min_quality_score
            })
            .collect();

        candidates.sort_by_key(|region| std::cmp::Reverse(region.rect.area()));
        if candidates.len() > self.max_faces_per_frame {
            log::debug!(
                "frame {}: deferring {} of {} faces past the per-frame cap",
                frame.seq,
                candidates.len() - self.max_faces_per_frame,
                candidates.len()
            );
            candidates.truncate(self.max_faces_per_frame);
        }
        candidates
    }

    /// Full detection pass: locate, embed, classify.
    ///
    /// A region that fails to embed is skipped; the rest of the frame
    /// continues. All classifications in one pass use a single gallery
    /// snapshot.
    pub fn analyze(&mut self, frame: &Frame) -> Vec<FaceObservation> {
        let regions = self.locate(frame);
        if regions.is_empty() {
            return Vec::new();
        }

        let gallery = self.gallery.snapshot();
        let mut observations = Vec::with_capacity(regions.len());
        for region in regions {
            let embedding = match self.embedder.embed(frame, &region) {
                Ok(embedding) => embedding,
                Err(e) => {
                    log::debug!("frame {}: skipping region, {}", frame.seq, e);
                    continue;
                }
            };
            let matched = match gallery.classify(&embedding, &self.recognition) {
                Ok(matched) => matched,
                Err(e) => {
                    log::warn!("frame {}: classification failed, {}", frame.seq, e);
                    continue;
                }
            };
            observations.push(FaceObservation {
                region,
                label: matched.label,
                confidence: matched.confidence,
                distance: matched.distance,
            });
        }
        observations
    }
}
