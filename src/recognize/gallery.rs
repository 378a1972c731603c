//! Enrolled identity gallery and nearest-embedding classification.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::config::FaceRecognitionSettings;
use crate::recognize::embedding::Embedding;

/// Label assigned when no gallery entry is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Distances within this of the minimum count as tied.
const TIE_EPSILON: f32 = 1e-6;

/// One enrolled sample. Multiple entries may share a label; entries are
/// immutable once persisted.
#[derive(Clone, Debug)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
    pub enrolled_epoch_s: u64,
}

/// Outcome of classifying one embedding.
#[derive(Clone, Debug)]
pub struct Match {
    pub label: String,
    /// `1 - distance`, clamped to 0..=1. Also reported for unknowns.
    pub confidence: f32,
    pub distance: f32,
}

impl Match {
    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }

    fn unknown(distance: f32) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: (1.0 - distance).clamp(0.0, 1.0),
            distance,
        }
    }
}

/// In-memory set of enrolled samples, loaded from the gallery store at
/// session start. Insertion order is preserved; the tie-break rule depends
/// on it.
#[derive(Clone, Debug, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    samples_per_label: HashMap<String, usize>,
}

impl Gallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        let mut samples_per_label = HashMap::new();
        for entry in &entries {
            *samples_per_label.entry(entry.label.clone()).or_insert(0) += 1;
        }
        Self {
            entries,
            samples_per_label,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn sample_count(&self, label: &str) -> usize {
        self.samples_per_label.get(label).copied().unwrap_or(0)
    }

    pub fn label_count(&self) -> usize {
        self.samples_per_label.len()
    }

    /// Nearest-embedding classification with thresholds.
    ///
    /// The minimum distance decides: below `recognition_threshold` the
    /// matched label is asserted with confidence `1 - distance`; between
    /// the two thresholds the result is `unknown` with that same computed
    /// confidence; beyond `unknown_face_threshold` it is `unknown` with
    /// zero confidence. An empty gallery always resolves to `unknown`.
    /// A positive match is never asserted at or above the recognition
    /// threshold.
    pub fn classify(
        &self,
        embedding: &Embedding,
        settings: &FaceRecognitionSettings,
    ) -> Result<Match> {
        if self.entries.is_empty() {
            return Ok(Match::unknown(f32::INFINITY));
        }

        let mut best_idx = 0usize;
        let mut best_distance = f32::INFINITY;
        for (idx, entry) in self.entries.iter().enumerate() {
            let distance = embedding.distance(&entry.embedding)?;
            if distance + TIE_EPSILON < best_distance {
                best_distance = distance;
                best_idx = idx;
            } else if (distance - best_distance).abs() <= TIE_EPSILON
                && self.breaks_tie(idx, best_idx)
            {
                best_idx = idx;
            }
        }

        let best = &self.entries[best_idx];
        if best_distance < settings.recognition_threshold {
            Ok(Match {
                label: best.label.clone(),
                confidence: (1.0 - best_distance).clamp(0.0, 1.0),
                distance: best_distance,
            })
        } else if best_distance < settings.unknown_face_threshold {
            // Near miss: unknown, but the computed confidence is kept so
            // callers can see how close it came.
            Ok(Match::unknown(best_distance))
        } else {
            Ok(Match {
                label: UNKNOWN_LABEL.to_string(),
                confidence: 0.0,
                distance: best_distance,
            })
        }
    }

    /// Tie-break policy (flagged for stakeholder confirmation): prefer the
    /// label with more total samples, then the earlier-inserted entry.
    fn breaks_tie(&self, challenger: usize, incumbent: usize) -> bool {
        let challenger_samples = self.sample_count(&self.entries[challenger].label);
        let incumbent_samples = self.sample_count(&self.entries[incumbent].label);
        challenger_samples > incumbent_samples
    }
}

/// Shared, atomically swappable gallery snapshot.
///
/// The matcher clones the `Arc` once per classification pass, so a refresh
/// (after enrollment) is all-or-nothing from its point of view.
#[derive(Default)]
pub struct GalleryHandle {
    inner: RwLock<Arc<Gallery>>,
}

impl GalleryHandle {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            inner: RwLock::new(Arc::new(gallery)),
        }
    }

    pub fn snapshot(&self) -> Arc<Gallery> {
        self.inner.read().expect("gallery lock poisoned").clone()
    }

    /// Replace the snapshot. In-flight classifications keep the one they
    /// already cloned.
    pub fn replace(&self, gallery: Gallery) {
        *self.inner.write().expect("gallery lock poisoned") = Arc::new(gallery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::embedding::EMBEDDING_DIM;

    fn settings() -> FaceRecognitionSettings {
        FaceRecognitionSettings {
            recognition_threshold: 0.6,
            unknown_face_threshold: 0.8,
        }
    }

    fn unit_embedding(axis: usize) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[axis] = 1.0;
        Embedding::new(values).unwrap()
    }

    fn entry(label: &str, axis: usize) -> GalleryEntry {
        GalleryEntry {
            label: label.to_string(),
            embedding: unit_embedding(axis),
            enrolled_epoch_s: 0,
        }
    }

    #[test]
    fn exact_sample_matches_its_label_with_high_confidence() {
        let gallery = Gallery::new(vec![entry("alice", 0), entry("bob", 1)]);
        let result = gallery.classify(&unit_embedding(0), &settings()).unwrap();
        assert_eq!(result.label, "alice");
        assert!(result.confidence >= 1.0 - settings().recognition_threshold);
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn empty_gallery_always_resolves_to_unknown() {
        let gallery = Gallery::new(vec![]);
        for axis in 0..3 {
            let result = gallery.classify(&unit_embedding(axis), &settings()).unwrap();
            assert_eq!(result.label, UNKNOWN_LABEL);
            assert!(!result.is_known());
        }
    }

    #[test]
    fn distances_beyond_the_unknown_threshold_stay_unknown_with_zero_confidence() {
        // Distance between orthogonal unit vectors is sqrt(2) ~ 1.41.
        let gallery = Gallery::new(vec![entry("alice", 0)]);
        let result = gallery.classify(&unit_embedding(1), &settings()).unwrap();
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn near_misses_between_thresholds_keep_their_computed_confidence() {
        let gallery = Gallery::new(vec![entry("alice", 0)]);
        // 0.7 from alice's sample: past recognition (0.6), short of
        // unknown (0.8).
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[0] = 0.3;
        let probe = Embedding::new(values).unwrap();

        let result = gallery.classify(&probe, &settings()).unwrap();
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!((result.distance - 0.7).abs() < 1e-6);
        assert!((result.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn ties_prefer_the_label_with_more_samples() {
        // bob has two samples at the same point alice has one.
        let gallery = Gallery::new(vec![
            entry("alice", 0),
            entry("bob", 0),
            entry("bob", 0),
        ]);
        let result = gallery.classify(&unit_embedding(0), &settings()).unwrap();
        assert_eq!(result.label, "bob");
    }

    #[test]
    fn remaining_ties_fall_back_to_insertion_order() {
        let gallery = Gallery::new(vec![entry("alice", 0), entry("bob", 0)]);
        let result = gallery.classify(&unit_embedding(0), &settings()).unwrap();
        assert_eq!(result.label, "alice");
    }

    #[test]
    fn handle_swaps_snapshots_atomically() {
        let handle = GalleryHandle::new(Gallery::new(vec![entry("alice", 0)]));
        let before = handle.snapshot();

        handle.replace(Gallery::new(vec![entry("bob", 1), entry("bob", 2)]));
        let after = handle.snapshot();

        // The old snapshot is untouched; the new one is complete.
        assert_eq!(before.sample_count("alice"), 1);
        assert_eq!(before.sample_count("bob"), 0);
        assert_eq!(after.sample_count("bob"), 2);
        assert_eq!(after.sample_count("alice"), 0);
    }
}
