//! Per-face track lifecycle.
//!
//! Tracks let the loop skip full face detection on most frames: a face
//! seen once is followed by spatial continuity (IoU of regions) and keeps
//! its cached identity until the next full-detection pass refreshes it.
//!
//! Lifecycle per track: `New` on first sighting, `Active` while a region
//! in the current frame associates with it, `Stale` while unmatched but
//! inside the tracking timeout, `Expired` (and removed) once the timeout
//! elapses or the identity stays unconfirmed past the retry budget.
//!
//! All timing flows through caller-provided instants so tests control the
//! clock.

use std::time::{Duration, Instant};

use crate::config::PerformanceSettings;
use crate::frame::Rect;
use crate::pipeline::FaceObservation;
use crate::recognize::UNKNOWN_LABEL;

/// Minimum IoU between a track's last region and a current-frame region
/// for the two to associate.
const ASSOCIATION_IOU: f32 = 0.3;
/// Full-detection passes a track's identity may stay unknown before the
/// track is given up on.
const IDENTITY_RETRY_BUDGET: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Created this pass, not yet re-associated.
    New,
    /// Associated with a region in the current frame.
    Active,
    /// Unmatched, position held at the last-known region.
    Stale,
    /// Timed out or identity never confirmed; removed from the set.
    Expired,
}

#[derive(Clone, Debug)]
pub struct Track {
    pub id: u64,
    pub region: Rect,
    /// Cached identity from the last full-detection refresh.
    pub label: String,
    pub confidence: f32,
    pub state: TrackState,
    pub last_update: Instant,
    pub consecutive_misses: u32,
    /// Consecutive full-detection refreshes that stayed unknown.
    pub(crate) unknown_refreshes: u32,
}

pub struct TrackManager {
    tracks: Vec<Track>,
    next_id: u64,
    association_iou: f32,
    tracking_timeout: Duration,
    detection_interval: u32,
    identity_retry_budget: u32,
    frames_since_detection: u32,
}

impl TrackManager {
    pub fn new(
        association_iou: f32,
        detection_interval: u32,
        tracking_timeout: Duration,
        identity_retry_budget: u32,
    ) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            association_iou,
            tracking_timeout,
            detection_interval: detection_interval.max(1),
            identity_retry_budget,
            frames_since_detection: u32::MAX, // force detection on the first frame
        }
    }

    pub fn from_settings(performance: &PerformanceSettings) -> Self {
        Self::new(
            ASSOCIATION_IOU,
            performance.detection_interval,
            performance.tracking_timeout,
            IDENTITY_RETRY_BUDGET,
        )
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Scheduling decision for this frame: run the full face pipeline when
    /// the detection interval has elapsed or nothing is being tracked.
    pub fn should_run_detection(&self) -> bool {
        self.tracks.is_empty() || self.frames_since_detection >= self.detection_interval
    }

    /// Fold a full-detection pass into the track set.
    ///
    /// Each observation either refreshes the best-overlapping track
    /// (region, identity and confidence) or creates a new one. Tracks with
    /// no matching observation go stale.
    pub fn observe_detections(&mut self, now: Instant, observations: &[FaceObservation]) {
        self.frames_since_detection = 0;

        let assignments = self.associate(observations.iter().map(|obs| obs.region.rect));
        let mut matched = vec![false; self.tracks.len()];

        for (obs_idx, track_idx) in assignments.iter().enumerate() {
            let observation = &observations[obs_idx];
            match track_idx {
                Some(track_idx) => {
                    let track = &mut self.tracks[*track_idx];
                    matched[*track_idx] = true;
                    track.region = observation.region.rect;
                    track.label = observation.label.clone();
                    track.confidence = observation.confidence;
                    track.state = TrackState::Active;
                    track.last_update = now;
                    track.consecutive_misses = 0;
                    if observation.label == UNKNOWN_LABEL {
                        track.unknown_refreshes += 1;
                    } else {
                        track.unknown_refreshes = 0;
                    }
                }
                None => {
                    self.next_id += 1;
                    log::debug!(
                        "track {}: created at {:?} as {}",
                        self.next_id,
                        observation.region.rect,
                        observation.label
                    );
                    self.tracks.push(Track {
                        id: self.next_id,
                        region: observation.region.rect,
                        label: observation.label.clone(),
                        confidence: observation.confidence,
                        state: TrackState::New,
                        last_update: now,
                        consecutive_misses: 0,
                        unknown_refreshes: u32::from(observation.label == UNKNOWN_LABEL),
                    });
                    matched.push(true);
                }
            }
        }

        for (track, was_matched) in self.tracks.iter_mut().zip(matched) {
            if !was_matched {
                track.consecutive_misses += 1;
                track.state = TrackState::Stale;
            }
        }

        self.expire(now);
    }

    /// Cheap tracking-only update for frames between detection passes.
    ///
    /// Current-frame regions (e.g. motion regions) move associated tracks
    /// along; identities are NOT refreshed here. Unmatched tracks hold
    /// their last region and go stale.
    pub fn observe_tracking_only(&mut self, now: Instant, regions: &[Rect]) {
        self.frames_since_detection = self.frames_since_detection.saturating_add(1);

        let assignments = self.associate(regions.iter().copied());
        let mut matched = vec![false; self.tracks.len()];

        for (region_idx, track_idx) in assignments.iter().enumerate() {
            if let Some(track_idx) = track_idx {
                let track = &mut self.tracks[*track_idx];
                matched[*track_idx] = true;
                track.region = regions[region_idx];
                track.state = TrackState::Active;
                track.last_update = now;
                track.consecutive_misses = 0;
            }
        }

        for (track, was_matched) in self.tracks.iter_mut().zip(matched) {
            if !was_matched {
                track.consecutive_misses += 1;
                track.state = TrackState::Stale;
            }
        }

        self.expire(now);
    }

    /// Greedy one-to-one association: highest IoU first, one region per
    /// track. Returns, per input region, the index of the associated track.
    fn associate(&self, regions: impl Iterator<Item = Rect>) -> Vec<Option<usize>> {
        let regions: Vec<Rect> = regions.collect();
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (region_idx, region) in regions.iter().enumerate() {
            for (track_idx, track) in self.tracks.iter().enumerate() {
                let iou = track.region.iou(region);
                if iou >= self.association_iou {
                    pairs.push((region_idx, track_idx, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut assignment = vec![None; regions.len()];
        let mut region_taken = vec![false; regions.len()];
        let mut track_taken = vec![false; self.tracks.len()];
        for (region_idx, track_idx, _) in pairs {
            if region_taken[region_idx] || track_taken[track_idx] {
                continue;
            }
            region_taken[region_idx] = true;
            track_taken[track_idx] = true;
            assignment[region_idx] = Some(track_idx);
        }
        assignment
    }

    /// Remove tracks past the tracking timeout or out of identity retries.
    /// Expiry is strict: a track lives through `elapsed == timeout`.
    fn expire(&mut self, now: Instant) {
        let timeout = self.tracking_timeout;
        let budget = self.identity_retry_budget;
        self.tracks.retain_mut(|track| {
            let timed_out = now.duration_since(track.last_update) > timeout;
            let out_of_retries = track.unknown_refreshes > budget;
            if timed_out || out_of_retries {
                track.state = TrackState::Expired;
                log::debug!(
                    "track {}: expired ({})",
                    track.id,
                    if timed_out { "timeout" } else { "unconfirmed identity" }
                );
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FaceRegion;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn manager() -> TrackManager {
        TrackManager::new(ASSOCIATION_IOU, 5, TIMEOUT, IDENTITY_RETRY_BUDGET)
    }

    fn observation(x: u32, y: u32, label: &str) -> FaceObservation {
        FaceObservation {
            region: FaceRegion::new(Rect::new(x, y, 50, 50), 0.9, "test", 640, 480).unwrap(),
            label: label.to_string(),
            confidence: 0.9,
            distance: 0.1,
        }
    }

    #[test]
    fn first_frame_always_runs_detection() {
        let manager = manager();
        assert!(manager.should_run_detection());
    }

    #[test]
    fn detection_interval_gates_full_passes() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[observation(10, 10, "alice")]);
        assert!(!manager.should_run_detection());

        for i in 1..5 {
            manager.observe_tracking_only(t0 + Duration::from_millis(i), &[]);
            assert!(!manager.should_run_detection(), "frame {} is tracking-only", i);
        }
        manager.observe_tracking_only(t0 + Duration::from_millis(5), &[]);
        assert!(manager.should_run_detection());
    }

    #[test]
    fn empty_track_set_forces_detection_between_intervals() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[]);
        assert!(manager.is_empty());
        assert!(manager.should_run_detection());
    }

    #[test]
    fn overlapping_region_keeps_a_track_active_with_cached_identity() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[observation(10, 10, "alice")]);

        // shifted but overlapping motion region on a tracking-only frame
        manager.observe_tracking_only(
            t0 + Duration::from_millis(33),
            &[Rect::new(15, 12, 50, 50)],
        );

        let track = &manager.tracks()[0];
        assert_eq!(track.state, TrackState::Active);
        assert_eq!(track.label, "alice");
        assert_eq!(track.region, Rect::new(15, 12, 50, 50));
    }

    #[test]
    fn unmatched_track_goes_stale_and_holds_position() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[observation(10, 10, "alice")]);
        manager.observe_tracking_only(t0 + Duration::from_millis(33), &[]);

        let track = &manager.tracks()[0];
        assert_eq!(track.state, TrackState::Stale);
        assert_eq!(track.region, Rect::new(10, 10, 50, 50));
        assert_eq!(track.consecutive_misses, 1);
    }

    #[test]
    fn track_expires_exactly_when_the_timeout_elapses_and_not_before() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[observation(10, 10, "alice")]);

        manager.observe_tracking_only(t0 + TIMEOUT - Duration::from_millis(1), &[]);
        assert_eq!(manager.tracks().len(), 1, "inside the timeout window");

        manager.observe_tracking_only(t0 + TIMEOUT, &[]);
        assert_eq!(manager.tracks().len(), 1, "at exactly the timeout");

        manager.observe_tracking_only(t0 + TIMEOUT + Duration::from_millis(1), &[]);
        assert!(manager.is_empty(), "past the timeout");
    }

    #[test]
    fn identity_refresh_happens_only_on_detection_frames() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(t0, &[observation(10, 10, "alice")]);

        manager.observe_tracking_only(
            t0 + Duration::from_millis(33),
            &[Rect::new(10, 10, 50, 50)],
        );
        assert_eq!(manager.tracks()[0].label, "alice");

        manager.observe_detections(
            t0 + Duration::from_millis(66),
            &[observation(10, 10, "bob")],
        );
        assert_eq!(manager.tracks()[0].label, "bob");
        assert_eq!(manager.tracks().len(), 1, "same track, refreshed identity");
    }

    #[test]
    fn unconfirmed_identity_exhausts_the_retry_budget() {
        let mut manager = manager();
        let mut now = Instant::now();
        manager.observe_detections(now, &[observation(10, 10, UNKNOWN_LABEL)]);

        for _ in 0..IDENTITY_RETRY_BUDGET {
            now += Duration::from_millis(33);
            manager.observe_detections(now, &[observation(10, 10, UNKNOWN_LABEL)]);
        }
        assert!(
            manager.is_empty(),
            "track should expire after {} unknown refreshes",
            IDENTITY_RETRY_BUDGET + 1
        );
    }

    #[test]
    fn two_faces_keep_separate_tracks() {
        let mut manager = manager();
        let t0 = Instant::now();
        manager.observe_detections(
            t0,
            &[observation(10, 10, "alice"), observation(300, 200, "bob")],
        );
        assert_eq!(manager.tracks().len(), 2);

        // Both move slightly; greedy IoU association keeps them apart.
        manager.observe_detections(
            t0 + Duration::from_millis(33),
            &[observation(305, 204, "bob"), observation(12, 11, "alice")],
        );
        assert_eq!(manager.tracks().len(), 2);
        let labels: Vec<&str> = manager.tracks().iter().map(|t| t.label.as_str()).collect();
        assert!(labels.contains(&"alice") && labels.contains(&"bob"));
    }
}
