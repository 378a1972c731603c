//! Display collaborator interface.
//!
//! The loop hands every processed frame to a `DisplaySink` together with
//! the current statistics snapshot. Sinks are pure consumers: they cannot
//! push back on the loop and their cost must stay trivial. Box outlines
//! are drawn into the pixel buffer; label text is carried as structured
//! data so a UI collaborator can render it however it likes.

use crate::frame::{Frame, Rect};
use crate::recognize::UNKNOWN_LABEL;
use crate::session::SessionStats;
use crate::track::{Track, TrackState};

const KNOWN_COLOR: [u8; 3] = [0, 220, 0];
const UNKNOWN_COLOR: [u8; 3] = [230, 160, 0];
const STALE_COLOR: [u8; 3] = [160, 160, 160];
const OUTLINE_THICKNESS: u32 = 2;

/// A caption attached to one drawn region.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub rect: Rect,
    pub label: String,
    pub confidence: f32,
}

/// Frame with overlays drawn and captions attached.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub annotations: Vec<Annotation>,
    pub status_line: String,
}

pub trait DisplaySink: Send {
    /// Receive one processed frame and the current stats. Must not block.
    fn present(&mut self, frame: &AnnotatedFrame, stats: &SessionStats);
}

/// Discards everything. Default for headless sessions.
#[derive(Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn present(&mut self, _frame: &AnnotatedFrame, _stats: &SessionStats) {}
}

/// Logs captions at debug level; useful for demos without a UI.
#[derive(Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn present(&mut self, frame: &AnnotatedFrame, stats: &SessionStats) {
        for annotation in &frame.annotations {
            log::debug!(
                "frame {}: {} ({:.2}) at {:?}",
                frame.frame.seq,
                annotation.label,
                annotation.confidence,
                annotation.rect
            );
        }
        log::debug!(
            "frame {}: {} | frames={} motion={} faces={} recognized={} events={}",
            frame.frame.seq,
            frame.status_line,
            stats.frames_processed,
            stats.motion_detected,
            stats.faces_detected,
            stats.faces_recognized,
            stats.recognition_events
        );
    }
}

/// Draw track overlays onto a copy of `frame`.
pub fn annotate(frame: &Frame, tracks: &[Track], status_line: String) -> AnnotatedFrame {
    let mut annotated = frame.clone();
    let mut annotations = Vec::with_capacity(tracks.len());

    for track in tracks {
        let color = match (track.state, track.label.as_str()) {
            (TrackState::Stale, _) => STALE_COLOR,
            (_, UNKNOWN_LABEL) => UNKNOWN_COLOR,
            _ => KNOWN_COLOR,
        };
        draw_outline(&mut annotated, &track.region, color);
        annotations.push(Annotation {
            rect: track.region,
            label: track.label.clone(),
            confidence: track.confidence,
        });
    }

    AnnotatedFrame {
        frame: annotated,
        annotations,
        status_line,
    }
}

fn draw_outline(frame: &mut Frame, rect: &Rect, color: [u8; 3]) {
    let Some(rect) = rect.clamped_to(frame.width, frame.height) else {
        return;
    };
    let width = frame.width;
    let thickness = OUTLINE_THICKNESS.min(rect.w / 2).min(rect.h / 2).max(1);
    let pixels = frame.pixels_mut();

    let mut paint = |x: u32, y: u32| {
        let idx = ((y * width + x) * 3) as usize;
        pixels[idx..idx + 3].copy_from_slice(&color);
    };

    for t in 0..thickness {
        for x in rect.x..rect.right() {
            paint(x, rect.y + t);
            paint(x, rect.bottom() - 1 - t);
        }
        for y in rect.y..rect.bottom() {
            paint(rect.x + t, y);
            paint(rect.right() - 1 - t, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn gray_frame() -> Frame {
        Frame::new(64, 64, 7, 0, vec![100u8; 64 * 64 * 3]).unwrap()
    }

    fn track(label: &str, state: TrackState) -> Track {
        Track {
            id: 1,
            region: Rect::new(10, 10, 20, 20),
            label: label.to_string(),
            confidence: 0.8,
            state,
            last_update: Instant::now(),
            consecutive_misses: 0,
            unknown_refreshes: 0,
        }
    }

    #[test]
    fn annotate_draws_the_outline_and_keeps_captions() {
        let frame = gray_frame();
        let annotated = annotate(&frame, &[track("alice", TrackState::Active)], "ok".into());

        assert_eq!(annotated.annotations.len(), 1);
        assert_eq!(annotated.annotations[0].label, "alice");

        // top-left corner of the outline took the known-face color
        let idx = ((10 * 64 + 10) * 3) as usize;
        assert_eq!(&annotated.frame.pixels()[idx..idx + 3], &KNOWN_COLOR);
        // source frame untouched
        assert_eq!(&frame.pixels()[idx..idx + 3], &[100, 100, 100]);
    }

    #[test]
    fn out_of_frame_regions_are_skipped() {
        let frame = gray_frame();
        let mut t = track("alice", TrackState::Active);
        t.region = Rect::new(200, 200, 20, 20);
        let annotated = annotate(&frame, &[t], "ok".into());
        assert_eq!(annotated.frame.pixels(), frame.pixels());
    }
}
