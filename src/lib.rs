//! facewatch - motion-gated face recognition pipeline
//!
//! This crate implements the core pipeline for camera-based attendance:
//! frames are pulled from a buffered capture path, cheap motion detection
//! gates the expensive face stages, detected faces are matched against a
//! gallery of enrolled identities, and confirmed recognitions become
//! persisted events without ever stalling the frame loop.
//!
//! # Module Structure
//!
//! - `frame`: Frame container and rectangle geometry
//! - `ingest`: Frame sources and the buffered capture path
//! - `motion`: Frame-differencing motion gate
//! - `detect`: Face locating strategies, region merging, quality scoring
//! - `recognize`: Embeddings, gallery, distance classification
//! - `track`: Per-face track lifecycle and detection scheduling
//! - `events`: Non-blocking recognition event sink
//! - `storage`: Gallery and event stores (sqlite + in-memory)
//! - `session`: Orchestrator loop, statistics, lifecycle
//! - `display`: Annotated-frame sink for UI collaborators

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};

pub mod config;
pub mod detect;
pub mod display;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod pipeline;
pub mod recognize;
pub mod session;
pub mod storage;
pub mod track;

pub use detect::{FaceLocator, FaceRegion, LocatorRegistry};
pub use display::{AnnotatedFrame, DisplaySink, LogDisplay, NullDisplay};
pub use events::{EventSink, RecognitionEvent};
pub use pipeline::{FaceObservation, FacePipeline};
pub use frame::{Frame, Rect};
pub use ingest::{open_source, CaptureHandle, FrameSource, SyntheticConfig, SyntheticSource};
pub use motion::{MotionGate, MotionResult};
pub use recognize::{
    DigestEmbedder, Embedding, FaceEmbedder, Gallery, GalleryEntry, GalleryHandle,
    HistogramEmbedder, Match, UNKNOWN_LABEL,
};
pub use session::{
    Orchestrator, SessionLimits, SessionResult, SessionState, SessionStats, SessionStatus,
};
pub use storage::{
    EventStore, GalleryStore, InMemoryEventStore, InMemoryGalleryStore, SqliteStore,
};
pub use track::{Track, TrackManager, TrackState};

// -------------------- Error Taxonomy --------------------

/// Typed pipeline failures.
///
/// Everything still travels as `anyhow::Error`; these exist so callers can
/// downcast where the distinction matters (fatal vs. locally recovered).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// The frame device cannot be opened or has repeatedly stopped
    /// delivering frames. Fatal to the session.
    SourceUnavailable(String),
    /// A single face region could not be embedded. The region is skipped,
    /// the frame continues.
    EmbeddingFailed(String),
    /// The persistence layer is unreachable. Recovered locally with a
    /// bounded retry, then the record is dropped.
    StoreUnavailable(String),
    /// Malformed or out-of-range configuration. Fatal at startup.
    ConfigInvalid(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::SourceUnavailable(msg) => write!(f, "source unavailable: {}", msg),
            PipelineError::EmbeddingFailed(msg) => write!(f, "embedding failed: {}", msg),
            PipelineError::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
            PipelineError::ConfigInvalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Returns true when `err` carries the given fatal source failure.
pub fn is_source_unavailable(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::SourceUnavailable(_))
    )
}

// -------------------- Label Discipline --------------------

/// An identity label MUST be a short local identifier, not free text.
/// We enforce a positive allowlist pattern so labels stay usable as
/// database keys and log fields.
///
/// Allowed: "alice", "j.doe", "badge_0142"
/// Disallowed: whitespace, slashes, punctuation outside [_.-].
pub fn validate_label(label: &str) -> Result<()> {
    // Compile once for hot paths.
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9_.-]{0,63}$").unwrap());

    let label = label.to_lowercase();
    if !re.is_match(&label) {
        return Err(anyhow!(
            "identity label must match ^[a-z0-9][a-z0-9_.-]{{0,63}}$"
        ));
    }
    Ok(())
}

/// Seconds since the unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_allowlist() {
        assert!(validate_label("alice").is_ok());
        assert!(validate_label("j.doe").is_ok());
        assert!(validate_label("badge_0142").is_ok());
        assert!(validate_label("Alice").is_ok()); // lowercased before matching

        assert!(validate_label("").is_err());
        assert!(validate_label("has space").is_err());
        assert!(validate_label("slash/name").is_err());
        assert!(validate_label("_leading").is_err());
    }

    #[test]
    fn pipeline_errors_downcast_through_anyhow() {
        let err: anyhow::Error =
            PipelineError::SourceUnavailable("camera 0 gone".to_string()).into();
        assert!(is_source_unavailable(&err));

        let err: anyhow::Error = PipelineError::ConfigInvalid("fps = 0".to_string()).into();
        assert!(!is_source_unavailable(&err));
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::ConfigInvalid("fps = 0".to_string()))
        );
    }
}
