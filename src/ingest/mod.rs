//! Frame ingestion sources and the buffered capture path.
//!
//! This module provides the sources frames come from:
//! - Synthetic scenes (`stub://` URLs, always available, used by tests)
//! - Cameras / RTSP streams / video files (feature: camera-gstreamer)
//!
//! and the capture path that decouples device I/O from processing:
//! a dedicated thread continuously refreshes a latest-frame slot, so the
//! processing loop always reads the most recent frame (bounded staleness,
//! not a FIFO backlog) and never stalls on a slow or dead device.

mod capture;
#[cfg(feature = "camera-gstreamer")]
mod camera;
mod synthetic;

pub use capture::{CaptureHandle, CaptureStats};
#[cfg(feature = "camera-gstreamer")]
pub use camera::{CameraConfig, CameraSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::Result;

use crate::config::VideoSettings;
use crate::frame::Frame;
use crate::PipelineError;

/// A device or stream that yields frames.
///
/// Implementations own the device handle; dropping the source releases it.
/// `next_frame` may block up to roughly one frame interval; the capture
/// path (not the processing loop) is the only caller.
pub trait FrameSource: Send {
    fn name(&self) -> &'static str;

    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Capture-side statistics.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Build a frame source for the configured video input.
///
/// `stub://` URLs get the synthetic scene generator; anything else needs
/// the gstreamer-backed camera source.
pub fn open_source(video: &VideoSettings) -> Result<Box<dyn FrameSource>> {
    if video.source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: video.source.clone(),
            width: video.frame_width,
            height: video.frame_height,
            frame_limit: None,
        })));
    }

    #[cfg(feature = "camera-gstreamer")]
    {
        return Ok(Box::new(CameraSource::new(CameraConfig {
            source: video.source.clone(),
            target_fps: video.fps,
        })?));
    }

    #[cfg(not(feature = "camera-gstreamer"))]
    {
        Err(PipelineError::SourceUnavailable(format!(
            "source '{}' requires the camera-gstreamer feature",
            video.source
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FacewatchConfig;

    #[test]
    fn stub_urls_resolve_to_the_synthetic_source() {
        let cfg = FacewatchConfig::defaults();
        let source = open_source(&cfg.video).unwrap();
        assert_eq!(source.name(), "synthetic");
    }

    #[cfg(not(feature = "camera-gstreamer"))]
    #[test]
    fn device_urls_without_backend_fail_as_source_unavailable() {
        let mut cfg = FacewatchConfig::defaults();
        cfg.video.source = "rtsp://camera-1".to_string();
        let err = open_source(&cfg.video).err().unwrap();
        assert!(crate::is_source_unavailable(&err));
    }
}
