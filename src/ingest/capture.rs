//! Buffered capture path.
//!
//! `CaptureHandle::open` puts the frame source on its own thread. The
//! thread overwrites a single latest-frame slot at the source's pace;
//! consumers pull whatever is newest and never wait on device I/O. If the
//! device stalls or dies, `read` reports `None` (no fresh frame) until the
//! consecutive-failure limit is hit, after which the handle is failed and
//! reads surface `SourceUnavailable`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::FrameSource;
use crate::frame::Frame;
use crate::PipelineError;

/// Capture failures tolerated in a row before the handle is failed.
const DEFAULT_FAILURE_LIMIT: u32 = 10;
/// Poll granularity for `read_timeout`.
const READ_POLL: Duration = Duration::from_millis(2);

#[derive(Default)]
struct SharedState {
    slot: Mutex<Option<Frame>>,
    running: AtomicBool,
    failed: AtomicBool,
    frames_captured: AtomicU64,
    capture_errors: AtomicU64,
}

/// Snapshot of capture-path counters.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub capture_errors: u64,
    pub failed: bool,
}

pub struct CaptureHandle {
    shared: Arc<SharedState>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl CaptureHandle {
    /// Connect the source and start the capture thread.
    ///
    /// Fails with `SourceUnavailable` when the device cannot be opened.
    pub fn open(mut source: Box<dyn FrameSource>, fps: u32) -> Result<Self> {
        source.connect().map_err(|e| {
            PipelineError::SourceUnavailable(format!("failed to open frame source: {}", e))
        })?;
        Self::spawn(source, fps, DEFAULT_FAILURE_LIMIT)
    }

    fn spawn(mut source: Box<dyn FrameSource>, fps: u32, failure_limit: u32) -> Result<Self> {
        let shared = Arc::new(SharedState::default());
        shared.running.store(true, Ordering::SeqCst);

        let frame_interval = Duration::from_secs(1) / fps.max(1);
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("facewatch-capture".to_string())
            .spawn(move || {
                let mut consecutive_failures = 0u32;
                while worker_shared.running.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    match source.next_frame() {
                        Ok(frame) => {
                            consecutive_failures = 0;
                            worker_shared.frames_captured.fetch_add(1, Ordering::SeqCst);
                            *worker_shared.slot.lock().expect("capture slot poisoned") =
                                Some(frame);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            worker_shared.capture_errors.fetch_add(1, Ordering::SeqCst);
                            log::warn!(
                                "capture failure {}/{}: {}",
                                consecutive_failures,
                                failure_limit,
                                e
                            );
                            if consecutive_failures >= failure_limit {
                                worker_shared.failed.store(true, Ordering::SeqCst);
                                log::error!("frame source failed, capture thread exiting");
                                break;
                            }
                        }
                    }
                    // Pace to the configured rate; the source is dropped
                    // when this thread exits, releasing the device.
                    if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
                        std::thread::sleep(remaining);
                    }
                }
            })
            .map_err(|e| {
                PipelineError::SourceUnavailable(format!("failed to spawn capture thread: {}", e))
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
            closed: false,
        })
    }

    /// Take the most recent frame, if one newer than the last read exists.
    ///
    /// Never blocks beyond the slot lock. After the device has failed,
    /// returns `SourceUnavailable`.
    pub fn read(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(
                PipelineError::SourceUnavailable("capture handle is closed".to_string()).into(),
            );
        }
        let frame = self.shared.slot.lock().expect("capture slot poisoned").take();
        if frame.is_none() && self.shared.failed.load(Ordering::SeqCst) {
            return Err(PipelineError::SourceUnavailable(
                "frame source stopped delivering frames".to_string(),
            )
            .into());
        }
        Ok(frame)
    }

    /// Poll `read` until a frame arrives or `timeout` elapses.
    pub fn read_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.read()? {
                return Ok(Some(frame));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(READ_POLL);
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.shared.frames_captured.load(Ordering::SeqCst),
            capture_errors: self.shared.capture_errors.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
        }
    }

    /// Stop the capture thread and release the device. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("capture thread panicked during shutdown");
            }
        }
        self.shared.slot.lock().expect("capture slot poisoned").take();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.close();
    }
}
