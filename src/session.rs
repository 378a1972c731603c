//! Session orchestrator.
//!
//! Drives the per-frame cycle: frame-skip policy, motion gate, the
//! tracking/detection scheduling trade-off, event emission, display
//! hand-off and statistics. Owns the session lifecycle
//! (`Initializing -> Running -> (Paused) -> Stopping -> Stopped`) and
//! guarantees that every exit path releases the frame source exactly once
//! and reports final statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FacewatchConfig;
use crate::display::{annotate, DisplaySink};
use crate::events::EventSink;
use crate::ingest::CaptureHandle;
use crate::motion::MotionGate;
use crate::pipeline::{FaceObservation, FacePipeline};
use crate::track::TrackManager;
use crate::{is_source_unavailable, now_s, RecognitionEvent};

/// How long the event sink gets to flush at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Running,
    Paused,
    Stopping,
    Stopped,
}

/// Session counters. Reset at session start; only the orchestrator and
/// the event sink mutate them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub motion_detected: u64,
    pub faces_detected: u64,
    pub faces_recognized: u64,
    pub recognition_events: u64,
    /// Events lost to persistence failures or queue overflow.
    pub events_dropped: u64,
}

/// Clean-vs-degraded outcome; a session never fails silently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Clean,
    Degraded { events_dropped: u64 },
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct SessionResult {
    pub stats: SessionStats,
    pub elapsed: Duration,
    pub status: SessionStatus,
}

/// Bounds on a session. Unset fields mean "run until stopped".
#[derive(Clone, Debug, Default)]
pub struct SessionLimits {
    pub duration: Option<Duration>,
    pub max_frames: Option<u64>,
}

pub struct Orchestrator {
    config: FacewatchConfig,
    gate: MotionGate,
    tracker: TrackManager,
    pipeline: FacePipeline,
    sink: EventSink,
    display: Box<dyn DisplaySink>,
    state: SessionState,
    stats: SessionStats,
    stop_flag: Arc<AtomicBool>,
    pause_flag: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: FacewatchConfig,
        pipeline: FacePipeline,
        sink: EventSink,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        let gate = MotionGate::new(config.motion.clone());
        let tracker = TrackManager::from_settings(&config.performance);
        Self {
            config,
            gate,
            tracker,
            pipeline,
            sink,
            display,
            state: SessionState::Initializing,
            stats: SessionStats::default(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            pause_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Flag the session to stop. Safe from any thread, idempotent: the
    /// second and later calls change nothing.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Handle for external stop wiring (signal handlers).
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn pause(&self) {
        self.pause_flag.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause_flag.store(false, Ordering::SeqCst);
    }

    /// Run the session loop until a limit, a stop signal, or a fatal
    /// source failure. Always reaches `Stopped`, always closes the
    /// capture handle exactly once, always returns final statistics.
    pub fn run(&mut self, mut capture: CaptureHandle, limits: SessionLimits) -> SessionResult {
        self.stats = SessionStats::default();
        self.state = SessionState::Running;
        self.gate.reset();

        let started = Instant::now();
        let frame_interval = Duration::from_secs(1) / self.config.video.fps.max(1);
        let mut frames_seen: u64 = 0;
        let mut last_motion_at: Option<Instant> = None;
        let mut failure: Option<String> = None;

        log::info!(
            "session running: source={} fps={} frame_skip={} detection_interval={}",
            self.config.video.source,
            self.config.video.fps,
            self.config.performance.frame_skip,
            self.config.performance.detection_interval
        );

        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                log::info!("stop signal received");
                break;
            }
            if let Some(duration) = limits.duration {
                if started.elapsed() >= duration {
                    log::info!("duration limit reached ({:?})", duration);
                    break;
                }
            }
            if let Some(max_frames) = limits.max_frames {
                if self.stats.frames_processed >= max_frames {
                    log::info!("frame limit reached ({})", max_frames);
                    break;
                }
            }

            if self.pause_flag.load(Ordering::SeqCst) {
                self.state = SessionState::Paused;
                std::thread::sleep(frame_interval);
                continue;
            }
            self.state = SessionState::Running;

            let frame = match capture.read_timeout(frame_interval) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    if is_source_unavailable(&e) {
                        log::error!("fatal source failure: {}", e);
                        failure = Some(e.to_string());
                    } else {
                        log::error!("unexpected capture error: {}", e);
                        failure = Some(e.to_string());
                    }
                    break;
                }
            };

            frames_seen += 1;
            if (frames_seen - 1) % self.config.performance.frame_skip as u64 != 0 {
                continue;
            }

            self.process_frame(&frame, &mut last_motion_at);
        }

        self.state = SessionState::Stopping;
        capture.close();
        let sink_stats = self.sink.shutdown(SHUTDOWN_GRACE);
        self.stats.events_dropped = sink_stats.dropped;
        self.state = SessionState::Stopped;

        let status = match failure {
            Some(reason) => SessionStatus::Failed { reason },
            None if self.stats.events_dropped > 0 => SessionStatus::Degraded {
                events_dropped: self.stats.events_dropped,
            },
            None => SessionStatus::Clean,
        };

        let result = SessionResult {
            stats: self.stats.clone(),
            elapsed: started.elapsed(),
            status,
        };
        log::info!(
            "session stopped after {:?}: frames={} motion={} faces={} recognized={} events={} dropped={}",
            result.elapsed,
            result.stats.frames_processed,
            result.stats.motion_detected,
            result.stats.faces_detected,
            result.stats.faces_recognized,
            result.stats.recognition_events,
            result.stats.events_dropped
        );
        result
    }

    fn process_frame(&mut self, frame: &crate::frame::Frame, last_motion_at: &mut Option<Instant>) {
        self.stats.frames_processed += 1;
        let now = frame.captured_at;

        let motion = self.gate.detect(frame);
        if motion.present {
            // A disabled gate reports present on every frame; that is an
            // admission decision, not observed motion.
            if self.config.motion.enabled {
                self.stats.motion_detected += 1;
            }
            *last_motion_at = Some(now);
        }

        // Face analysis stays active through the cooldown window after the
        // last motion frame.
        let within_cooldown = last_motion_at.map_or(false, |at| {
            now.duration_since(at) <= self.config.motion.cooldown
        });
        let analysis_active = motion.present || within_cooldown;

        if analysis_active {
            if self.config.face_detection.use_tracking {
                if self.tracker.should_run_detection() {
                    let observations = self.pipeline.analyze(frame);
                    self.emit_observations(frame, &observations);
                    self.tracker.observe_detections(now, &observations);
                } else {
                    self.tracker.observe_tracking_only(now, &motion.regions);
                }
            } else {
                let observations = self.pipeline.analyze(frame);
                self.emit_observations(frame, &observations);
                self.tracker.observe_detections(now, &observations);
            }
        } else {
            // Keep track lifetimes moving even on quiet frames.
            self.tracker.observe_tracking_only(now, &[]);
        }

        let status_line = if analysis_active {
            "active: motion + face analysis"
        } else {
            "standby: motion only"
        };
        let annotated = annotate(frame, self.tracker.tracks(), status_line.to_string());
        self.display.present(&annotated, &self.stats);
    }

    /// Fold one full-detection pass into stats and the event sink.
    ///
    /// `recognition_events` counts every emitted recognition exactly once,
    /// independent of whether persistence later succeeds.
    fn emit_observations(&mut self, frame: &crate::frame::Frame, observations: &[FaceObservation]) {
        self.stats.faces_detected += observations.len() as u64;
        for observation in observations {
            if !is_known(observation) {
                continue;
            }
            self.stats.faces_recognized += 1;
            self.stats.recognition_events += 1;
            self.sink.record(RecognitionEvent {
                label: observation.label.clone(),
                confidence: observation.confidence,
                epoch_s: now_s().unwrap_or(frame.captured_epoch_s),
                frame_seq: frame.seq,
                region: Some(observation.region.rect),
            });
        }
    }
}

fn is_known(observation: &FaceObservation) -> bool {
    observation.label != crate::recognize::UNKNOWN_LABEL
}
