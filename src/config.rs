use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::PipelineError;

const DEFAULT_SOURCE: &str = "stub://front_door";
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_MOTION_THRESHOLD: u8 = 25;
const DEFAULT_MOTION_MIN_AREA: u32 = 500;
const DEFAULT_MOTION_COOLDOWN_SECS: f64 = 3.0;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_MIN_FACE_SIZE: u32 = 60;
const DEFAULT_MAX_FACE_SIZE: u32 = 400;
const DEFAULT_MIN_QUALITY_SCORE: f32 = 0.2;
const DEFAULT_RECOGNITION_THRESHOLD: f32 = 0.6;
const DEFAULT_UNKNOWN_FACE_THRESHOLD: f32 = 0.8;
const DEFAULT_FRAME_SKIP: u32 = 1;
const DEFAULT_DETECTION_INTERVAL: u32 = 5;
const DEFAULT_TRACKING_TIMEOUT_SECS: f64 = 2.0;
const DEFAULT_MAX_FACES_PER_FRAME: usize = 4;
const DEFAULT_DB_PATH: &str = "facewatch.db";

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    video: Option<VideoFile>,
    motion_detection: Option<MotionFile>,
    face_detection: Option<FaceDetectionFile>,
    face_recognition: Option<FaceRecognitionFile>,
    performance: Option<PerformanceFile>,
    storage: Option<StorageFile>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoFile {
    source: Option<String>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionFile {
    enabled: Option<bool>,
    threshold: Option<u8>,
    min_area: Option<u32>,
    cooldown_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct FaceDetectionFile {
    min_confidence: Option<f32>,
    min_face_size: Option<u32>,
    max_face_size: Option<u32>,
    min_quality_score: Option<f32>,
    use_tracking: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct FaceRecognitionFile {
    recognition_threshold: Option<f32>,
    unknown_face_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct PerformanceFile {
    frame_skip: Option<u32>,
    detection_interval: Option<u32>,
    tracking_timeout_secs: Option<f64>,
    max_faces_per_frame: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageFile {
    db_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FacewatchConfig {
    pub video: VideoSettings,
    pub motion: MotionSettings,
    pub face_detection: FaceDetectionSettings,
    pub face_recognition: FaceRecognitionSettings,
    pub performance: PerformanceSettings,
    pub db_path: String,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub enabled: bool,
    /// Per-pixel luma difference cutoff.
    pub threshold: u8,
    /// Minimum contiguous changed region, in pixels.
    pub min_area: u32,
    /// How long face analysis stays active after the last motion frame.
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct FaceDetectionSettings {
    pub min_confidence: f32,
    pub min_face_size: u32,
    pub max_face_size: u32,
    pub min_quality_score: f32,
    pub use_tracking: bool,
}

#[derive(Debug, Clone)]
pub struct FaceRecognitionSettings {
    pub recognition_threshold: f32,
    pub unknown_face_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct PerformanceSettings {
    /// Process one frame out of every `frame_skip` (1 = every frame).
    pub frame_skip: u32,
    /// Frames between full face-detection passes.
    pub detection_interval: u32,
    pub tracking_timeout: Duration,
    pub max_faces_per_frame: usize,
}

impl FacewatchConfig {
    /// Load from `FACEWATCH_CONFIG` (TOML) if set, apply `FACEWATCH_*`
    /// environment overrides, then validate. Any out-of-range value is a
    /// startup failure.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FACEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit TOML file, skipping environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn defaults() -> Self {
        Self::from_file(ConfigFile::default())
    }

    fn from_file(file: ConfigFile) -> Self {
        let video = file.video.unwrap_or_default();
        let motion = file.motion_detection.unwrap_or_default();
        let face = file.face_detection.unwrap_or_default();
        let recog = file.face_recognition.unwrap_or_default();
        let perf = file.performance.unwrap_or_default();
        let storage = file.storage.unwrap_or_default();

        Self {
            video: VideoSettings {
                source: video.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                frame_width: video.frame_width.unwrap_or(DEFAULT_FRAME_WIDTH),
                frame_height: video.frame_height.unwrap_or(DEFAULT_FRAME_HEIGHT),
                fps: video.fps.unwrap_or(DEFAULT_FPS),
            },
            motion: MotionSettings {
                enabled: motion.enabled.unwrap_or(true),
                threshold: motion.threshold.unwrap_or(DEFAULT_MOTION_THRESHOLD),
                min_area: motion.min_area.unwrap_or(DEFAULT_MOTION_MIN_AREA),
                cooldown: Duration::from_secs_f64(
                    motion
                        .cooldown_secs
                        .unwrap_or(DEFAULT_MOTION_COOLDOWN_SECS)
                        .max(0.0),
                ),
            },
            face_detection: FaceDetectionSettings {
                min_confidence: face.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                min_face_size: face.min_face_size.unwrap_or(DEFAULT_MIN_FACE_SIZE),
                max_face_size: face.max_face_size.unwrap_or(DEFAULT_MAX_FACE_SIZE),
                min_quality_score: face.min_quality_score.unwrap_or(DEFAULT_MIN_QUALITY_SCORE),
                use_tracking: face.use_tracking.unwrap_or(true),
            },
            face_recognition: FaceRecognitionSettings {
                recognition_threshold: recog
                    .recognition_threshold
                    .unwrap_or(DEFAULT_RECOGNITION_THRESHOLD),
                unknown_face_threshold: recog
                    .unknown_face_threshold
                    .unwrap_or(DEFAULT_UNKNOWN_FACE_THRESHOLD),
            },
            performance: PerformanceSettings {
                frame_skip: perf.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
                detection_interval: perf.detection_interval.unwrap_or(DEFAULT_DETECTION_INTERVAL),
                tracking_timeout: Duration::from_secs_f64(
                    perf.tracking_timeout_secs
                        .unwrap_or(DEFAULT_TRACKING_TIMEOUT_SECS)
                        .max(0.0),
                ),
                max_faces_per_frame: perf
                    .max_faces_per_frame
                    .unwrap_or(DEFAULT_MAX_FACES_PER_FRAME),
            },
            db_path: storage.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("FACEWATCH_SOURCE") {
            if !source.trim().is_empty() {
                self.video.source = source;
            }
        }
        if let Ok(db_path) = std::env::var("FACEWATCH_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.db_path = db_path;
            }
        }
        if let Ok(fps) = std::env::var("FACEWATCH_FPS") {
            self.video.fps = fps
                .parse()
                .map_err(|_| config_err("FACEWATCH_FPS must be an integer"))?;
        }
        if let Ok(skip) = std::env::var("FACEWATCH_FRAME_SKIP") {
            self.performance.frame_skip = skip
                .parse()
                .map_err(|_| config_err("FACEWATCH_FRAME_SKIP must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("FACEWATCH_DETECTION_INTERVAL") {
            self.performance.detection_interval = interval
                .parse()
                .map_err(|_| config_err("FACEWATCH_DETECTION_INTERVAL must be an integer"))?;
        }
        if let Ok(enabled) = std::env::var("FACEWATCH_MOTION_ENABLED") {
            self.motion.enabled = enabled
                .parse()
                .map_err(|_| config_err("FACEWATCH_MOTION_ENABLED must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.video.source.trim().is_empty() {
            return Err(config_err("video.source must not be empty").into());
        }
        if self.video.frame_width < 16 || self.video.frame_height < 16 {
            return Err(config_err("video frame dimensions must be at least 16x16").into());
        }
        if self.video.fps == 0 {
            return Err(config_err("video.fps must be at least 1").into());
        }
        if self.motion.min_area == 0 {
            return Err(config_err("motion_detection.min_area must be at least 1").into());
        }
        if !(0.0..=1.0).contains(&self.face_detection.min_confidence) {
            return Err(config_err("face_detection.min_confidence must be in 0..=1").into());
        }
        if !(0.0..=1.0).contains(&self.face_detection.min_quality_score) {
            return Err(config_err("face_detection.min_quality_score must be in 0..=1").into());
        }
        if self.face_detection.min_face_size == 0
            || self.face_detection.min_face_size > self.face_detection.max_face_size
        {
            return Err(config_err(
                "face_detection.min_face_size must be non-zero and <= max_face_size",
            )
            .into());
        }
        let recog = &self.face_recognition;
        if !(0.0..=1.0).contains(&recog.recognition_threshold)
            || !(0.0..=1.0).contains(&recog.unknown_face_threshold)
        {
            return Err(config_err("face_recognition thresholds must be in 0..=1").into());
        }
        if recog.recognition_threshold > recog.unknown_face_threshold {
            return Err(config_err(
                "face_recognition.recognition_threshold must not exceed unknown_face_threshold",
            )
            .into());
        }
        if self.performance.frame_skip == 0 {
            return Err(config_err("performance.frame_skip must be at least 1").into());
        }
        if self.performance.detection_interval == 0 {
            return Err(config_err("performance.detection_interval must be at least 1").into());
        }
        if self.performance.tracking_timeout.is_zero() {
            return Err(config_err("performance.tracking_timeout_secs must be positive").into());
        }
        if self.performance.max_faces_per_frame == 0 {
            return Err(config_err("performance.max_faces_per_frame must be at least 1").into());
        }
        if self.db_path.trim().is_empty() {
            return Err(config_err("storage.db_path must not be empty").into());
        }
        Ok(())
    }
}

fn config_err(msg: &str) -> PipelineError {
    PipelineError::ConfigInvalid(msg.to_string())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        config_err(&format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| config_err(&format!("invalid config file {}: {}", path.display(), e)))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut cfg = FacewatchConfig::defaults();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.video.source, DEFAULT_SOURCE);
        assert_eq!(cfg.performance.frame_skip, 1);
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut cfg = FacewatchConfig::defaults();
        cfg.video.fps = 0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn zero_frame_skip_is_rejected() {
        let mut cfg = FacewatchConfig::defaults();
        cfg.performance.frame_skip = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_recognition_thresholds_are_rejected() {
        let mut cfg = FacewatchConfig::defaults();
        cfg.face_recognition.recognition_threshold = 0.9;
        cfg.face_recognition.unknown_face_threshold = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_quality_score_is_rejected() {
        let mut cfg = FacewatchConfig::defaults();
        cfg.face_detection.min_quality_score = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let raw = r#"
            [video]
            source = "stub://lab"
            fps = 15

            [motion_detection]
            threshold = 30
            min_area = 250

            [face_recognition]
            recognition_threshold = 0.55

            [performance]
            frame_skip = 2
            detection_interval = 10
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        let mut cfg = FacewatchConfig::from_file(file);
        cfg.validate().unwrap();

        assert_eq!(cfg.video.source, "stub://lab");
        assert_eq!(cfg.video.fps, 15);
        assert_eq!(cfg.motion.threshold, 30);
        assert_eq!(cfg.motion.min_area, 250);
        assert!((cfg.face_recognition.recognition_threshold - 0.55).abs() < 1e-6);
        assert_eq!(cfg.performance.frame_skip, 2);
        assert_eq!(cfg.performance.detection_interval, 10);
        // untouched sections keep defaults
        assert_eq!(cfg.face_detection.min_face_size, DEFAULT_MIN_FACE_SIZE);
        assert_eq!(cfg.db_path, DEFAULT_DB_PATH);
    }
}
