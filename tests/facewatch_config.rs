use std::sync::Mutex;

use tempfile::NamedTempFile;

use facewatch::config::FacewatchConfig;
use facewatch::PipelineError;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FACEWATCH_CONFIG",
        "FACEWATCH_SOURCE",
        "FACEWATCH_DB_PATH",
        "FACEWATCH_FPS",
        "FACEWATCH_FRAME_SKIP",
        "FACEWATCH_DETECTION_INTERVAL",
        "FACEWATCH_MOTION_ENABLED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [video]
        source = "rtsp://camera-1"
        frame_width = 800
        frame_height = 600
        fps = 12

        [motion_detection]
        threshold = 30
        min_area = 250
        cooldown_secs = 1.5

        [face_recognition]
        recognition_threshold = 0.55
        unknown_face_threshold = 0.75

        [performance]
        frame_skip = 2
        detection_interval = 8
        tracking_timeout_secs = 1.0
        max_faces_per_frame = 3

        [storage]
        db_path = "facewatch_prod.db"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("FACEWATCH_CONFIG", file.path());
    std::env::set_var("FACEWATCH_SOURCE", "stub://override");
    std::env::set_var("FACEWATCH_FRAME_SKIP", "4");

    let cfg = FacewatchConfig::load().expect("load config");

    assert_eq!(cfg.video.source, "stub://override");
    assert_eq!(cfg.video.frame_width, 800);
    assert_eq!(cfg.video.frame_height, 600);
    assert_eq!(cfg.video.fps, 12);
    assert_eq!(cfg.motion.threshold, 30);
    assert_eq!(cfg.motion.min_area, 250);
    assert_eq!(cfg.motion.cooldown.as_millis(), 1500);
    assert!((cfg.face_recognition.recognition_threshold - 0.55).abs() < 1e-6);
    assert_eq!(cfg.performance.frame_skip, 4);
    assert_eq!(cfg.performance.detection_interval, 8);
    assert_eq!(cfg.performance.max_faces_per_frame, 3);
    assert_eq!(cfg.db_path, "facewatch_prod.db");

    clear_env();
}

#[test]
fn out_of_range_values_fail_startup_with_config_invalid() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [video]
        fps = 0
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("FACEWATCH_CONFIG", file.path());

    let err = FacewatchConfig::load().expect_err("zero fps must be rejected");
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::ConfigInvalid(_))
    ));

    clear_env();
}

#[test]
fn malformed_env_override_fails_startup() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FACEWATCH_FPS", "fast");
    let err = FacewatchConfig::load().expect_err("non-numeric fps must be rejected");
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::ConfigInvalid(_))
    ));

    clear_env();
}
