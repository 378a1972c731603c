//! facewatchd - attendance pipeline daemon
//!
//! This daemon:
//! 1. Loads configuration (TOML file + FACEWATCH_* environment overrides)
//! 2. Loads the enrolled gallery from the sqlite store
//! 3. Opens the frame source behind the buffered capture path
//! 4. Runs the motion-gated session loop until a limit or SIGINT
//! 5. Reports final statistics and the clean-vs-degraded outcome

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::Ordering;
use std::time::Duration;

use facewatch::config::FacewatchConfig;
use facewatch::detect::{BlobLocator, LocatorRegistry, MERGE_IOU};
use facewatch::recognize::{Gallery, GalleryHandle, HistogramEmbedder};
use facewatch::storage::{GalleryStore, SqliteStore};
use facewatch::{
    open_source, CaptureHandle, EventSink, FacePipeline, LogDisplay, Orchestrator,
    SessionLimits, SessionStatus,
};

#[derive(Parser, Debug)]
#[command(name = "facewatchd", about = "Motion-gated face recognition daemon")]
struct Args {
    /// TOML configuration file (overrides FACEWATCH_CONFIG).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Stop after this many seconds of wall-clock time.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Stop after processing this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => FacewatchConfig::load_from(path)?,
        None => FacewatchConfig::load()?,
    };

    // Separate connections: the event sink worker owns one store, the
    // gallery load uses another.
    let gallery_store = SqliteStore::open(&cfg.db_path)?;
    let event_store = SqliteStore::open(&cfg.db_path)?;

    let entries = gallery_store.load_all()?;
    let gallery = Gallery::new(entries);
    if gallery.is_empty() {
        log::warn!("gallery is empty; every face will classify as unknown");
    } else {
        log::info!(
            "gallery loaded: {} samples across {} identities",
            gallery.len(),
            gallery.label_count()
        );
    }
    let gallery = std::sync::Arc::new(GalleryHandle::new(gallery));

    let mut registry = LocatorRegistry::new(MERGE_IOU);
    registry.register(BlobLocator::new());
    log::info!("face locating strategies: {}", registry.names().join(", "));

    let pipeline = FacePipeline::new(
        registry,
        Box::new(HistogramEmbedder::new()),
        gallery,
        cfg.face_detection.clone(),
        cfg.face_recognition.clone(),
        cfg.performance.max_faces_per_frame,
    );
    let sink = EventSink::new(Box::new(event_store));

    let mut orchestrator = Orchestrator::new(cfg.clone(), pipeline, sink, Box::new(LogDisplay));

    let stop_flag = orchestrator.stop_flag();
    ctrlc::set_handler(move || {
        log::info!("SIGINT received, stopping session");
        stop_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("failed to install signal handler: {}", e))?;

    let source = open_source(&cfg.video)?;
    let capture = CaptureHandle::open(source, cfg.video.fps)?;

    let limits = SessionLimits {
        duration: args.duration_secs.map(Duration::from_secs),
        max_frames: args.max_frames,
    };
    let result = orchestrator.run(capture, limits);

    println!("session complete ({:.1}s)", result.elapsed.as_secs_f64());
    println!("  frames_processed:   {}", result.stats.frames_processed);
    println!("  motion_detected:    {}", result.stats.motion_detected);
    println!("  faces_detected:     {}", result.stats.faces_detected);
    println!("  faces_recognized:   {}", result.stats.faces_recognized);
    println!("  recognition_events: {}", result.stats.recognition_events);
    println!("  events_dropped:     {}", result.stats.events_dropped);

    match result.status {
        SessionStatus::Clean => {
            println!("status: clean");
            Ok(())
        }
        SessionStatus::Degraded { events_dropped } => {
            println!("status: degraded ({} events dropped)", events_dropped);
            Ok(())
        }
        SessionStatus::Failed { reason } => {
            println!("status: failed ({})", reason);
            Err(anyhow!("session failed: {}", reason))
        }
    }
}
