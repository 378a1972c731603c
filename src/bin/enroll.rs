//! enroll - add identity samples to the gallery store
//!
//! Captures frames from the configured source, locates the most prominent
//! face in each, and stores its embedding under the given label. Several
//! samples per person improve matching, so the default collects a handful.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;

use facewatch::config::FacewatchConfig;
use facewatch::detect::{assess_quality, BlobLocator, LocatorRegistry, MERGE_IOU};
use facewatch::recognize::{FaceEmbedder, GalleryEntry, HistogramEmbedder};
use facewatch::storage::{GalleryStore, SqliteStore};
use facewatch::{now_s, open_source, validate_label, CaptureHandle};

/// Frames inspected before giving up on finding enough samples.
const MAX_CAPTURE_FRAMES: u32 = 300;

#[derive(Parser, Debug)]
#[command(name = "enroll", about = "Enroll identity samples into the gallery")]
struct Args {
    /// Identity label to enroll (lowercase letters, digits, [_.-]).
    #[arg(long)]
    label: String,

    /// Number of face samples to collect.
    #[arg(long, default_value_t = 5)]
    samples: u32,

    /// TOML configuration file (overrides FACEWATCH_CONFIG).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    validate_label(&args.label)?;

    let cfg = match &args.config {
        Some(path) => FacewatchConfig::load_from(path)?,
        None => FacewatchConfig::load()?,
    };
    let store = SqliteStore::open(&cfg.db_path)?;

    let mut registry = LocatorRegistry::new(MERGE_IOU);
    registry.register(BlobLocator::new());
    let embedder = HistogramEmbedder::new();

    let source = open_source(&cfg.video)?;
    let mut capture = CaptureHandle::open(source, cfg.video.fps)?;
    let frame_interval = Duration::from_secs(1) / cfg.video.fps.max(1);

    log::info!("collecting {} samples for '{}'", args.samples, args.label);

    let mut collected = 0u32;
    let mut inspected = 0u32;
    while collected < args.samples && inspected < MAX_CAPTURE_FRAMES {
        let Some(frame) = capture.read_timeout(frame_interval)? else {
            continue;
        };
        inspected += 1;

        // Best candidate: highest quality region that meets the size gate.
        let candidate = registry
            .locate(&frame)
            .into_iter()
            .filter(|region| {
                region.rect.w >= cfg.face_detection.min_face_size
                    && region.rect.h >= cfg.face_detection.min_face_size
                    && region.rect.w <= cfg.face_detection.max_face_size
                    && region.rect.h <= cfg.face_detection.max_face_size
            })
            .map(|region| {
                let quality = assess_quality(&frame, &region.rect);
                (region, quality)
            })
            .filter(|(_, quality)| *quality >= cfg.face_detection.min_quality_score)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some((region, quality)) = candidate else {
            continue;
        };
        let embedding = match embedder.embed(&frame, &region) {
            Ok(embedding) => embedding,
            Err(e) => {
                log::debug!("frame {}: {}", frame.seq, e);
                continue;
            }
        };

        let id = store.insert(&GalleryEntry {
            label: args.label.clone(),
            embedding,
            enrolled_epoch_s: now_s()?,
        })?;
        collected += 1;
        log::info!(
            "sample {}/{} stored (id={}, quality={:.2}, region={:?})",
            collected,
            args.samples,
            id,
            quality,
            region.rect
        );
    }
    capture.close();

    if collected == 0 {
        return Err(anyhow!(
            "no usable face found in {} frames; check lighting and face size settings",
            inspected
        ));
    }

    let counts = store.count_by_label()?;
    println!("enrolled {} samples for '{}'", collected, args.label);
    println!("gallery now holds:");
    let mut labels: Vec<_> = counts.iter().collect();
    labels.sort();
    for (label, count) in labels {
        println!("  {}: {} samples", label, count);
    }
    Ok(())
}
