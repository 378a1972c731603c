//! export_events - list recent recognition events and attendance counts

use anyhow::Result;
use clap::Parser;

use facewatch::config::FacewatchConfig;
use facewatch::storage::{EventStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "export_events", about = "Dump recent recognition events")]
struct Args {
    /// Maximum number of events to list, newest first.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Also print per-label event counts.
    #[arg(long)]
    counts: bool,

    /// TOML configuration file (overrides FACEWATCH_CONFIG).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => FacewatchConfig::load_from(path)?,
        None => FacewatchConfig::load()?,
    };
    let store = SqliteStore::open(&cfg.db_path)?;

    let events = store.recent(args.limit)?;
    if events.is_empty() {
        println!("no recognition events recorded");
    }
    for event in &events {
        let region = event
            .region
            .map(|r| format!(" at {},{} {}x{}", r.x, r.y, r.w, r.h))
            .unwrap_or_default();
        println!(
            "{}  {}  confidence={:.2}  frame={}{}",
            event.epoch_s, event.label, event.confidence, event.frame_seq, region
        );
    }

    if args.counts {
        let counts = store.count_by_label()?;
        let mut labels: Vec<_> = counts.iter().collect();
        labels.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        println!("events per label:");
        for (label, count) in labels {
            println!("  {}: {}", label, count);
        }
    }
    Ok(())
}
