//! Gallery and event stores.
//!
//! Persistence is reached through two narrow traits so the pipeline can be
//! tested against in-memory doubles (including one that always fails).
//! The sqlite implementation backs both; embeddings and regions are stored
//! as JSON payload columns.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::events::RecognitionEvent;
use crate::recognize::{Embedding, GalleryEntry};
use crate::PipelineError;

pub trait GalleryStore: Send {
    /// All enrolled entries, in insertion order. An empty result is valid.
    fn load_all(&self) -> Result<Vec<GalleryEntry>>;

    /// Persist one entry; returns its row id. Fails with
    /// `StoreUnavailable` when the store is unreachable.
    fn insert(&self, entry: &GalleryEntry) -> Result<i64>;

    /// Enrolled sample count per label.
    fn count_by_label(&self) -> Result<HashMap<String, usize>>;
}

pub trait EventStore: Send {
    /// Append one recognition event. Fails with `StoreUnavailable` when
    /// the store is unreachable.
    fn append(&self, event: &RecognitionEvent) -> Result<()>;

    /// The most recent `limit` events, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<RecognitionEvent>>;

    /// Recorded event count per label.
    fn count_by_label(&self) -> Result<HashMap<String, usize>>;
}

fn store_err(context: &str, e: impl std::fmt::Display) -> anyhow::Error {
    PipelineError::StoreUnavailable(format!("{}: {}", context, e)).into()
}

// ----------------------------------------------------------------------------
// Sqlite store
// ----------------------------------------------------------------------------

/// Sqlite-backed gallery and event store.
///
/// The connection lives behind a mutex so the store can be handed to the
/// event sink worker while enrollment tools use their own instance.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| store_err("open database", e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| store_err("open database", e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .expect("sqlite lock poisoned")
            .execute_batch(
                r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS gallery_entries (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              label TEXT NOT NULL,
              embedding_json TEXT NOT NULL,
              enrolled_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recognition_events (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              label TEXT NOT NULL,
              confidence REAL NOT NULL,
              recorded_at INTEGER NOT NULL,
              frame_seq INTEGER NOT NULL,
              region_json TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_gallery_label ON gallery_entries(label);
            CREATE INDEX IF NOT EXISTS idx_events_recorded ON recognition_events(recorded_at);
            "#,
            )
            .map_err(|e| store_err("ensure schema", e))?;
        Ok(())
    }
}

impl GalleryStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<GalleryEntry>> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn
            .prepare("SELECT label, embedding_json, enrolled_at FROM gallery_entries ORDER BY id ASC")
            .map_err(|e| store_err("load gallery", e))?;
        let mut rows = stmt.query([]).map_err(|e| store_err("load gallery", e))?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().map_err(|e| store_err("load gallery", e))? {
            let label: String = row.get(0).map_err(|e| store_err("load gallery", e))?;
            let embedding_json: String = row.get(1).map_err(|e| store_err("load gallery", e))?;
            let enrolled_at: i64 = row.get(2).map_err(|e| store_err("load gallery", e))?;
            let embedding: Embedding = serde_json::from_str(&embedding_json)?;
            entries.push(GalleryEntry {
                label,
                embedding,
                enrolled_epoch_s: enrolled_at as u64,
            });
        }
        Ok(entries)
    }

    fn insert(&self, entry: &GalleryEntry) -> Result<i64> {
        crate::validate_label(&entry.label)?;
        let embedding_json = serde_json::to_string(&entry.embedding)?;
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.execute(
            "INSERT INTO gallery_entries(label, embedding_json, enrolled_at) VALUES (?1, ?2, ?3)",
            params![entry.label, embedding_json, entry.enrolled_epoch_s as i64],
        )
        .map_err(|e| store_err("insert gallery entry", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn count_by_label(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn
            .prepare("SELECT label, COUNT(*) FROM gallery_entries GROUP BY label")
            .map_err(|e| store_err("count gallery", e))?;
        let mut rows = stmt.query([]).map_err(|e| store_err("count gallery", e))?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.next().map_err(|e| store_err("count gallery", e))? {
            let label: String = row.get(0).map_err(|e| store_err("count gallery", e))?;
            let count: i64 = row.get(1).map_err(|e| store_err("count gallery", e))?;
            counts.insert(label, count as usize);
        }
        Ok(counts)
    }
}

impl EventStore for SqliteStore {
    fn append(&self, event: &RecognitionEvent) -> Result<()> {
        let region_json = event
            .region
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.execute(
            r#"
            INSERT INTO recognition_events(label, confidence, recorded_at, frame_seq, region_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                event.label,
                event.confidence as f64,
                event.epoch_s as i64,
                event.frame_seq as i64,
                region_json,
            ],
        )
        .map_err(|e| store_err("append event", e))?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecognitionEvent>> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT label, confidence, recorded_at, frame_seq, region_json \
                 FROM recognition_events ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| store_err("read events", e))?;
        let mut rows = stmt
            .query(params![limit as i64])
            .map_err(|e| store_err("read events", e))?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().map_err(|e| store_err("read events", e))? {
            let label: String = row.get(0).map_err(|e| store_err("read events", e))?;
            let confidence: f64 = row.get(1).map_err(|e| store_err("read events", e))?;
            let recorded_at: i64 = row.get(2).map_err(|e| store_err("read events", e))?;
            let frame_seq: i64 = row.get(3).map_err(|e| store_err("read events", e))?;
            let region_json: Option<String> = row.get(4).map_err(|e| store_err("read events", e))?;
            let region = region_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?;
            events.push(RecognitionEvent {
                label,
                confidence: confidence as f32,
                epoch_s: recorded_at as u64,
                frame_seq: frame_seq as u64,
                region,
            });
        }
        Ok(events)
    }

    fn count_by_label(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = conn
            .prepare("SELECT label, COUNT(*) FROM recognition_events GROUP BY label")
            .map_err(|e| store_err("count events", e))?;
        let mut rows = stmt.query([]).map_err(|e| store_err("count events", e))?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.next().map_err(|e| store_err("count events", e))? {
            let label: String = row.get(0).map_err(|e| store_err("count events", e))?;
            let count: i64 = row.get(1).map_err(|e| store_err("count events", e))?;
            counts.insert(label, count as usize);
        }
        Ok(counts)
    }
}

// ----------------------------------------------------------------------------
// In-memory doubles
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryGalleryStore {
    entries: Mutex<Vec<GalleryEntry>>,
}

impl InMemoryGalleryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GalleryStore for InMemoryGalleryStore {
    fn load_all(&self) -> Result<Vec<GalleryEntry>> {
        Ok(self.entries.lock().expect("gallery lock poisoned").clone())
    }

    fn insert(&self, entry: &GalleryEntry) -> Result<i64> {
        crate::validate_label(&entry.label)?;
        let mut entries = self.entries.lock().expect("gallery lock poisoned");
        entries.push(entry.clone());
        Ok(entries.len() as i64)
    }

    fn count_by_label(&self) -> Result<HashMap<String, usize>> {
        let entries = self.entries.lock().expect("gallery lock poisoned");
        let mut counts = HashMap::new();
        for entry in entries.iter() {
            *counts.entry(entry.label.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<RecognitionEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: &RecognitionEvent) -> Result<()> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<RecognitionEvent>> {
        let events = self.events.lock().expect("event lock poisoned");
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    fn count_by_label(&self) -> Result<HashMap<String, usize>> {
        let events = self.events.lock().expect("event lock poisoned");
        let mut counts = HashMap::new();
        for event in events.iter() {
            *counts.entry(event.label.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Store double whose writes always fail with `StoreUnavailable`.
#[derive(Default)]
pub struct FailingEventStore;

impl EventStore for FailingEventStore {
    fn append(&self, _event: &RecognitionEvent) -> Result<()> {
        Err(store_err("append event", "store is down"))
    }

    fn recent(&self, _limit: usize) -> Result<Vec<RecognitionEvent>> {
        Err(store_err("read events", "store is down"))
    }

    fn count_by_label(&self) -> Result<HashMap<String, usize>> {
        Err(store_err("count events", "store is down"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::EMBEDDING_DIM;

    fn entry(label: &str, seed: f32) -> GalleryEntry {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[0] = seed;
        values[1] = 1.0 - seed;
        GalleryEntry {
            label: label.to_string(),
            embedding: Embedding::new(values).unwrap(),
            enrolled_epoch_s: 1_700_000_000,
        }
    }

    fn event(label: &str, seq: u64) -> RecognitionEvent {
        RecognitionEvent {
            label: label.to_string(),
            confidence: 0.9,
            epoch_s: 1_700_000_000 + seq,
            frame_seq: seq,
            region: Some(crate::frame::Rect::new(10, 10, 50, 50)),
        }
    }

    #[test]
    fn gallery_entries_round_trip_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&entry("alice", 0.2)).unwrap();
        store.insert(&entry("alice", 0.3)).unwrap();
        store.insert(&entry("bob", 0.7)).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].label, "alice");
        assert_eq!(loaded[2].label, "bob");
        assert_eq!(loaded[0].embedding, entry("alice", 0.2).embedding);

        let counts = GalleryStore::count_by_label(&store).unwrap();
        assert_eq!(counts.get("alice"), Some(&2));
        assert_eq!(counts.get("bob"), Some(&1));
    }

    #[test]
    fn invalid_labels_are_rejected_at_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert(&entry("has space", 0.5)).is_err());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn recent_events_come_back_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        for seq in 1..=5 {
            store.append(&event("alice", seq)).unwrap();
        }

        let recent = store.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].frame_seq, 5);
        assert_eq!(recent[1].frame_seq, 4);
        assert_eq!(recent[0].region, Some(crate::frame::Rect::new(10, 10, 50, 50)));
    }

    #[test]
    fn event_counts_group_by_label() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(&event("alice", 1)).unwrap();
        store.append(&event("alice", 2)).unwrap();
        store.append(&event("unknown", 3)).unwrap();

        let counts = EventStore::count_by_label(&store).unwrap();
        assert_eq!(counts.get("alice"), Some(&2));
        assert_eq!(counts.get("unknown"), Some(&1));
    }

    #[test]
    fn in_memory_store_mirrors_sqlite_behavior() {
        let store = InMemoryEventStore::new();
        for seq in 1..=3 {
            store.append(&event("bob", seq)).unwrap();
        }
        let recent = store.recent(2).unwrap();
        assert_eq!(recent[0].frame_seq, 3);
        assert_eq!(recent[1].frame_seq, 2);
    }

    #[test]
    fn failing_store_reports_store_unavailable() {
        let store = FailingEventStore;
        let err = store.append(&event("alice", 1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::StoreUnavailable(_))
        ));
    }
}
