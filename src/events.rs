//! Recognition events and the non-blocking persistence sink.
//!
//! The real-time loop must never wait on storage. `EventSink::record`
//! pushes onto a bounded queue and returns; a worker thread drains the
//! queue into the event store with a one-retry budget per event. A full
//! queue drops the oldest unsent event, a failed write (after retry) drops
//! that event; both only bump the degradation counter and log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::frame::Rect;
use crate::storage::EventStore;

/// Bounded queue size between the loop and the persistence worker.
const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Attempts per event: the initial write plus one retry.
const APPEND_ATTEMPTS: u32 = 2;

/// One persisted classification outcome. Append-only, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    pub label: String,
    pub confidence: f32,
    /// Wall-clock time of the observation, seconds since the unix epoch.
    pub epoch_s: u64,
    /// Sequence number of the source frame.
    pub frame_seq: u64,
    pub region: Option<Rect>,
}

/// Counters exposed by the sink.
#[derive(Clone, Debug, Default)]
pub struct SinkStats {
    pub recorded: u64,
    pub persisted: u64,
    /// Events lost to queue overflow or failed writes.
    pub dropped: u64,
}

struct SinkShared {
    queue: Mutex<VecDeque<RecognitionEvent>>,
    wakeup: Condvar,
    shutting_down: AtomicBool,
    recorded: AtomicU64,
    persisted: AtomicU64,
    dropped: AtomicU64,
}

pub struct EventSink {
    shared: Arc<SinkShared>,
    capacity: usize,
    worker: Option<JoinHandle<()>>,
}

impl EventSink {
    pub fn new(store: Box<dyn EventStore>) -> Self {
        Self::with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(store: Box<dyn EventStore>, capacity: usize) -> Self {
        let shared = Arc::new(SinkShared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            wakeup: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            recorded: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("facewatch-events".to_string())
            .spawn(move || drain_loop(worker_shared, store))
            .ok();
        if worker.is_none() {
            log::error!("failed to spawn event sink worker; all events will be dropped");
        }

        Self {
            shared,
            capacity: capacity.max(1),
            worker,
        }
    }

    /// Enqueue an event for persistence. Never blocks on storage and
    /// never fails: a full queue drops the oldest unsent event.
    pub fn record(&self, event: RecognitionEvent) {
        self.shared.recorded.fetch_add(1, Ordering::SeqCst);
        {
            let mut queue = self.shared.queue.lock().expect("event queue poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                log::warn!("event queue full, dropped oldest unsent event");
            }
            queue.push_back(event);
        }
        self.shared.wakeup.notify_one();
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            recorded: self.shared.recorded.load(Ordering::SeqCst),
            persisted: self.shared.persisted.load(Ordering::SeqCst),
            dropped: self.shared.dropped.load(Ordering::SeqCst),
        }
    }

    /// Flush what the worker can manage within `grace`, then abandon the
    /// rest. Idempotent; returns the final counters.
    pub fn shutdown(&mut self, grace: Duration) -> SinkStats {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.take() {
            let deadline = Instant::now() + grace;
            while !worker.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                // Abandon: outstanding events count as dropped.
                let remaining = self
                    .shared
                    .queue
                    .lock()
                    .expect("event queue poisoned")
                    .len() as u64;
                self.shared.dropped.fetch_add(remaining, Ordering::SeqCst);
                log::warn!(
                    "event sink worker missed the {}ms shutdown grace, abandoning {} events",
                    grace.as_millis(),
                    remaining
                );
            }
        }
        self.stats()
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(200));
    }
}

fn drain_loop(shared: Arc<SinkShared>, store: Box<dyn EventStore>) {
    loop {
        let event = {
            let mut queue = shared.queue.lock().expect("event queue poisoned");
            loop {
                if let Some(event) = queue.pop_front() {
                    break Some(event);
                }
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break None;
                }
                let (guard, _) = shared
                    .wakeup
                    .wait_timeout(queue, Duration::from_millis(50))
                    .expect("event queue poisoned");
                queue = guard;
            }
        };
        let Some(event) = event else {
            return;
        };

        let mut persisted = false;
        for attempt in 1..=APPEND_ATTEMPTS {
            match store.append(&event) {
                Ok(()) => {
                    persisted = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "event append attempt {}/{} failed: {}",
                        attempt,
                        APPEND_ATTEMPTS,
                        e
                    );
                }
            }
        }
        if persisted {
            shared.persisted.fetch_add(1, Ordering::SeqCst);
        } else {
            shared.dropped.fetch_add(1, Ordering::SeqCst);
            log::warn!(
                "dropping event for '{}' after {} attempts",
                event.label,
                APPEND_ATTEMPTS
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailingEventStore, InMemoryEventStore};

    fn event(seq: u64) -> RecognitionEvent {
        RecognitionEvent {
            label: "alice".to_string(),
            confidence: 0.9,
            epoch_s: seq,
            frame_seq: seq,
            region: None,
        }
    }

    #[test]
    fn events_drain_into_the_store_in_order() {
        let store = Arc::new(InMemoryEventStore::new());
        struct Shared(Arc<InMemoryEventStore>);
        impl EventStore for Shared {
            fn append(&self, event: &RecognitionEvent) -> anyhow::Result<()> {
                self.0.append(event)
            }
            fn recent(&self, limit: usize) -> anyhow::Result<Vec<RecognitionEvent>> {
                self.0.recent(limit)
            }
            fn count_by_label(
                &self,
            ) -> anyhow::Result<std::collections::HashMap<String, usize>> {
                self.0.count_by_label()
            }
        }

        let mut sink = EventSink::new(Box::new(Shared(store.clone())));
        for seq in 1..=3 {
            sink.record(event(seq));
        }
        let stats = sink.shutdown(Duration::from_secs(2));

        assert_eq!(stats.recorded, 3);
        assert_eq!(stats.persisted, 3);
        assert_eq!(stats.dropped, 0);
        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].frame_seq, 3);
    }

    #[test]
    fn failing_store_never_propagates_and_counts_drops() {
        let mut sink = EventSink::new(Box::new(FailingEventStore));
        for seq in 1..=5 {
            sink.record(event(seq));
        }
        let stats = sink.shutdown(Duration::from_secs(2));

        assert_eq!(stats.recorded, 5);
        assert_eq!(stats.persisted, 0);
        assert_eq!(stats.dropped, 5);
    }

    #[test]
    fn overflow_drops_the_oldest_event() {
        // No worker drain race: the store blocks forever on the first
        // append, so queued events stay queued.
        struct StuckStore;
        impl EventStore for StuckStore {
            fn append(&self, _event: &RecognitionEvent) -> anyhow::Result<()> {
                std::thread::sleep(Duration::from_secs(3600));
                Ok(())
            }
            fn recent(&self, _limit: usize) -> anyhow::Result<Vec<RecognitionEvent>> {
                Ok(vec![])
            }
            fn count_by_label(
                &self,
            ) -> anyhow::Result<std::collections::HashMap<String, usize>> {
                Ok(Default::default())
            }
        }

        let mut sink = EventSink::with_capacity(Box::new(StuckStore), 2);
        // One event is pulled by the worker and sticks in append; the
        // queue then holds at most two.
        for seq in 1..=5 {
            sink.record(event(seq));
            std::thread::sleep(Duration::from_millis(10));
        }

        let queued: Vec<u64> = sink
            .shared
            .queue
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.frame_seq)
            .collect();
        assert_eq!(queued, vec![4, 5], "oldest events were dropped first");
        assert!(sink.stats().dropped >= 2);

        let stats = sink.shutdown(Duration::from_millis(50));
        assert_eq!(stats.recorded, 5);
    }
}
