//! Execution event log
//!
//! Every scheduling decision and state transition is recorded as a typed
//! event. The log is cheap to clone (shared storage), safe to append from
//! workers, and serializable for export alongside the run report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ============================================================
// Event types
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number within the run
    pub id: u64,
    /// Milliseconds since the run started
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        task_count: usize,
    },
    RunCompleted {
        completed: usize,
        skipped: usize,
    },
    RunFailed {
        completed: usize,
        failed: usize,
    },
    /// Node entered the run's required set
    TaskScheduled {
        task_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    /// Output target already exists; node will not execute
    TaskSkipped {
        task_id: Arc<str>,
    },
    TaskStarted {
        task_id: Arc<str>,
    },
    TaskCompleted {
        task_id: Arc<str>,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Arc<str>,
        error: String,
    },
}

impl EventKind {
    /// Task this event concerns, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            EventKind::TaskScheduled { task_id, .. }
            | EventKind::TaskSkipped { task_id }
            | EventKind::TaskStarted { task_id }
            | EventKind::TaskCompleted { task_id, .. }
            | EventKind::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

// ============================================================
// Log
// ============================================================

/// Append-only event log shared across the coordinating loop and workers
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
    }

    /// Snapshot of all events in emission order
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events concerning one task
    pub fn for_task(&self, task_id: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_sequenced() {
        let log = EventLog::new();
        log.emit(EventKind::RunStarted { task_count: 2 });
        log.emit(EventKind::TaskStarted {
            task_id: "A".into(),
        });
        log.emit(EventKind::TaskCompleted {
            task_id: "A".into(),
            duration_ms: 5,
        });

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, 0);
        assert_eq!(events[2].id, 2);
    }

    #[test]
    fn filter_by_task() {
        let log = EventLog::new();
        log.emit(EventKind::TaskStarted {
            task_id: "A".into(),
        });
        log.emit(EventKind::TaskStarted {
            task_id: "B".into(),
        });
        log.emit(EventKind::TaskCompleted {
            task_id: "A".into(),
            duration_ms: 1,
        });

        assert_eq!(log.for_task("A").len(), 2);
        assert_eq!(log.for_task("B").len(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let log = EventLog::new();
        log.emit(EventKind::TaskSkipped {
            task_id: "Fetch".into(),
        });
        let json = serde_json::to_string(&log.events()[0]).unwrap();
        assert!(json.contains(r#""event":"task_skipped""#));
        assert!(json.contains(r#""task_id":"Fetch""#));
    }
}
