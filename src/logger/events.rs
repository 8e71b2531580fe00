//! Activity event channel: a dedicated logger thread owns the JSONL writer.
//!
//! All other threads send `ActivityEvent` via a bounded crossbeam channel.
//! Non-blocking `try_send()` ensures the read loop is never stalled by
//! logging back-pressure; full-channel drops are counted and reported.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, ScrError};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for diagnostics events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events logged through the diagnostics channel.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    IngestStarted {
        version: String,
        port: String,
        db_path: String,
        config_hash: String,
    },
    IngestStopped {
        reason: String,
        uptime_secs: u64,
        records_persisted: u64,
    },
    RawLine {
        line: String,
    },
    PatternMatched {
        pattern: String,
        line: String,
    },
    CycleCommitted {
        row_id: i64,
        fields: usize,
    },
    CycleDiscarded {
        fields_received: usize,
        min_fields: usize,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel requesting graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending diagnostics events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the logger thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
pub fn spawn_logger(
    jsonl_path: PathBuf,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("scr-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, jsonl_path, dropped_clone);
        })
        .map_err(|e| ScrError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(rx: Receiver<ActivityEvent>, jsonl_path: PathBuf, dropped: Arc<AtomicU64>) {
    let mut jsonl = JsonlWriter::open(jsonl_path);

    while let Ok(event) = rx.recv() {
        // Report accumulated drops before handling the next event.
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} diagnostics events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            jsonl.flush();
            jsonl.fsync();
            break;
        }

        let entry = event_to_log_entry(&event);
        jsonl.write_entry(&entry);
    }

    jsonl.flush();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::IngestStarted {
            version,
            port,
            db_path,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::IngestStart, Severity::Info);
            e.port = Some(port.clone());
            e.details = Some(format!(
                "v{version} db={db_path} config_hash={config_hash}"
            ));
            e
        }
        ActivityEvent::IngestStopped {
            reason,
            uptime_secs,
            records_persisted,
        } => {
            let mut e = LogEntry::new(EventType::IngestStop, Severity::Info);
            e.details = Some(format!(
                "reason={reason} uptime_secs={uptime_secs} records={records_persisted}"
            ));
            e
        }
        ActivityEvent::RawLine { line } => {
            let mut e = LogEntry::new(EventType::RawLine, Severity::Info);
            e.line = Some(line.clone());
            e
        }
        ActivityEvent::PatternMatched { pattern, line } => {
            let mut e = LogEntry::new(EventType::PatternMatch, Severity::Info);
            e.pattern = Some(pattern.clone());
            e.line = Some(line.clone());
            e
        }
        ActivityEvent::CycleCommitted { row_id, fields } => {
            let mut e = LogEntry::new(EventType::CycleCommit, Severity::Info);
            e.row_id = Some(*row_id);
            e.fields = Some(*fields);
            e
        }
        ActivityEvent::CycleDiscarded {
            fields_received,
            min_fields,
        } => {
            let mut e = LogEntry::new(EventType::CycleDiscard, Severity::Warning);
            e.fields = Some(*fields_received);
            e.min_fields = Some(*min_fields);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.details = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::IngestStop, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn events_reach_the_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let (handle, join) = spawn_logger(path.clone()).unwrap();

        handle.send(ActivityEvent::IngestStarted {
            version: "1.0.0".to_string(),
            port: "/dev/ttyUSB0".to_string(),
            db_path: "/tmp/db".to_string(),
            config_hash: "abc123".to_string(),
        });
        handle.send(ActivityEvent::CycleCommitted {
            row_id: 1,
            fields: 13,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "ingest_start");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "cycle_commit");
        assert_eq!(second["row_id"], 1);
        assert_eq!(second["fields"], 13);
    }

    #[test]
    fn discard_event_carries_threshold_context() {
        let entry = event_to_log_entry(&ActivityEvent::CycleDiscarded {
            fields_received: 4,
            min_fields: 10,
        });
        assert_eq!(entry.event, EventType::CycleDiscard);
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.fields, Some(4));
        assert_eq!(entry.min_fields, Some(10));
    }

    #[test]
    fn handle_is_cloneable_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.jsonl");
        let (handle, join) = spawn_logger(path.clone()).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let h = handle.clone();
                std::thread::spawn(move || {
                    h.send(ActivityEvent::CycleCommitted {
                        row_id: i,
                        fields: 13,
                    });
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        handle.shutdown();
        join.join().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn no_drops_under_normal_load() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(dir.path().join("load.jsonl")).unwrap();
        for _ in 0..100 {
            handle.send(ActivityEvent::RawLine {
                line: "Modo: Manual".to_string(),
            });
        }
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
        join.join().unwrap();
    }
}
