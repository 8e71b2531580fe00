//! JSONL diagnostics log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all`, so a
//! process tailing the file never sees an interleaved partial line.
//!
//! Degradation chain: primary file, then stderr with an `[SCR-JSONL]`
//! prefix, then silent discard. The recorder must never crash because its
//! diagnostics file went away.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ScrError};

/// Severity level for diagnostics events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event types in the ingest activity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IngestStart,
    IngestStop,
    RawLine,
    PatternMatch,
    CycleCommit,
    CycleDiscard,
    Error,
}

/// One JSONL entry. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Transport address the event relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Raw line text (for `raw_line` and `pattern_match`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Pattern label that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Database row id of a committed cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<i64>,
    /// Populated field count at cycle end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<usize>,
    /// Completeness threshold in force.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_fields: Option<usize>,
    /// SCR error code if the event reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create an entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            port: None,
            line: None,
            pattern: None,
            row_id: None,
            fields: None,
            min_fields: None,
            error_code: None,
            details: None,
        }
    }
}

/// Degradation state of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// How often buffered lines are forced to disk.
const FSYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Append-only JSONL writer with stderr fallback.
pub struct JsonlWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    last_fsync: SystemTime,
}

impl JsonlWriter {
    /// Open the log file, degrading to stderr if it cannot be created.
    pub fn open(path: PathBuf) -> Self {
        let mut w = Self {
            path,
            writer: None,
            state: WriterState::Discard,
            last_fsync: SystemTime::now(),
        };
        w.try_open_primary();
        w
    }

    /// Write one entry as one atomic JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SCR-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Force an fsync on the underlying file.
    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
            self.last_fsync = SystemTime::now();
        }
    }

    /// Current degradation state label.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    // ──────────────────── internals ────────────────────

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal => {
                if let Some(w) = self.writer.as_mut() {
                    if w.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line);
                        return;
                    }
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[SCR-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let elapsed = SystemTime::now()
            .duration_since(self.last_fsync)
            .unwrap_or(Duration::ZERO);
        if elapsed >= FSYNC_INTERVAL {
            self.fsync();
        }
    }

    fn try_open_primary(&mut self) {
        match open_append(&self.path) {
            Ok(file) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.state = WriterState::Normal;
            }
            Err(e) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[SCR-JSONL] cannot open {}: {e}, using stderr",
                    self.path.display()
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[SCR-JSONL] write failed, using stderr");
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ScrError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ScrError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────── tests ────────────────────
