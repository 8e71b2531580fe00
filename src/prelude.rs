//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use sensor_cycle_recorder::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, ScrError};

// Transport
pub use crate::transport::{LineRead, LineSource, open_line_source};

// Ingest
pub use crate::ingest::cycle::CycleAccumulator;
pub use crate::ingest::extract::{END_OF_CYCLE_MARKER, Extraction, FieldExtractor, PatternTag};
pub use crate::ingest::{FIELD_COUNT, Field, FieldValue, PendingFields};

// Store
pub use crate::store::record::SensorRecord;
pub use crate::store::sink::{CommitOutcome, CycleSink};
pub use crate::store::sqlite::RecordStore;

// Daemon
pub use crate::daemon::loop_main::{IngestDaemon, run_daemon};
pub use crate::daemon::signals::SignalHandler;
