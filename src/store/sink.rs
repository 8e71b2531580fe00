//! Commit gate between the accumulator and the store.
//!
//! Applies the completeness threshold, stamps the capture time, and retries
//! transient insert failures a bounded number of times before giving up.

#![allow(missing_docs)]

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::errors::{Result, ScrError};
use crate::ingest::PendingFields;
use crate::store::record::SensorRecord;
use crate::store::sqlite::RecordStore;

/// Delay between insert retries. Long enough for a WAL writer to finish a
/// checkpoint, short enough not to stall the read loop noticeably.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// What happened to a completed cycle at the commit gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The cycle met the threshold and was written.
    Persisted { row_id: i64 },
    /// The cycle carried too few fields and was dropped.
    Discarded { fields_received: usize },
}

/// Persists completed cycles that meet the completeness threshold.
pub struct CycleSink {
    store: RecordStore,
    min_fields: usize,
    persist_retries: u32,
}

impl CycleSink {
    pub fn new(store: RecordStore, min_fields: usize, persist_retries: u32) -> Self {
        Self {
            store,
            min_fields,
            persist_retries,
        }
    }

    /// Borrow the underlying store (diagnostics and tests).
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Commit one completed cycle. Incomplete cycles are discarded, never
    /// written partially.
    pub fn commit(
        &mut self,
        fields: &PendingFields,
        captured_at: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        if fields.len() < self.min_fields {
            return Ok(CommitOutcome::Discarded {
                fields_received: fields.len(),
            });
        }

        let record = SensorRecord::from_fields(fields, captured_at);
        let row_id = self.append_with_retry(&record)?;
        Ok(CommitOutcome::Persisted { row_id })
    }

    fn append_with_retry(&mut self, record: &SensorRecord) -> Result<i64> {
        let attempts = self.persist_retries + 1;
        let mut last_err: Option<ScrError> = None;

        for attempt in 1..=attempts {
            match self.store.append(record) {
                Ok(row_id) => return Ok(row_id),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    eprintln!(
                        "[SCR-SINK] insert attempt {attempt}/{attempts} failed: {err}, retrying"
                    );
                    last_err = Some(err);
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(err) => {
                    last_err = Some(err);
                    break;
                }
            }
        }

        let details = last_err.map_or_else(|| "unknown".to_string(), |err| err.to_string());
        Err(ScrError::Persist { attempts, details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Field, FieldValue};
    use std::collections::HashMap;

    fn sink_with(min_fields: usize) -> (tempfile::TempDir, CycleSink) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("sink.db")).unwrap();
        (dir, CycleSink::new(store, min_fields, 2))
    }

    fn fields_of(n: usize) -> PendingFields {
        let mut fields: PendingFields = HashMap::new();
        for (i, f) in Field::all().into_iter().take(n).enumerate() {
            let v = match f {
                Field::TemperatureC | Field::AmbientHumidityPct => FieldValue::Real(i as f64),
                _ => FieldValue::Int(i as i64),
            };
            fields.insert(f, v);
        }
        fields
    }

    #[test]
    fn complete_cycle_is_persisted() {
        let (_dir, mut sink) = sink_with(10);
        let outcome = sink.commit(&fields_of(13), Utc::now()).unwrap();
        assert_eq!(outcome, CommitOutcome::Persisted { row_id: 1 });
        assert_eq!(sink.store().count().unwrap(), 1);
    }

    #[test]
    fn cycle_at_exact_threshold_is_persisted() {
        let (_dir, mut sink) = sink_with(10);
        let outcome = sink.commit(&fields_of(10), Utc::now()).unwrap();
        assert!(matches!(outcome, CommitOutcome::Persisted { .. }));
    }

    #[test]
    fn incomplete_cycle_is_discarded_without_writing() {
        let (_dir, mut sink) = sink_with(10);
        let outcome = sink.commit(&fields_of(9), Utc::now()).unwrap();
        assert_eq!(outcome, CommitOutcome::Discarded { fields_received: 9 });
        assert_eq!(sink.store().count().unwrap(), 0);
    }

    #[test]
    fn empty_cycle_is_discarded() {
        let (_dir, mut sink) = sink_with(1);
        let outcome = sink.commit(&HashMap::new(), Utc::now()).unwrap();
        assert_eq!(outcome, CommitOutcome::Discarded { fields_received: 0 });
    }

    #[test]
    fn threshold_of_one_accepts_single_field() {
        let (_dir, mut sink) = sink_with(1);
        let outcome = sink.commit(&fields_of(1), Utc::now()).unwrap();
        assert!(matches!(outcome, CommitOutcome::Persisted { .. }));
    }
}
