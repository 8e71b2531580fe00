//! Cycle accumulator: the in-progress record between end-of-cycle markers.
//!
//! An owned object passed by reference into the run loop — no ambient global
//! state. `snapshot_and_clear` is a single logical operation (`mem::take`),
//! so no reader can ever observe a partially drained map; if line sourcing
//! moves to its own thread later, the handoff stays a one-shot move.

use std::mem;

use crate::ingest::{Field, FieldValue, PendingFields};

/// Accumulates field updates for the cycle currently being reassembled.
#[derive(Debug, Default)]
pub struct CycleAccumulator {
    pending: PendingFields,
}

impl CycleAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a set of field updates. Later arrival for the same field
    /// overwrites the earlier value.
    pub fn apply(&mut self, updates: &[(Field, FieldValue)]) {
        for (field, value) in updates {
            self.pending.insert(*field, *value);
        }
    }

    /// Number of fields populated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no field has been observed since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Atomically take the pending fields and reset to empty.
    #[must_use]
    pub fn snapshot_and_clear(&mut self) -> PendingFields {
        mem::take(&mut self.pending)
    }

    /// Read one pending value (diagnostics and tests).
    #[must_use]
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        self.pending.get(&field).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_inserts_all_updates() {
        let mut acc = CycleAccumulator::new();
        acc.apply(&[
            (Field::SoilMoisturePct, FieldValue::Int(42)),
            (Field::SoilRaw, FieldValue::Int(512)),
        ]);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.get(Field::SoilRaw), Some(FieldValue::Int(512)));
    }

    #[test]
    fn later_value_for_same_field_wins() {
        let mut acc = CycleAccumulator::new();
        acc.apply(&[(Field::TemperatureC, FieldValue::Real(20.0))]);
        acc.apply(&[(Field::TemperatureC, FieldValue::Real(21.5))]);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.get(Field::TemperatureC), Some(FieldValue::Real(21.5)));
    }

    #[test]
    fn snapshot_and_clear_returns_contents_and_resets() {
        let mut acc = CycleAccumulator::new();
        acc.apply(&[
            (Field::Mode, FieldValue::Int(1)),
            (Field::Flame, FieldValue::Int(1)),
        ]);

        let snapshot = acc.snapshot_and_clear();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&Field::Mode), Some(&FieldValue::Int(1)));

        assert!(acc.is_empty());
        assert_eq!(acc.len(), 0);
    }

    #[test]
    fn no_state_leaks_between_cycles() {
        let mut acc = CycleAccumulator::new();
        acc.apply(&[(Field::LightPct, FieldValue::Int(80))]);
        let _ = acc.snapshot_and_clear();

        acc.apply(&[(Field::Motion, FieldValue::Int(1))]);
        let second = acc.snapshot_and_clear();
        assert_eq!(second.len(), 1);
        assert!(!second.contains_key(&Field::LightPct));
    }
}
