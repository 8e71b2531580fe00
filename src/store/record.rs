//! The persisted entity: one completed measurement cycle.

#![allow(missing_docs)]

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::ingest::{Field, FieldValue, PendingFields};

/// One persisted cycle. Any field the cycle never reported is `None` and is
/// stored as SQL NULL, never defaulted to zero. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    /// Capture time assigned at sink time (RFC 3339 UTC), not device time.
    pub captured_at: String,
    pub soil_moisture_pct: Option<i64>,
    pub soil_raw: Option<i64>,
    /// Active-low: 0 = pump on, 1 = pump off.
    pub pump_state: Option<i64>,
    pub light_pct: Option<i64>,
    pub light_raw: Option<i64>,
    /// 0 = off, 1 = on.
    pub led_state: Option<i64>,
    pub motion: Option<i64>,
    pub buzzer_state: Option<i64>,
    /// Inverted: 0 = flame detected, 1 = no flame.
    pub flame: Option<i64>,
    pub temperature_c: Option<f64>,
    pub ambient_humidity_pct: Option<f64>,
    /// Active-low: 0 = cooler on, 1 = cooler off.
    pub cooler_state: Option<i64>,
    /// 0 = automatic, 1 = manual.
    pub mode: Option<i64>,
}

impl SensorRecord {
    /// Build a record from the accumulated field set, stamping it with the
    /// given capture time.
    #[must_use]
    pub fn from_fields(fields: &PendingFields, captured_at: DateTime<Utc>) -> Self {
        let int = |f: Field| fields.get(&f).copied().and_then(FieldValue::as_int);
        let real = |f: Field| fields.get(&f).copied().and_then(FieldValue::as_real);

        Self {
            captured_at: captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            soil_moisture_pct: int(Field::SoilMoisturePct),
            soil_raw: int(Field::SoilRaw),
            pump_state: int(Field::PumpState),
            light_pct: int(Field::LightPct),
            light_raw: int(Field::LightRaw),
            led_state: int(Field::LedState),
            motion: int(Field::Motion),
            buzzer_state: int(Field::BuzzerState),
            flame: int(Field::Flame),
            temperature_c: real(Field::TemperatureC),
            ambient_humidity_pct: real(Field::AmbientHumidityPct),
            cooler_state: int(Field::CoolerState),
            mode: int(Field::Mode),
        }
    }

    /// Count of populated (non-NULL) data fields.
    #[must_use]
    pub fn populated_fields(&self) -> usize {
        usize::from(self.soil_moisture_pct.is_some())
            + usize::from(self.soil_raw.is_some())
            + usize::from(self.pump_state.is_some())
            + usize::from(self.light_pct.is_some())
            + usize::from(self.light_raw.is_some())
            + usize::from(self.led_state.is_some())
            + usize::from(self.motion.is_some())
            + usize::from(self.buzzer_state.is_some())
            + usize::from(self.flame.is_some())
            + usize::from(self.temperature_c.is_some())
            + usize::from(self.ambient_humidity_pct.is_some())
            + usize::from(self.cooler_state.is_some())
            + usize::from(self.mode.is_some())
    }
}
