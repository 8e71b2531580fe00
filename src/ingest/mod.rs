//! Cycle reassembly: field vocabulary, line extraction, and the accumulator.

#![allow(missing_docs)]

pub mod cycle;
pub mod extract;

use std::collections::HashMap;

/// Number of data fields a fully populated cycle carries.
pub const FIELD_COUNT: usize = 13;

/// Closed vocabulary of fields a telemetry cycle can populate.
///
/// Pump and cooler are active-low on the controller (0 = engaged), the flame
/// flag is inverted (0 = detected); the extractor applies those mappings so
/// stored values match the wire semantics exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SoilMoisturePct,
    SoilRaw,
    PumpState,
    LightPct,
    LightRaw,
    LedState,
    Motion,
    BuzzerState,
    Flame,
    TemperatureC,
    AmbientHumidityPct,
    CoolerState,
    Mode,
}

impl Field {
    /// Column name in the `sensor_cycles` table.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::SoilMoisturePct => "soil_moisture_pct",
            Self::SoilRaw => "soil_raw",
            Self::PumpState => "pump_state",
            Self::LightPct => "light_pct",
            Self::LightRaw => "light_raw",
            Self::LedState => "led_state",
            Self::Motion => "motion",
            Self::BuzzerState => "buzzer_state",
            Self::Flame => "flame",
            Self::TemperatureC => "temperature_c",
            Self::AmbientHumidityPct => "ambient_humidity_pct",
            Self::CoolerState => "cooler_state",
            Self::Mode => "mode",
        }
    }

    /// All fields, in column order.
    #[must_use]
    pub const fn all() -> [Self; FIELD_COUNT] {
        [
            Self::SoilMoisturePct,
            Self::SoilRaw,
            Self::PumpState,
            Self::LightPct,
            Self::LightRaw,
            Self::LedState,
            Self::Motion,
            Self::BuzzerState,
            Self::Flame,
            Self::TemperatureC,
            Self::AmbientHumidityPct,
            Self::CoolerState,
            Self::Mode,
        ]
    }
}

/// Typed value for one field. Boolean-like states are stored as integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Real(f64),
}

impl FieldValue {
    #[must_use]
    pub const fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            Self::Real(_) => None,
        }
    }

    #[must_use]
    pub const fn as_real(self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(v as f64),
        }
    }
}

/// All fields observed since the last completed or discarded cycle.
pub type PendingFields = HashMap<Field, FieldValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_count_matches_vocabulary() {
        assert_eq!(Field::all().len(), FIELD_COUNT);
    }

    #[test]
    fn column_names_are_unique() {
        let names: std::collections::HashSet<&str> =
            Field::all().iter().map(|f| f.column_name()).collect();
        assert_eq!(names.len(), FIELD_COUNT);
    }

    #[test]
    fn int_value_widens_to_real_but_not_the_reverse() {
        assert_eq!(FieldValue::Int(7).as_real(), Some(7.0));
        assert_eq!(FieldValue::Real(7.5).as_int(), None);
        assert_eq!(FieldValue::Int(7).as_int(), Some(7));
    }
}
