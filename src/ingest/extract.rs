//! Field extractor: stateless classification of one raw line against the
//! fixed telemetry grammar.
//!
//! The controller firmware emits Spanish-labelled readings, one measurement
//! group per line, terminated by a `---FIN_CICLO---` sentinel. Patterns are
//! tried in a fixed priority order and the first match wins; anything else is
//! `Unrecognized`, which callers drop silently. A capture that fails numeric
//! conversion also degrades to `Unrecognized` rather than aborting the run:
//! the grammar should make that impossible, but the stream is untrusted.

#![allow(missing_docs)]

use regex::Regex;

use crate::core::errors::{Result, ScrError};
use crate::ingest::{Field, FieldValue};

/// Sentinel line closing one measurement cycle.
pub const END_OF_CYCLE_MARKER: &str = "---FIN_CICLO---";

/// Tags for the six data patterns, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTag {
    Soil,
    Light,
    Motion,
    Flame,
    Climate,
    Mode,
}

impl PatternTag {
    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Soil => "soil",
            Self::Light => "light",
            Self::Motion => "motion",
            Self::Flame => "flame",
            Self::Climate => "climate",
            Self::Mode => "mode",
        }
    }
}

/// Result of classifying one raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The line matched a data pattern and yields these field updates.
    Fields {
        tag: PatternTag,
        updates: Vec<(Field, FieldValue)>,
    },
    /// The line is the end-of-cycle sentinel: flush now, no field data.
    CycleEnd,
    /// No pattern matched (or a capture failed conversion). Not an error.
    Unrecognized,
}

/// Compiled telemetry grammar. Construct once, reuse for every line.
pub struct FieldExtractor {
    soil: Regex,
    light: Regex,
    motion: Regex,
    flame: Regex,
    climate: Regex,
    mode: Regex,
}

impl FieldExtractor {
    /// Compile the fixed pattern set.
    pub fn new() -> Result<Self> {
        Ok(Self {
            soil: compile(r"^Humedad: *(\d+)% *\(Valor crudo: *(\d+)\) *Bomba: *(Encendida|Apagada)")?,
            light: compile(r"^Luz: *(\d+)% *\(Valor crudo: *(\d+)\) *LED: *(Encendido|Apagado)")?,
            motion: compile(r"^PIR: *(Detectado|No Detectado) *Buzzer: *(Encendido|Apagado)")?,
            flame: compile(r"^Flama: *(Detectada|No Detectada) *Bomba: *(Encendida|Apagada)")?,
            climate: compile(
                r"^Temp: *(-?[\d.]+)C *Humedad Amb: *(-?[\d.]+)% *Cooler: *(Encendido|Apagado)",
            )?,
            mode: compile(r"^Modo: *(Manual|Automático)")?,
        })
    }

    /// Classify one raw line. Stateless; never panics on hostile input.
    #[must_use]
    pub fn classify(&self, line: &str) -> Extraction {
        if line.is_empty() {
            return Extraction::Unrecognized;
        }

        // The sentinel is matched as a line prefix, mirroring the anchored
        // prefix semantics of the data patterns.
        if line.starts_with(END_OF_CYCLE_MARKER) {
            return Extraction::CycleEnd;
        }

        if let Some(caps) = self.soil.captures(line) {
            let Some(pct) = parse_int(&caps[1]) else {
                return Extraction::Unrecognized;
            };
            let Some(raw) = parse_int(&caps[2]) else {
                return Extraction::Unrecognized;
            };
            // Active-low: Encendida (on) stores 0.
            let pump = i64::from(&caps[3] != "Encendida");
            return Extraction::Fields {
                tag: PatternTag::Soil,
                updates: vec![
                    (Field::SoilMoisturePct, FieldValue::Int(pct)),
                    (Field::SoilRaw, FieldValue::Int(raw)),
                    (Field::PumpState, FieldValue::Int(pump)),
                ],
            };
        }

        if let Some(caps) = self.light.captures(line) {
            let Some(pct) = parse_int(&caps[1]) else {
                return Extraction::Unrecognized;
            };
            let Some(raw) = parse_int(&caps[2]) else {
                return Extraction::Unrecognized;
            };
            let led = i64::from(&caps[3] == "Encendido");
            return Extraction::Fields {
                tag: PatternTag::Light,
                updates: vec![
                    (Field::LightPct, FieldValue::Int(pct)),
                    (Field::LightRaw, FieldValue::Int(raw)),
                    (Field::LedState, FieldValue::Int(led)),
                ],
            };
        }

        if let Some(caps) = self.motion.captures(line) {
            let motion = i64::from(&caps[1] == "Detectado");
            let buzzer = i64::from(&caps[2] == "Encendido");
            return Extraction::Fields {
                tag: PatternTag::Motion,
                updates: vec![
                    (Field::Motion, FieldValue::Int(motion)),
                    (Field::BuzzerState, FieldValue::Int(buzzer)),
                ],
            };
        }

        if let Some(caps) = self.flame.captures(line) {
            // Inverted: Detectada stores 0. The pump capture on this line is
            // discarded; the soil line owns that slot.
            let flame = i64::from(&caps[1] != "Detectada");
            return Extraction::Fields {
                tag: PatternTag::Flame,
                updates: vec![(Field::Flame, FieldValue::Int(flame))],
            };
        }

        if let Some(caps) = self.climate.captures(line) {
            let Some(temp) = parse_real(&caps[1]) else {
                return Extraction::Unrecognized;
            };
            let Some(humidity) = parse_real(&caps[2]) else {
                return Extraction::Unrecognized;
            };
            // Active-low: Encendido (on) stores 0.
            let cooler = i64::from(&caps[3] != "Encendido");
            return Extraction::Fields {
                tag: PatternTag::Climate,
                updates: vec![
                    (Field::TemperatureC, FieldValue::Real(temp)),
                    (Field::AmbientHumidityPct, FieldValue::Real(humidity)),
                    (Field::CoolerState, FieldValue::Int(cooler)),
                ],
            };
        }

        if let Some(caps) = self.mode.captures(line) {
            let mode = i64::from(&caps[1] == "Manual");
            return Extraction::Fields {
                tag: PatternTag::Mode,
                updates: vec![(Field::Mode, FieldValue::Int(mode))],
            };
        }

        Extraction::Unrecognized
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| ScrError::Runtime {
        details: format!("pattern compile failure: {err}"),
    })
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

fn parse_real(raw: &str) -> Option<f64> {
    // `[\d.]+` admits shapes like "1.2.3" that f64 parsing rejects; the
    // failed line degrades to Unrecognized upstream.
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
