#![forbid(unsafe_code)]

//! Sensor Cycle Recorder (scr) — line-oriented serial telemetry ingester.
//!
//! A microcontroller prints one measurement cycle as several partial text
//! lines terminated by an end-of-cycle marker. The recorder reassembles
//! those fragments into a single record and appends it to SQLite:
//!
//! 1. **Transport** — serial device, TCP bridge, or file replay, all
//!    producing sanitized text lines through one trait
//! 2. **Ingest** — regex classification of each line into typed field
//!    updates, accumulated until the cycle marker
//! 3. **Store** — one row per completed cycle, absent fields as SQL NULL
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use sensor_cycle_recorder::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use sensor_cycle_recorder::core::config::Config;
//! use sensor_cycle_recorder::ingest::extract::FieldExtractor;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod ingest;
pub mod logger;
pub mod store;
pub mod transport;
