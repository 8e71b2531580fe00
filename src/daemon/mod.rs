//! Long-running ingest process: signal handling and the read loop.

pub mod loop_main;
pub mod signals;
