//! Diagnostics: append-only JSONL written off the read loop's thread.

pub mod events;
pub mod jsonl;
