//! Persistence: the record shape, the SQLite store, and the commit gate.

pub mod record;
pub mod sink;
pub mod sqlite;
