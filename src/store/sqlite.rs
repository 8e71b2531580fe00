//! SQLite record store: WAL-mode database holding completed cycles.
//!
//! One append-only table, idempotent schema application on every open,
//! prepared statements for insert throughput. The store exclusively owns the
//! connection for the process lifetime; there is no update or delete path.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{Result, ScrError};
use crate::store::record::SensorRecord;

/// Append-only store for completed sensor cycles.
pub struct RecordStore {
    conn: Connection,
    path: PathBuf,
}

impl RecordStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ScrError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open read-only (for `scr recent` against a live recorder).
    pub fn open_readonly(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one completed cycle. Returns the new row id.
    pub fn append(&self, record: &SensorRecord) -> Result<i64> {
        self.conn
            .prepare_cached(
                "INSERT INTO sensor_cycles (
                captured_at, soil_moisture_pct, soil_raw, pump_state,
                light_pct, light_raw, led_state, motion, buzzer_state,
                flame, temperature_c, ambient_humidity_pct, cooler_state, mode
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            )?
            .execute(params![
                record.captured_at,
                record.soil_moisture_pct,
                record.soil_raw,
                record.pump_state,
                record.light_pct,
                record.light_raw,
                record.led_state,
                record.motion,
                record.buzzer_state,
                record.flame,
                record.temperature_c,
                record.ambient_humidity_pct,
                record.cooler_state,
                record.mode,
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Query recent records, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<SensorRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT captured_at, soil_moisture_pct, soil_raw, pump_state,
                    light_pct, light_raw, led_state, motion, buzzer_state,
                    flame, temperature_c, ambient_humidity_pct, cooler_state, mode
             FROM sensor_cycles ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(SensorRecord {
                    captured_at: row.get(0)?,
                    soil_moisture_pct: row.get(1)?,
                    soil_raw: row.get(2)?,
                    pump_state: row.get(3)?,
                    light_pct: row.get(4)?,
                    light_raw: row.get(5)?,
                    led_state: row.get(6)?,
                    motion: row.get(7)?,
                    buzzer_state: row.get(8)?,
                    flame: row.get(9)?,
                    temperature_c: row.get(10)?,
                    ambient_humidity_pct: row.get(11)?,
                    cooler_state: row.get(12)?,
                    mode: row.get(13)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total number of persisted cycles.
    pub fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sensor_cycles", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[SCR-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sensor_cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            captured_at TEXT NOT NULL,
            soil_moisture_pct INTEGER,
            soil_raw INTEGER,
            pump_state INTEGER,       -- 0=on, 1=off (active-low)
            light_pct INTEGER,
            light_raw INTEGER,
            led_state INTEGER,        -- 0=off, 1=on
            motion INTEGER,           -- 0=none, 1=detected
            buzzer_state INTEGER,     -- 0=off, 1=on
            flame INTEGER,            -- 0=detected, 1=none (inverted)
            temperature_c REAL,
            ambient_humidity_pct REAL,
            cooler_state INTEGER,     -- 0=on, 1=off (active-low)
            mode INTEGER              -- 0=automatic, 1=manual
        );

        CREATE INDEX IF NOT EXISTS idx_cycles_captured_at
            ON sensor_cycles(captured_at);",
    )?;
    Ok(())
}
