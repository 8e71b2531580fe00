//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ScrError};
use crate::ingest::FIELD_COUNT;

/// Full recorder configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
}

/// Transport address and line-read tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial device path (`/dev/ttyUSB0`), `tcp://host:port` address, or a
    /// plain file path for replay.
    pub port: String,
    /// Serial line rate. Ignored for TCP and file replay.
    pub baud: u32,
    /// Blocking read timeout. A timed-out read yields "no line available
    /// now", never an error or an end-of-cycle.
    pub read_timeout_ms: u64,
}

/// Persistence and diagnostics locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub jsonl_log: PathBuf,
    pub config_file: PathBuf,
}

/// Cycle-reassembly policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Minimum populated fields required to persist a cycle.
    pub min_fields: usize,
    /// Failed record appends are retried this many times before the fault
    /// becomes fatal.
    pub persist_retries: u32,
    /// Emit a diagnostics event for every raw line received.
    pub log_raw_lines: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9_600,
            read_timeout_ms: 1_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[SCR-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("scr").join("config.toml");
        let data = home_dir.join(".local").join("share").join("scr");
        Self {
            db_path: data.join("sensors.sqlite3"),
            jsonl_log: data.join("ingest.jsonl"),
            config_file: cfg,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_fields: 10,
            persist_retries: 2,
            log_raw_lines: true,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        StorageConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ScrError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(ScrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.storage.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config for startup logging.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("SCR_TRANSPORT_PORT") {
            self.transport.port = raw;
        }
        set_env_u32("SCR_TRANSPORT_BAUD", &mut self.transport.baud)?;
        set_env_u64(
            "SCR_TRANSPORT_READ_TIMEOUT_MS",
            &mut self.transport.read_timeout_ms,
        )?;

        if let Some(raw) = env_var("SCR_STORAGE_DB_PATH") {
            self.storage.db_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("SCR_STORAGE_JSONL_LOG") {
            self.storage.jsonl_log = PathBuf::from(raw);
        }

        set_env_usize("SCR_INGEST_MIN_FIELDS", &mut self.ingest.min_fields)?;
        set_env_u32("SCR_INGEST_PERSIST_RETRIES", &mut self.ingest.persist_retries)?;
        set_env_bool("SCR_INGEST_LOG_RAW_LINES", &mut self.ingest.log_raw_lines)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.transport.port.trim().is_empty() {
            return Err(ScrError::InvalidConfig {
                details: "transport.port must not be empty".to_string(),
            });
        }

        if self.transport.baud == 0 {
            return Err(ScrError::InvalidConfig {
                details: "transport.baud must be > 0".to_string(),
            });
        }

        // VTIME is expressed in deciseconds and capped at 255.
        if !(100..=25_500).contains(&self.transport.read_timeout_ms) {
            return Err(ScrError::InvalidConfig {
                details: format!(
                    "transport.read_timeout_ms must be in [100, 25500], got {}",
                    self.transport.read_timeout_ms
                ),
            });
        }

        if !(1..=FIELD_COUNT).contains(&self.ingest.min_fields) {
            return Err(ScrError::InvalidConfig {
                details: format!(
                    "ingest.min_fields must be in [1, {FIELD_COUNT}], got {}",
                    self.ingest.min_fields
                ),
            });
        }

        if self.ingest.persist_retries > 10 {
            return Err(ScrError::InvalidConfig {
                details: format!(
                    "ingest.persist_retries must be <= 10, got {}",
                    self.ingest.persist_retries
                ),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| ScrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| ScrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| ScrError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| ScrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
