//! SCR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ScrError>;

/// Top-level error type for the sensor cycle recorder.
#[derive(Debug, Error)]
pub enum ScrError {
    #[error("[SCR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SCR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SCR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SCR-2001] transport open failure for {port}: {details}")]
    TransportOpen { port: String, details: String },

    #[error("[SCR-2002] transport read failure on {port}: {source}")]
    TransportRead {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[SCR-2003] unsupported baud rate: {baud}")]
    UnsupportedBaud { baud: u32 },

    #[error("[SCR-3001] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[SCR-3002] record persistence failure after {attempts} attempts: {details}")]
    Persist { attempts: u32, details: String },

    #[error("[SCR-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SCR-3901] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SCR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ScrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SCR-1001",
            Self::MissingConfig { .. } => "SCR-1002",
            Self::ConfigParse { .. } => "SCR-1003",
            Self::TransportOpen { .. } => "SCR-2001",
            Self::TransportRead { .. } => "SCR-2002",
            Self::UnsupportedBaud { .. } => "SCR-2003",
            Self::Sql { .. } => "SCR-3001",
            Self::Persist { .. } => "SCR-3002",
            Self::Serialization { .. } => "SCR-3101",
            Self::Io { .. } => "SCR-3901",
            Self::Runtime { .. } => "SCR-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportRead { .. } | Self::Sql { .. } | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for ScrError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ScrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ScrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
