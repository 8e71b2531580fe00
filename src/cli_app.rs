//! Top-level CLI definition and dispatch.

#![allow(missing_docs)]

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use thiserror::Error;

use sensor_cycle_recorder::core::config::Config;
use sensor_cycle_recorder::daemon::loop_main::run_daemon;
use sensor_cycle_recorder::store::sqlite::RecordStore;

/// Sensor Cycle Recorder — reassembles serial telemetry cycles into SQLite.
#[derive(Debug, Parser)]
#[command(
    name = "scr",
    author,
    version,
    about = "Sensor Cycle Recorder - serial telemetry ingester",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the ingest loop until the stream ends or a signal arrives.
    Run(RunArgs),
    /// Show the most recently persisted cycles.
    Recent(RecentArgs),
    /// View configuration state.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Override the transport address (device, tcp://host:port, or file).
    #[arg(long, value_name = "ADDR")]
    port: Option<String>,
    /// Override the serial baud rate.
    #[arg(long, value_name = "BAUD")]
    baud: Option<u32>,
    /// Override the database path.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RecentArgs {
    /// Number of cycles to show.
    #[arg(long, default_value_t = 10, value_name = "N")]
    limit: u32,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path in use.
    Path,
}

// ──────────────────── output mode ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
            Self::Json(_) | Self::Io(_) => 3,
        }
    }
}

// ──────────────────── dispatch ────────────────────

pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run_ingest(cli, args),
        Command::Recent(args) => run_recent(cli, args),
        Command::Config(args) => run_config(cli, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

fn run_ingest(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;

    if let Some(port) = &args.port {
        config.transport.port.clone_from(port);
    }
    if let Some(baud) = args.baud {
        config.transport.baud = baud;
    }
    if let Some(db) = &args.db {
        config.storage.db_path.clone_from(db);
    }
    config
        .validate()
        .map_err(|e| CliError::User(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "scr: reading {} at {} baud, persisting to {}",
                config.transport.port,
                config.transport.baud,
                config.storage.db_path.display()
            );
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "run",
                "port": config.transport.port,
                "baud": config.transport.baud,
                "db_path": config.storage.db_path.to_string_lossy(),
            }))?;
        }
    }

    run_daemon(config).map_err(|e| CliError::Runtime(e.to_string()))
}

fn run_recent(cli: &Cli, args: &RecentArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let store = RecordStore::open_readonly(&config.storage.db_path)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let rows = store
        .recent(args.limit)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if rows.is_empty() {
                println!("No cycles recorded yet.");
                return Ok(());
            }
            for row in &rows {
                println!(
                    "{}  soil={} temp={} mode={}",
                    row.captured_at,
                    opt_str(row.soil_moisture_pct),
                    opt_str(row.temperature_c),
                    opt_str(row.mode),
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "recent",
                "count": rows.len(),
                "cycles": serde_json::to_value(&rows)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;

    match &args.action {
        ConfigAction::Show => match output_mode(cli) {
            OutputMode::Human => {
                let rendered =
                    toml::to_string_pretty(&config).map_err(|e| CliError::Runtime(e.to_string()))?;
                print!("{rendered}");
            }
            OutputMode::Json => {
                write_json_line(&serde_json::to_value(&config)?)?;
            }
        },
        ConfigAction::Path => match output_mode(cli) {
            OutputMode::Human => {
                println!("{}", config.storage.config_file.display());
            }
            OutputMode::Json => {
                write_json_line(&json!({
                    "config_file": config.storage.config_file.to_string_lossy(),
                    "exists": config.storage.config_file.exists(),
                }))?;
            }
        },
    }
    Ok(())
}

// ──────────────────── helpers ────────────────────

fn opt_str<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SCR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
