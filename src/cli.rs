//! Command-line argument parsing for the `gatectl` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// A gateway exposing MELSEC SLMP PLCs and R3 robot controllers through a
/// unified tag tree.
///
/// Reads `clients.json` and the per-type schema documents from
/// `--config-dir`, connects every configured device, and keeps their tag
/// subtrees live until shutdown or a `clients.json` edit triggers a reload.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing `clients.json`, `plc-specification.json`, and
    /// `robot-specification.json`.
    #[arg(long, default_value = ".")]
    pub config_dir: PathBuf,

    /// Minimum severity of log lines written to stderr.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Load and validate the configuration without connecting to any
    /// device, then exit. Schema node types, device-code decoding, and
    /// JSON structure are checked; anything a live probe would resolve
    /// (dynamic `Folder` counts, `Condition` gates, `Property` probes) is
    /// left unresolved and reported as skipped.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
