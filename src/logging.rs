//! `tracing-subscriber` initialization for the `gatectl` binary.
//!
//! Simpler than the teacher's `logging.rs`: this is a long-running service
//! rather than a CLI benchmark printing a human-facing summary, so there is
//! no need for the teacher's colorized event formatter — just a level
//! filter and a choice of plain or JSON output, both on stderr so stdout
//! stays free for `--validate` reports.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

pub fn init(level_filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_filter));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
