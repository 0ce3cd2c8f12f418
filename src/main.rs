//! Entry point for the `gatectl` binary.
//!
//! Parses arguments, initialises logging, then either runs a static
//! `--validate` pass over the configuration or starts the supervisor and
//! blocks until `Ctrl+C`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gatectl::tagserver::memory::MemoryTagServer;
use gatectl::{cli, logging, validate, Supervisor, TagServer};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init(args.log_level.as_filter(), args.log_format);

    if args.validate {
        return run_validate(&args);
    }

    let tag_server: Arc<dyn TagServer> = Arc::new(MemoryTagServer::new());
    let supervisor = Supervisor::new(args.config_dir.clone(), tag_server);
    let stop = supervisor.stop_handle();
    ctrlc::set_handler(move || stop.store(false, Ordering::SeqCst)).context("installing Ctrl+C handler")?;

    tracing::info!(config_dir = %args.config_dir.display(), "starting gatectl");
    supervisor.run().context("supervisor exited with an error")?;
    Ok(())
}

/// Loads `clients.json` and the per-type schema documents and reports
/// structural findings, without connecting to any device.
fn run_validate(args: &cli::Args) -> Result<()> {
    let clients_path = args.config_dir.join("clients.json");
    let clients = gatectl::spec::config::load_clients_file(&clients_path)
        .with_context(|| format!("loading {}", clients_path.display()))?;

    let mut error_count = 0usize;
    let mut note_count = 0usize;
    let mut needed_plc = false;
    let mut needed_robot = false;
    for client in &clients.clients {
        match client.kind {
            gatectl::spec::config::ClientKind::Plc => needed_plc = true,
            gatectl::spec::config::ClientKind::Robot => needed_robot = true,
        }
    }
    println!("{} configured device(s)", clients.clients.len());

    if needed_plc {
        let path = args.config_dir.join("plc-specification.json");
        let schema = gatectl::spec::config::load_json_with_comments(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        report_findings("plc-specification.json", &validate::validate_plc_schema(&schema), &mut error_count, &mut note_count);
    }
    if needed_robot {
        let path = args.config_dir.join("robot-specification.json");
        let schema = gatectl::spec::config::load_json_with_comments(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        report_findings("robot-specification.json", &validate::validate_robot_schema(&schema), &mut error_count, &mut note_count);
    }

    println!("{error_count} error(s), {note_count} note(s) about probe-resolved fields left unchecked");
    if error_count > 0 {
        anyhow::bail!("validation failed");
    }
    Ok(())
}

fn report_findings(label: &str, findings: &[validate::Finding], error_count: &mut usize, note_count: &mut usize) {
    for finding in findings {
        if finding.is_error {
            *error_count += 1;
            println!("error: {label} {}: {}", finding.path, finding.message);
        } else {
            *note_count += 1;
            println!("note:  {label} {}: {}", finding.path, finding.message);
        }
    }
}

