use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use midimesh_core::midi::system::list_port_names;
use midimesh_core::{AppState, DiagnosticSeverity, Direction, MidirDriverFactory, TracingEventSink};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Open configured MIDI devices and report what they can do", long_about = None)]
struct Cli {
    /// Path to YAML configuration file
    config: PathBuf,
    /// Re-probe every device after loading (closes open ports while probing)
    #[arg(long)]
    check: bool,
    /// Print the resulting device records as YAML
    #[arg(long)]
    records: bool,
    /// Client name announced to the system MIDI API
    #[arg(long, default_value = "midimesh")]
    client: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    for direction in Direction::ALL {
        match list_port_names(&cli.client, direction) {
            Ok(names) => println!("system {direction} ports: {}", names.join(", ")),
            Err(err) => tracing::warn!("cannot list {direction} ports: {err}"),
        }
    }

    let mut app = AppState::initialize(
        &cli.config,
        MidirDriverFactory::new(cli.client.as_str()),
        TracingEventSink,
    )
    .with_context(|| format!("loading {}", cli.config.display()))?;

    for diag in app.diagnostics() {
        let level = match diag.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Info => "info",
        };
        eprintln!("- [{}] {}: {}", level, diag.path, diag.message);
    }

    if cli.check {
        app.check_all();
    }

    for direction in Direction::ALL {
        let capable = app.registry().capable_devices(direction);
        println!("capable {direction} devices: {}", capable.join(", "));
    }

    for device in app.registry().iter() {
        println!(
            "{:<24} in:{} out:{} thru:{}",
            device.name(),
            flag(device.is_active(Direction::Input)),
            flag(device.is_active(Direction::Output)),
            if device.thru().is_empty() { "-" } else { device.thru() }
        );
    }

    if cli.records {
        let yaml = config_validator::render_devices(&app.records()).context("rendering records")?;
        print!("{yaml}");
    }

    Ok(())
}

fn flag(active: bool) -> &'static str {
    if active { "on" } else { "off" }
}
