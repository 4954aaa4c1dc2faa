//! Sweeps leftover employ fleets from a Scaleway project.
//!
//! Deletes every server tagged `employ-fleet-<name>` (or any fleet tag with
//! `--all-fleets`) and then verifies none remain.

use std::io::Write as _;

use clap::Parser;
use employ::janitor::{DEFAULT_SCW_BIN, Janitor, JanitorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "employ-janitor",
    about = "Delete Scaleway servers left behind by employ fleets"
)]
struct Cli {
    /// Scaleway project id used to scope discovery.
    #[arg(long, env = "SCW_DEFAULT_PROJECT_ID")]
    project_id: String,
    /// Sweep only the fleet with this name.
    #[arg(long, required_unless_present = "all_fleets")]
    fleet: Option<String>,
    /// Sweep every employ fleet in the project, including live runs.
    #[arg(long, conflicts_with = "fleet")]
    all_fleets: bool,
    /// Path to the Scaleway CLI binary.
    #[arg(long, default_value = DEFAULT_SCW_BIN)]
    scw_bin: String,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fleet = if cli.all_fleets { None } else { cli.fleet };
    let config = JanitorConfig::new(cli.project_id, fleet, cli.scw_bin)
        .map_err(|err| err.to_string())?;
    let janitor = Janitor::with_process_runner(config);
    let summary = janitor.sweep().map_err(|err| err.to_string())?;
    writeln!(
        std::io::stdout(),
        "janitor sweep complete: deleted_servers={}",
        summary.deleted_servers.len()
    )
    .map_err(|err| err.to_string())?;
    Ok(())
}
