//! Binary entry point for the employ CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use employ::config::{ConfigError, FleetConfig};
use employ::registry::{ManagerSettings, Registry, RegistryError};
use employ::scaleway::SCALEWAY_ZONES;
use employ::ssh::SshConfig;
use employ::{Report, RunError, RunOrchestrator, ScalewayConfig};

use cli::{Action, Cli, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let registry = Registry::with_builtins();
    let exit_code = match dispatch(cli.action, &registry).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "employ=debug,warn"
    } else {
        "employ=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(action: Action, registry: &Registry) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    match action {
        Action::Run(args) => run(args, registry, &mut stdout).await,
        Action::Commands => write_listing(&mut stdout, &registry.commands()),
        Action::Managers => write_listing(&mut stdout, &registry.managers()),
        Action::Zones => {
            for zone in SCALEWAY_ZONES {
                writeln!(stdout, "{zone}")?;
            }
            Ok(())
        }
    }
}

async fn run(args: RunCommand, registry: &Registry, out: impl Write) -> Result<(), CliError> {
    let command = registry.command(&args.command, &args.args)?;
    if !registry.has_manager(&args.manager) {
        return Err(RegistryError::UnknownManager(args.manager).into());
    }
    let setup = args.setup.as_deref().map(Utf8PathBuf::from);
    if let Some(script) = &setup
        && !script.is_file()
    {
        return Err(CliError::Config(format!("setup script {script} does not exist")));
    }

    let settings = load_settings(&args)?;
    debug!(count = settings.fleet.count, name = %settings.fleet.name, "settings loaded");
    let manager = registry.manager(&args.manager, settings)?;
    let mut orchestrator = RunOrchestrator::new(manager);
    let report = orchestrator
        .execute(command.as_ref(), setup.as_deref())
        .await?;
    write_report(out, &report, args.json)
}

fn load_settings(args: &RunCommand) -> Result<ManagerSettings, CliError> {
    let mut scaleway = ScalewayConfig::load_without_cli_args()?;
    let mut fleet = FleetConfig::load_without_cli_args()?;
    let ssh =
        SshConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    apply_overrides(args, &mut scaleway, &mut fleet);
    Ok(ManagerSettings {
        scaleway,
        fleet,
        ssh,
    })
}

fn apply_overrides(args: &RunCommand, scaleway: &mut ScalewayConfig, fleet: &mut FleetConfig) {
    if let Some(count) = args.count {
        fleet.count = count;
    }
    if let Some(name) = &args.name {
        fleet.name.clone_from(name);
    }
    if let Some(instance_type) = &args.instance_type {
        scaleway.default_instance_type.clone_from(instance_type);
    }
    if let Some(image) = &args.image {
        scaleway.default_image.clone_from(image);
    }
    if let Some(zone) = &args.zone {
        scaleway.default_zone.clone_from(zone);
    }
}

fn write_report(mut out: impl Write, report: &Report, json: bool) -> Result<(), CliError> {
    if json {
        serde_json::to_writer_pretty(&mut out, report)?;
        writeln!(out)?;
    } else {
        write!(out, "{report}")?;
    }
    Ok(())
}

fn write_listing(mut out: impl Write, entries: &[(&str, &str)]) -> Result<(), CliError> {
    for (name, description) in entries {
        writeln!(out, "{name:<10} {description}")?;
    }
    Ok(())
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "error: {err}").ok();
}
