//! Command-line interface definitions for the `employ` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! depends on nothing but clap for that reason.

use clap::Parser;

/// Top-level CLI for the `employ` binary.
#[derive(Debug, Parser)]
#[command(
    name = "employ",
    about = "Run one command across a fleet of short-lived cloud instances",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log at debug level (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) action: Action,
}

/// Subcommands of `employ`.
#[derive(Debug, clap::Subcommand)]
pub(crate) enum Action {
    /// Provision a fleet, run a command on every node, then tear it down.
    #[command(name = "run")]
    Run(RunCommand),
    /// List registered commands.
    #[command(name = "commands")]
    Commands,
    /// List registered managers.
    #[command(name = "managers")]
    Managers,
    /// List zones the Scaleway manager can provision in.
    #[command(name = "zones")]
    Zones,
}

/// Arguments for the `employ run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Manager that provisions and reaches the fleet.
    #[arg(long, default_value = "scaleway")]
    pub(crate) manager: String,
    /// Number of nodes to provision (overrides `fleet.count`).
    #[arg(long, short = 'n', value_name = "COUNT")]
    pub(crate) count: Option<usize>,
    /// Fleet name used for server names and the cleanup tag.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Override the Scaleway instance type (commercial type) for this run.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Override the image label for this run.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Override the availability zone for this run.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Local script uploaded to every node and run with `/bin/sh` first.
    #[arg(long, value_name = "PATH")]
    pub(crate) setup: Option<String>,
    /// Print the report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
    /// Registered command name.
    pub(crate) command: String,
    /// Arguments passed to the command (use -- to separate flags).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) args: Vec<String>,
}
