//! Sweeper for fleets that were never torn down.
//!
//! Every server a fleet creates carries an `employ-fleet-<name>` tag. If a
//! run is killed before teardown the servers keep running; the janitor finds
//! them through the `scw` CLI, deletes them together with their volumes and
//! IPs, and fails if anything tagged remains afterwards.

mod types;

use std::ffi::OsString;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{FLEET_TAG_PREFIX, fleet_tag};
use crate::ssh::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};
use types::ScwServer;

/// Default Scaleway CLI binary name.
pub const DEFAULT_SCW_BIN: &str = "scw";

/// Configuration for a janitor sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JanitorConfig {
    /// Project id to scope resource discovery.
    pub project_id: String,
    /// Fleet to sweep. `None` sweeps every fleet.
    pub fleet_name: Option<String>,
    /// Path to the `scw` CLI binary.
    pub scw_bin: String,
}

impl JanitorConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::InvalidConfig`] when a required field is blank
    /// or the fleet name is given but empty.
    pub fn new(
        project_id: impl Into<String>,
        fleet_name: Option<String>,
        scw_bin: impl Into<String>,
    ) -> Result<Self, JanitorError> {
        let project = project_id.into().trim().to_owned();
        let fleet = fleet_name.map(|name| name.trim().to_owned());
        let bin = scw_bin.into().trim().to_owned();
        for (field, blank) in [
            ("project_id", project.is_empty()),
            ("fleet_name", fleet.as_deref().is_some_and(str::is_empty)),
            ("scw_bin", bin.is_empty()),
        ] {
            if blank {
                return Err(JanitorError::InvalidConfig {
                    field: field.to_owned(),
                });
            }
        }
        Ok(Self {
            project_id: project,
            fleet_name: fleet,
            scw_bin: bin,
        })
    }

    /// Returns `true` when `tags` mark a server this sweep should remove.
    #[must_use]
    pub fn matches(&self, tags: &[String]) -> bool {
        self.fleet_name.as_deref().map_or_else(
            || tags.iter().any(|tag| tag.starts_with(FLEET_TAG_PREFIX)),
            |name| {
                let wanted = fleet_tag(name);
                tags.iter().any(|tag| *tag == wanted)
            },
        )
    }
}

/// Summary of janitor work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepSummary {
    /// Identifiers of the servers deleted during the sweep.
    pub deleted_servers: Vec<String>,
}

/// Errors returned by the janitor.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JanitorError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when `scw` returns a non-zero exit status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `scw`).
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when JSON output from the CLI cannot be parsed.
    #[error("failed to parse server list: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when tagged servers remain after the sweep.
    #[error("servers remain after janitor sweep: {remaining}")]
    NotClean {
        /// Comma separated identifiers still present.
        remaining: String,
    },
    /// Raised when `scw` cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Deletes fleet-tagged Scaleway servers by shelling out to `scw`.
#[derive(Clone, Debug)]
pub struct Janitor<R: CommandRunner> {
    config: JanitorConfig,
    runner: R,
}

impl Janitor<ProcessCommandRunner> {
    /// Creates a janitor wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: JanitorConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> Janitor<R> {
    /// Creates a new janitor using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: JanitorConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Deletes every matching server, waiting for each deletion, then checks
    /// that none remain.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError`] when `scw` fails, output cannot be parsed, or
    /// servers remain after deletion attempts.
    pub fn sweep(&self) -> Result<SweepSummary, JanitorError> {
        if self.config.fleet_name.is_none() {
            warn!(
                project = %self.config.project_id,
                "sweeping every employ fleet in the project, including runs still in progress"
            );
        }
        let mut deleted_servers = Vec::new();
        for server in self.matching_servers()? {
            info!(id = %server.id, name = %server.name, zone = %server.zone, "deleting server");
            self.delete_server(&server)?;
            deleted_servers.push(server.id);
        }

        let remaining = self.matching_servers()?;
        if !remaining.is_empty() {
            let ids = remaining
                .iter()
                .map(|server| server.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(JanitorError::NotClean { remaining: ids });
        }

        Ok(SweepSummary { deleted_servers })
    }

    fn check_output(&self, output: CommandOutput) -> Result<CommandOutput, JanitorError> {
        if output.is_success() {
            return Ok(output);
        }
        Err(JanitorError::CommandFailure {
            program: self.config.scw_bin.clone(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr_lossy().trim().to_owned(),
        })
    }

    fn run_scw(&self, args: &[OsString]) -> Result<CommandOutput, JanitorError> {
        let output = self.runner.run(&self.config.scw_bin, args)?;
        self.check_output(output)
    }

    fn matching_servers(&self) -> Result<Vec<ScwServer>, JanitorError> {
        let args = [
            "instance",
            "server",
            "list",
            format!("project-id={}", self.config.project_id).as_str(),
            "zone=all",
            "-o",
            "json",
        ]
        .map(OsString::from);
        let output = self.run_scw(&args)?;
        let servers: Vec<ScwServer> =
            serde_json::from_slice(&output.stdout).map_err(|err| JanitorError::Parse {
                message: err.to_string(),
            })?;
        Ok(servers
            .into_iter()
            .filter(|server| self.config.matches(&server.tags))
            .collect())
    }

    fn delete_server(&self, server: &ScwServer) -> Result<CommandOutput, JanitorError> {
        let args = [
            "instance",
            "server",
            "delete",
            server.id.as_str(),
            format!("zone={}", server.zone).as_str(),
            "with-ip=true",
            "with-volumes=all",
            "force-shutdown=true",
            "--wait",
        ]
        .map(OsString::from);
        self.run_scw(&args)
    }
}

#[cfg(test)]
mod tests;
