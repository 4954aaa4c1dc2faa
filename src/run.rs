//! Orchestrates one provision, execute and teardown cycle.
//!
//! Once the manager owns any resources, teardown runs exactly once on every
//! exit path. When the run itself failed, a teardown failure is appended to
//! the primary error message; when the run succeeded it is surfaced as
//! [`RunError::Teardown`].

use std::fmt::Display;

use camino::Utf8Path;
use thiserror::Error;
use tracing::info;

use crate::command::{Command, Report};
use crate::fleet::FleetError;
use crate::manager::Manager;

/// Errors surfaced while performing a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Raised when the fleet could not be provisioned or connected.
    #[error("failed to provision fleet: {message}")]
    Provision {
        /// Human-readable description, including any teardown failure.
        message: String,
        /// Underlying fleet error.
        #[source]
        source: FleetError,
    },
    /// Raised when the setup script fails on any node.
    #[error("setup script failed: {message}")]
    Setup {
        /// Human-readable description, including any teardown failure.
        message: String,
        /// Underlying fleet error.
        #[source]
        source: FleetError,
    },
    /// Raised when the command fails on any node or cannot be aggregated.
    #[error("command failed: {message}")]
    Command {
        /// Human-readable description, including any teardown failure.
        message: String,
        /// Underlying fleet error.
        #[source]
        source: FleetError,
    },
    /// Raised when teardown fails after the run succeeded.
    #[error("failed to tear down fleet: {0}")]
    Teardown(#[source] FleetError),
}

impl RunError {
    /// The fleet error that caused the run to fail.
    #[must_use]
    pub const fn fleet_error(&self) -> &FleetError {
        match self {
            Self::Provision { source, .. }
            | Self::Setup { source, .. }
            | Self::Command { source, .. }
            | Self::Teardown(source) => source,
        }
    }
}

/// Drives a [`Manager`] through one run.
#[derive(Debug)]
pub struct RunOrchestrator<M> {
    manager: M,
}

impl<M: Manager> RunOrchestrator<M> {
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(manager: M) -> Self {
        Self { manager }
    }

    /// Returns the wrapped manager.
    #[must_use]
    pub const fn manager(&self) -> &M {
        &self.manager
    }

    /// Provisions the fleet, optionally runs `setup_script`, runs `command`
    /// and tears the fleet down.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] naming the phase that failed.
    pub async fn execute(
        &mut self,
        command: &dyn Command,
        setup_script: Option<&Utf8Path>,
    ) -> Result<Report, RunError> {
        info!(
            manager = self.manager.name(),
            command = %command.command_string(),
            "starting run"
        );

        if let Err(err) = self.manager.provision().await {
            let message = if self.manager.owns_resources() {
                self.teardown_with_note(&err).await
            } else {
                err.to_string()
            };
            return Err(RunError::Provision {
                message,
                source: err,
            });
        }

        if let Some(script) = setup_script
            && let Err(err) = self.manager.setup(script).await
        {
            let message = self.teardown_with_note(&err).await;
            return Err(RunError::Setup {
                message,
                source: err,
            });
        }

        match self.manager.run(command).await {
            Ok(report) => {
                self.manager.teardown().await.map_err(RunError::Teardown)?;
                info!("run complete");
                Ok(report)
            }
            Err(err) => {
                let message = self.teardown_with_note(&err).await;
                Err(RunError::Command {
                    message,
                    source: err,
                })
            }
        }
    }

    async fn teardown_with_note<E: Display>(&mut self, err: &E) -> String {
        let teardown_error = self.manager.teardown().await.err();
        append_teardown_note(err.to_string(), teardown_error.as_ref())
    }
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown also failed: {teardown})")
    } else {
        message
    }
}
