//! Managers own a fleet for the duration of one run.
//!
//! [`Manager`] is the object-safe contract the orchestrator and registry
//! work with; [`FleetManager`] implements it over any [`Backend`] and
//! [`Transport`] pair by chaining the phases in [`crate::fleet`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use camino::Utf8Path;
use shell_escape::unix::escape;
use tracing::{info, warn};

use crate::backend::{Backend, FleetRequest, Node};
use crate::command::{Command, Report};
use crate::fleet::{
    self, DispatchOptions, FleetError, ReadinessPolicy, RetryPolicy, connect_all, request_batch,
    wait_until_running,
};
use crate::ssh::{Session, Transport};

/// Future returned by manager operations.
pub type ManagerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FleetError>> + Send + 'a>>;

/// Lifecycle of a fleet and command execution over it.
pub trait Manager: Send + Sync {
    /// Registry name of the manager.
    fn name(&self) -> &str;

    /// Creates the nodes, waits for them and opens one session per node.
    fn provision(&mut self) -> ManagerFuture<'_, ()>;

    /// Closes every session and destroys every node. Runs at most once per
    /// provisioning; later calls are no-ops.
    fn teardown(&mut self) -> ManagerFuture<'_, ()>;

    /// Uploads `script` to every node and runs it with `/bin/sh`.
    fn setup<'a>(&'a self, script: &'a Utf8Path) -> ManagerFuture<'a, ()>;

    /// Runs `command` on every node, validates and aggregates the outcomes.
    fn run<'a>(&'a self, command: &'a dyn Command) -> ManagerFuture<'a, Report>;

    /// Returns `true` while nodes or sessions still need releasing.
    fn owns_resources(&self) -> bool;
}

impl<M: Manager + ?Sized> Manager for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn provision(&mut self) -> ManagerFuture<'_, ()> {
        (**self).provision()
    }

    fn teardown(&mut self) -> ManagerFuture<'_, ()> {
        (**self).teardown()
    }

    fn setup<'a>(&'a self, script: &'a Utf8Path) -> ManagerFuture<'a, ()> {
        (**self).setup(script)
    }

    fn run<'a>(&'a self, command: &'a dyn Command) -> ManagerFuture<'a, Report> {
        (**self).run(command)
    }

    fn owns_resources(&self) -> bool {
        (**self).owns_resources()
    }
}

/// Timing and execution settings for a [`FleetManager`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FleetSettings {
    /// Readiness polling.
    pub readiness: ReadinessPolicy,
    /// Session establishment retries.
    pub retry: RetryPolicy,
    /// Command execution options.
    pub dispatch: DispatchOptions,
}

/// [`Manager`] over a cloud backend and a session transport.
///
/// Owns its nodes and sessions exclusively.
pub struct FleetManager<B: Backend, T: Transport> {
    name: String,
    backend: B,
    transport: Arc<T>,
    request: FleetRequest,
    settings: FleetSettings,
    nodes: Vec<Node>,
    sessions: Vec<Session>,
}

impl<B: Backend, T: Transport> FleetManager<B, T> {
    /// Creates a manager that will provision `request` when asked.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        backend: B,
        transport: T,
        request: FleetRequest,
        settings: FleetSettings,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            transport: Arc::new(transport),
            request,
            settings,
            nodes: Vec::new(),
            sessions: Vec::new(),
        }
    }

    /// Nodes currently owned.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Sessions currently open.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Request this manager provisions.
    #[must_use]
    pub const fn request(&self) -> &FleetRequest {
        &self.request
    }

    async fn provision_fleet(&mut self) -> Result<(), FleetError> {
        if self.owns_resources() {
            return Err(FleetError::AlreadyProvisioned);
        }

        self.nodes = request_batch(&self.backend, &self.request).await?;

        info!(name = %self.request.name, "tagging nodes");
        self.backend
            .tag(&self.nodes, &self.request.name)
            .await
            .map_err(|err| FleetError::Provisioning {
                message: String::from("failed to tag nodes"),
                source: Some(Box::new(err)),
            })?;

        self.nodes =
            wait_until_running(&self.backend, &self.nodes, self.settings.readiness).await?;

        connect_all(
            &self.transport,
            &self.nodes,
            self.settings.retry,
            &mut self.sessions,
        )
        .await?;
        info!(nodes = self.nodes.len(), "fleet ready");
        Ok(())
    }

    async fn release(&mut self) -> Result<(), FleetError> {
        for session in std::mem::take(&mut self.sessions) {
            let node_id = session.node_id.clone();
            if let Err(err) = self.transport.close(session).await {
                warn!(node = %node_id, error = %err, "failed to close session");
            }
        }

        let nodes = std::mem::take(&mut self.nodes);
        if nodes.is_empty() {
            return Ok(());
        }
        info!(nodes = nodes.len(), "destroying nodes");
        self.backend
            .destroy(&nodes)
            .await
            .map_err(|err| FleetError::Teardown {
                message: format!("failed to destroy nodes: {}", node_ids(&nodes)),
                source: Some(Box::new(err)),
            })
    }

    const fn ensure_sessions(&self) -> Result<(), FleetError> {
        if self.sessions.is_empty() {
            return Err(FleetError::NotProvisioned);
        }
        Ok(())
    }

    async fn run_script(&self, script: &Utf8Path) -> Result<(), FleetError> {
        self.ensure_sessions()?;
        let remote = fleet::upload(&self.transport, &self.sessions, script).await?;
        let command = format!("/bin/sh {}", escape(remote.into()));
        let outcomes =
            fleet::dispatch(&self.transport, &self.sessions, &command, self.settings.dispatch)
                .await?;
        fleet::validate(&outcomes, &command)?;
        info!(script = %script, "setup script succeeded on every node");
        Ok(())
    }

    async fn run_command(&self, command: &dyn Command) -> Result<Report, FleetError> {
        self.ensure_sessions()?;
        let command_string = command.command_string();
        let outcomes = fleet::dispatch(
            &self.transport,
            &self.sessions,
            &command_string,
            self.settings.dispatch,
        )
        .await?;
        fleet::validate(&outcomes, &command_string)?;
        Ok(command.aggregate(outcomes)?)
    }
}

fn node_ids(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(|node| node.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<B: Backend, T: Transport> Manager for FleetManager<B, T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn provision(&mut self) -> ManagerFuture<'_, ()> {
        Box::pin(self.provision_fleet())
    }

    fn teardown(&mut self) -> ManagerFuture<'_, ()> {
        Box::pin(self.release())
    }

    fn setup<'a>(&'a self, script: &'a Utf8Path) -> ManagerFuture<'a, ()> {
        Box::pin(self.run_script(script))
    }

    fn run<'a>(&'a self, command: &'a dyn Command) -> ManagerFuture<'a, Report> {
        Box::pin(self.run_command(command))
    }

    fn owns_resources(&self) -> bool {
        !self.nodes.is_empty() || !self.sessions.is_empty()
    }
}

impl<B: Backend, T: Transport> Drop for FleetManager<B, T> {
    fn drop(&mut self) {
        if !self.nodes.is_empty() {
            warn!(
                nodes = %node_ids(&self.nodes),
                "fleet manager dropped without teardown; run employ-janitor to remove the nodes"
            );
        }
    }
}

#[cfg(test)]
mod tests;
