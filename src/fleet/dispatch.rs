//! Concurrent command execution and file fan-out.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::FleetError;
use crate::outcome::NodeOutcome;
use crate::ssh::{Session, Transport};

/// Remote directory that receives uploaded setup scripts.
pub const REMOTE_SCRIPT_DIR: &str = "/tmp";

/// Per-dispatch execution options.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DispatchOptions {
    /// Requests a pseudo-terminal for every command.
    pub pty: bool,
    /// Upper bound on each node's command; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Remote path a local script is copied to: `/tmp/<basename>`.
///
/// Returns `None` when `local` has no file name.
#[must_use]
pub fn remote_script_path(local: &Utf8Path) -> Option<String> {
    local
        .file_name()
        .map(|name| format!("{REMOTE_SCRIPT_DIR}/{name}"))
}

/// Runs `command` verbatim on every session concurrently.
///
/// Every task is joined before returning. Outcomes are returned in
/// completion order, one per session, and exit statuses are not
/// interpreted here.
///
/// # Errors
///
/// Returns the first [`FleetError::ConnectionLost`] or
/// [`FleetError::CommandTimeout`] observed, once all tasks have finished.
pub async fn dispatch<T: Transport>(
    transport: &Arc<T>,
    sessions: &[Session],
    command: &str,
    options: DispatchOptions,
) -> Result<Vec<NodeOutcome>, FleetError> {
    info!(sessions = sessions.len(), %command, "dispatching command");
    let mut tasks = JoinSet::new();
    for session in sessions {
        let worker = Arc::clone(transport);
        let owned_session = session.clone();
        let owned_command = command.to_owned();
        tasks.spawn(async move {
            run_on(worker.as_ref(), &owned_session, &owned_command, options).await
        });
    }

    let mut outcomes = Vec::with_capacity(sessions.len());
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                debug!(node = %outcome.node_id, status = outcome.outcome.status, "command finished");
                outcomes.push(outcome);
            }
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => {
                failure.get_or_insert(FleetError::Join(err.to_string()));
            }
        }
    }

    failure.map_or(Ok(outcomes), Err)
}

async fn run_on<T: Transport + ?Sized>(
    transport: &T,
    session: &Session,
    command: &str,
    options: DispatchOptions,
) -> Result<NodeOutcome, FleetError> {
    let exec = transport.exec(session, command, options.pty);
    let result = match options.timeout {
        None => exec.await,
        Some(after) => tokio::time::timeout(after, exec).await.map_err(|_| {
            FleetError::CommandTimeout {
                node_id: session.node_id.clone(),
                after,
            }
        })?,
    };
    let outcome = result.map_err(|err| FleetError::ConnectionLost {
        node_id: session.node_id.clone(),
        message: err.to_string(),
    })?;
    Ok(NodeOutcome {
        node_id: session.node_id.clone(),
        outcome,
    })
}

/// Copies `local` to `/tmp/<basename>` on every session concurrently and
/// returns the remote path once every copy has finished.
///
/// # Errors
///
/// Returns [`FleetError::Upload`] for the first failed copy, or when
/// `local` has no file name.
pub async fn upload<T: Transport>(
    transport: &Arc<T>,
    sessions: &[Session],
    local: &Utf8Path,
) -> Result<String, FleetError> {
    let remote = remote_script_path(local).ok_or_else(|| FleetError::Upload {
        path: local.to_string(),
        node_id: String::new(),
        message: String::from("path has no file name"),
    })?;
    info!(sessions = sessions.len(), local = %local, %remote, "uploading file");

    let mut tasks = JoinSet::new();
    for session in sessions {
        let worker = Arc::clone(transport);
        let owned_session = session.clone();
        let source = local.to_owned();
        let target = remote.clone();
        tasks.spawn(async move {
            worker
                .upload(&owned_session, &source, &target)
                .await
                .map_err(|err| FleetError::Upload {
                    path: source.to_string(),
                    node_id: owned_session.node_id.clone(),
                    message: err.to_string(),
                })
        });
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => {
                failure.get_or_insert(FleetError::Join(err.to_string()));
            }
        }
    }

    failure.map_or(Ok(remote), Err)
}
