//! Exit status validation ahead of aggregation.

use thiserror::Error;

use crate::outcome::NodeOutcome;

/// A node's command exited with a non-zero status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "`{command}` exited with status {status} on node {node_id}: {}",
    String::from_utf8_lossy(.stderr).trim()
)]
pub struct ExecutionError {
    /// Command string that was dispatched.
    pub command: String,
    /// Node whose outcome failed.
    pub node_id: String,
    /// Exit status reported by the node.
    pub status: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

/// Fails on the first outcome with a non-zero status.
///
/// # Errors
///
/// Returns [`ExecutionError`] carrying the failing node's full outcome.
pub fn validate(outcomes: &[NodeOutcome], command: &str) -> Result<(), ExecutionError> {
    match outcomes.iter().find(|entry| !entry.outcome.is_success()) {
        None => Ok(()),
        Some(failed) => Err(ExecutionError {
            command: command.to_owned(),
            node_id: failed.node_id.clone(),
            status: failed.outcome.status,
            stdout: failed.outcome.stdout.clone(),
            stderr: failed.outcome.stderr.clone(),
        }),
    }
}
