//! Fleet engine: provisioning, connection establishment, concurrent
//! dispatch and outcome validation.
//!
//! The phases run strictly in order and each one is fully joined before the
//! next begins. Every function here borrows its inputs; ownership of nodes
//! and sessions stays with [`crate::manager::FleetManager`].

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

use crate::command::AggregateError;

mod connect;
mod dispatch;
mod provision;
mod validate;

pub use connect::{RetryPolicy, connect_all};
pub use dispatch::{DispatchOptions, REMOTE_SCRIPT_DIR, dispatch, remote_script_path, upload};
pub use provision::{ReadinessPolicy, request_batch, wait_until_running};
pub use validate::{ExecutionError, validate};

/// Boxed error used as the source of wrapped backend and transport failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the fleet engine.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The backend rejected or only partially fulfilled the batch request.
    #[error("provisioning failed: {message}")]
    Provisioning {
        /// Description of the failure.
        message: String,
        /// Underlying backend error, when there is one.
        #[source]
        source: Option<BoxError>,
    },
    /// Nodes never reached a ready state.
    #[error("fleet did not become ready: {message}")]
    NotReady {
        /// Description of the failure.
        message: String,
        /// Underlying backend error, when there is one.
        #[source]
        source: Option<BoxError>,
    },
    /// A node stayed unreachable for the whole attempt budget.
    #[error("could not open a session to node {node_id} after {attempts} attempts")]
    SessionEstablishment {
        /// Node that never became reachable.
        node_id: String,
        /// Number of attempts made.
        attempts: u32,
    },
    /// A node's command exited with a non-zero status.
    #[error(transparent)]
    Execution(Box<ExecutionError>),
    /// A session dropped while a command was running.
    #[error("lost connection to node {node_id}: {message}")]
    ConnectionLost {
        /// Node whose session dropped.
        node_id: String,
        /// Transport diagnostics.
        message: String,
    },
    /// A command did not finish within the configured limit.
    #[error("command on node {node_id} did not finish within {}s", .after.as_secs())]
    CommandTimeout {
        /// Node that did not finish.
        node_id: String,
        /// Configured limit.
        after: Duration,
    },
    /// Copying a setup script to a node failed.
    #[error("failed to upload {path} to node {node_id}: {message}")]
    Upload {
        /// Local file being copied.
        path: String,
        /// Target node.
        node_id: String,
        /// Transport diagnostics.
        message: String,
    },
    /// An operation that needs sessions ran before provisioning.
    #[error("fleet is not provisioned")]
    NotProvisioned,
    /// Provisioning was requested twice without a teardown in between.
    #[error("fleet is already provisioned; tear it down first")]
    AlreadyProvisioned,
    /// The command's aggregator rejected the outcome set.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    /// Closing sessions or destroying nodes failed.
    #[error("teardown failed: {message}")]
    Teardown {
        /// Description of what could not be released.
        message: String,
        /// First underlying failure.
        #[source]
        source: Option<BoxError>,
    },
    /// A fan-out task panicked or was cancelled.
    #[error("fleet task failed: {0}")]
    Join(String),
}

impl From<ExecutionError> for FleetError {
    fn from(err: ExecutionError) -> Self {
        Self::Execution(Box::new(err))
    }
}

impl FleetError {
    pub(crate) fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
            source: None,
        }
    }
}
