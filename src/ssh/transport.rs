//! Session transport contract shared by the SSH client and test doubles.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::backend::Node;
use crate::outcome::ExecutionOutcome;

/// A live authenticated channel bound to exactly one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    /// Identifier of the node this session is bound to.
    pub node_id: String,
    /// Address the session was opened against.
    pub host: IpAddr,
    /// Multiplexing socket backing the session, when the transport uses one.
    pub control_path: Option<Utf8PathBuf>,
}

impl Session {
    /// Creates a session without a control socket.
    #[must_use]
    pub fn new(node_id: impl Into<String>, host: IpAddr) -> Self {
        Self {
            node_id: node_id.into(),
            host,
            control_path: None,
        }
    }

    /// Attaches a control socket path.
    #[must_use]
    pub fn with_control_path(mut self, path: Utf8PathBuf) -> Self {
        self.control_path = Some(path);
        self
    }
}

/// Errors raised while opening or using a session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when a node has no address to connect to.
    #[error("node {node_id} has no public address")]
    MissingAddress {
        /// Node without an address.
        node_id: String,
    },
    /// Raised when a connection attempt is refused or times out.
    #[error("could not reach {host}: {message}")]
    Unreachable {
        /// Target address.
        host: String,
        /// Client diagnostics.
        message: String,
    },
    /// Raised when an established session drops mid-operation.
    #[error("connection to {host} lost: {message}")]
    Disconnected {
        /// Target address.
        host: String,
        /// Client diagnostics.
        message: String,
    },
    /// Raised when the client program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a file copy exits unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program used for the copy.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

/// Future returned by transport operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Opens, uses, and closes per-node remote execution sessions.
pub trait Transport: Send + Sync + 'static {
    /// Opens an authenticated session to `node`. One call is one attempt.
    fn open<'a>(&'a self, node: &'a Node) -> TransportFuture<'a, Session>;

    /// Runs `command` verbatim on the session and drains its output.
    ///
    /// `pty` requests a pseudo-terminal for shells that require one. A
    /// remote exit status, including 255, is returned as an outcome; only a
    /// lost connection yields [`TransportError::Disconnected`].
    fn exec<'a>(
        &'a self,
        session: &'a Session,
        command: &'a str,
        pty: bool,
    ) -> TransportFuture<'a, ExecutionOutcome>;

    /// Copies the local file at `local` to `remote` on the node.
    fn upload<'a>(
        &'a self,
        session: &'a Session,
        local: &'a Utf8Path,
        remote: &'a str,
    ) -> TransportFuture<'a, ()>;

    /// Closes the session.
    fn close(&self, session: Session) -> TransportFuture<'_, ()>;
}
