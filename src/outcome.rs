//! Per-node command results passed from dispatch to aggregation.

/// Exit status and captured output of one command on one node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionOutcome {
    /// Exit status reported by the remote shell.
    pub status: i32,
    /// Raw standard output bytes.
    pub stdout: Vec<u8>,
    /// Raw standard error bytes.
    pub stderr: Vec<u8>,
}

impl ExecutionOutcome {
    /// Creates an outcome from its parts.
    #[must_use]
    pub fn new(status: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns `true` when the exit status equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Standard output decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// An [`ExecutionOutcome`] paired with the node that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeOutcome {
    /// Identifier of the node the command ran on.
    pub node_id: String,
    /// Result of the command on that node.
    pub outcome: ExecutionOutcome,
}
