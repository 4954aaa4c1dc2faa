//! Commands: what runs on every node and how the per-node results are
//! reduced into a report.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::outcome::NodeOutcome;

mod ab;
mod shell;

pub use ab::ApacheBenchCommand;
pub use shell::ShellCommand;

/// A command that can be fanned out across a fleet.
///
/// The engine only calls [`Command::command_string`] and
/// [`Command::aggregate`]; it never looks further inside.
pub trait Command: Send + Sync {
    /// Registry name of the command.
    fn name(&self) -> &str;

    /// Shell string passed verbatim to every node.
    fn command_string(&self) -> String;

    /// Reduces the complete, validated outcome set into a report.
    ///
    /// Called exactly once per run, and only when every node exited 0.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError`] when the outcomes cannot be reduced.
    fn aggregate(&self, outcomes: Vec<NodeOutcome>) -> Result<Report, AggregateError>;
}

/// Raised when a command cannot reduce its outcomes.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{command} could not aggregate results: {message}")]
pub struct AggregateError {
    /// Name of the command.
    pub command: String,
    /// Description of the problem.
    pub message: String,
}

/// Raised when command arguments are missing or malformed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid arguments for {command}: {message}")]
pub struct CommandArgsError {
    /// Name of the command.
    pub command: String,
    /// Description of the problem, usually including the expected usage.
    pub message: String,
}

/// One node's contribution to a [`Report`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Node the output came from.
    pub node_id: String,
    /// Standard output decoded as UTF-8.
    pub output: String,
}

/// Result of a run, ready for display or JSON output.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Report {
    /// Heading, normally the dispatched command string.
    pub title: String,
    /// Per-node output, sorted by node id.
    pub entries: Vec<ReportEntry>,
    /// Command specific summary line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Report {
    /// Builds a report listing every node's stdout, sorted by node id so
    /// output is stable across runs.
    #[must_use]
    pub fn from_outcomes(title: impl Into<String>, outcomes: Vec<NodeOutcome>) -> Self {
        let mut entries: Vec<ReportEntry> = outcomes
            .into_iter()
            .map(|entry| ReportEntry {
                output: entry.outcome.stdout_lossy(),
                node_id: entry.node_id,
            })
            .collect();
        entries.sort_by(|left, right| left.node_id.cmp(&right.node_id));
        Self {
            title: title.into(),
            entries,
            summary: None,
        }
    }

    /// Attaches a summary line.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.title)?;
        for entry in &self.entries {
            writeln!(f, "[{}]", entry.node_id)?;
            let output = entry.output.trim_end();
            if !output.is_empty() {
                writeln!(f, "{output}")?;
            }
        }
        if let Some(summary) = &self.summary {
            writeln!(f, "{summary}")?;
        }
        Ok(())
    }
}
