//! Arbitrary shell command.

use super::{AggregateError, Command, CommandArgsError, Report};
use crate::outcome::NodeOutcome;

/// Runs its arguments, joined by spaces, as one shell string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellCommand {
    command: String,
}

impl ShellCommand {
    /// Registry name.
    pub const NAME: &'static str = "shell";

    /// Builds the command from CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CommandArgsError`] when no arguments are given.
    pub fn from_args(args: &[String]) -> Result<Self, CommandArgsError> {
        let command = args.join(" ");
        if command.trim().is_empty() {
            return Err(CommandArgsError {
                command: Self::NAME.to_owned(),
                message: String::from("usage: shell <command> [args]..."),
            });
        }
        Ok(Self { command })
    }
}

impl Command for ShellCommand {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn command_string(&self) -> String {
        self.command.clone()
    }

    fn aggregate(&self, outcomes: Vec<NodeOutcome>) -> Result<Report, AggregateError> {
        let nodes = outcomes.len();
        Ok(Report::from_outcomes(&self.command, outcomes)
            .with_summary(format!("{nodes} node(s) succeeded")))
    }
}
