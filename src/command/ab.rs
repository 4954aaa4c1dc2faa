//! ApacheBench load generation.

use super::{AggregateError, Command, CommandArgsError, Report};
use crate::outcome::NodeOutcome;

const USAGE: &str = "usage: ab <target> <requests> [<concurrency> [<extra_args>]]";

/// Runs `ab` against a target from every node.
///
/// ```text
/// employ run ab http://127.0.0.1/test.html 1000
/// employ run ab https://127.0.0.1:8000/test.html 1000 10 "-k -C 'cookie=1234'"
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApacheBenchCommand {
    target: String,
    requests: u64,
    concurrency: u64,
    extra_args: String,
}

impl ApacheBenchCommand {
    /// Registry name.
    pub const NAME: &'static str = "ab";

    /// Builds the command from CLI arguments.
    ///
    /// Arguments after the concurrency are joined into the extra arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CommandArgsError`] when the target or request count is
    /// missing, or a count is not a positive integer.
    pub fn from_args(args: &[String]) -> Result<Self, CommandArgsError> {
        let [target, raw_requests, rest @ ..] = args else {
            return Err(Self::invalid(USAGE));
        };
        let requests = Self::positive(raw_requests, "requests")?;
        let (concurrency, extra) = match rest {
            [] => (1, &[][..]),
            [concurrency, extra @ ..] => (Self::positive(concurrency, "concurrency")?, extra),
        };
        Ok(Self {
            target: target.clone(),
            requests,
            concurrency,
            extra_args: extra.join(" "),
        })
    }

    fn positive(value: &str, field: &str) -> Result<u64, CommandArgsError> {
        match value.trim().parse::<u64>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(Self::invalid(&format!(
                "{field} must be a positive integer, got {value:?}"
            ))),
        }
    }

    fn invalid(message: &str) -> CommandArgsError {
        CommandArgsError {
            command: Self::NAME.to_owned(),
            message: message.to_owned(),
        }
    }
}

impl Command for ApacheBenchCommand {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn command_string(&self) -> String {
        let base = format!(
            "ab {} -n {} -c {}",
            self.target, self.requests, self.concurrency
        );
        if self.extra_args.trim().is_empty() {
            base
        } else {
            format!("{base} {}", self.extra_args)
        }
    }

    fn aggregate(&self, outcomes: Vec<NodeOutcome>) -> Result<Report, AggregateError> {
        let nodes = u64::try_from(outcomes.len()).map_err(|err| AggregateError {
            command: Self::NAME.to_owned(),
            message: err.to_string(),
        })?;
        let total = self
            .requests
            .checked_mul(nodes)
            .ok_or_else(|| AggregateError {
                command: Self::NAME.to_owned(),
                message: String::from("total request count overflows"),
            })?;
        Ok(Report::from_outcomes(self.command_string(), outcomes).with_summary(format!(
            "{total} requests issued against {} from {nodes} node(s)",
            self.target
        )))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::outcome::ExecutionOutcome;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[rstest]
    #[case(&["http://127.0.0.1/test.html", "1000"], "ab http://127.0.0.1/test.html -n 1000 -c 1")]
    #[case(&["https://127.0.0.1:8000/test.html", "1000", "10"], "ab https://127.0.0.1:8000/test.html -n 1000 -c 10")]
    #[case(
        &["https://127.0.0.1:8000/test.html", "1000", "10", "-k -C 'cookie=1234'"],
        "ab https://127.0.0.1:8000/test.html -n 1000 -c 10 -k -C 'cookie=1234'"
    )]
    fn renders_ab_invocation(#[case] input: &[&str], #[case] expected: &str) {
        let command = ApacheBenchCommand::from_args(&args(input)).expect("valid args");
        assert_eq!(command.command_string(), expected);
    }

    #[rstest]
    #[case(&[])]
    #[case(&["http://target"])]
    #[case(&["http://target", "many"])]
    #[case(&["http://target", "0"])]
    #[case(&["http://target", "10", "-1"])]
    fn rejects_malformed_arguments(#[case] input: &[&str]) {
        let err = ApacheBenchCommand::from_args(&args(input)).expect_err("invalid");
        assert_eq!(err.command, "ab");
    }

    #[test]
    fn summary_counts_requests_across_nodes() {
        let command =
            ApacheBenchCommand::from_args(&args(&["http://target/", "500"])).expect("valid args");
        let outcomes = vec![
            NodeOutcome {
                node_id: String::from("a"),
                outcome: ExecutionOutcome::new(0, "Requests per second: 10\n", ""),
            },
            NodeOutcome {
                node_id: String::from("b"),
                outcome: ExecutionOutcome::new(0, "Requests per second: 12\n", ""),
            },
        ];

        let report = command.aggregate(outcomes).expect("report");

        assert_eq!(
            report.summary.as_deref(),
            Some("1000 requests issued against http://target/ from 2 node(s)")
        );
        assert_eq!(report.title, "ab http://target/ -n 500 -c 1");
    }
}
