//! BDD step definitions for fleet runs.

use std::fs::write;

use camino::Utf8PathBuf;
use employ::manager::{FleetManager, FleetSettings};
use employ::outcome::ExecutionOutcome;
use employ::test_support::RecordingCommand;
use employ::RunOrchestrator;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::{FailureKind, FleetContext, RunResult, node_ids, request};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a fleet of {count} nodes")]
fn fleet_of(mut fleet_context: FleetContext, count: usize) -> FleetContext {
    fleet_context.count = count;
    fleet_context
}

#[given("every node prints \"{stdout}\"")]
fn every_node_prints(fleet_context: FleetContext, stdout: String) -> FleetContext {
    let ids = node_ids(fleet_context.count);
    let refs = ids.iter().map(String::as_str).collect::<Vec<_>>();
    fleet_context
        .transport
        .respond_all(&refs, &ExecutionOutcome::new(0, format!("{stdout}\n"), ""));
    fleet_context
}

#[given("node \"{node}\" never accepts connections")]
fn node_never_connects(fleet_context: FleetContext, node: String) -> FleetContext {
    fleet_context.transport.never_connect(&node);
    fleet_context
}

#[given("node \"{node}\" exits with status {status}")]
fn node_exits_with(fleet_context: FleetContext, node: String, status: i32) -> FleetContext {
    fleet_context
        .transport
        .respond(&node, ExecutionOutcome::new(status, "", "simulated failure\n"));
    fleet_context
}

#[given("the backend returns {missing} node short")]
fn backend_returns_short(fleet_context: FleetContext, missing: usize) -> FleetContext {
    fleet_context.backend.short_batch(missing);
    fleet_context
}

#[given("a setup script named \"{name}\"")]
fn setup_script(mut fleet_context: FleetContext, name: String) -> FleetContext {
    let path = fleet_context.workspace.path().join(&name);
    write(&path, "#!/bin/sh\necho prepared\n")
        .unwrap_or_else(|err| panic!("write setup script {name}: {err}"));
    let utf8 = Utf8PathBuf::from_path_buf(path)
        .unwrap_or_else(|path| panic!("non-utf8 script path: {}", path.display()));
    fleet_context.setup_script = Some(utf8);
    fleet_context
}

#[when("I run \"{command}\" across the fleet")]
fn run_across_fleet(
    mut fleet_context: FleetContext,
    command: String,
) -> Result<FleetContext, StepError> {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Runtime(err.to_string()))?;
    fleet_context.command = RecordingCommand::new(command);

    let manager = FleetManager::new(
        "scripted",
        fleet_context.backend.clone(),
        fleet_context.transport.clone(),
        request(fleet_context.count),
        FleetSettings::default(),
    );
    let mut orchestrator = RunOrchestrator::new(manager);
    let result = runtime.block_on(
        orchestrator.execute(&fleet_context.command, fleet_context.setup_script.as_deref()),
    );
    fleet_context.outcome = Some(match result {
        Ok(report) => RunResult::Success(report),
        Err(err) => RunResult::from_error(&err),
    });
    Ok(fleet_context)
}

fn failure_kind(fleet_context: &FleetContext) -> Result<&FailureKind, StepError> {
    match &fleet_context.outcome {
        Some(RunResult::Failure { kind, .. }) => Ok(kind),
        other => Err(StepError::Assertion(format!(
            "expected failure, got {other:?}"
        ))),
    }
}

fn expect_kind(fleet_context: &FleetContext, expected: &FailureKind) -> Result<(), StepError> {
    let kind = failure_kind(fleet_context)?;
    if kind == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {kind:?}"
        )))
    }
}

#[then("the report lists {count} nodes")]
fn report_lists(fleet_context: &FleetContext, count: usize) -> Result<(), StepError> {
    let Some(RunResult::Success(report)) = &fleet_context.outcome else {
        return Err(StepError::Assertion(format!(
            "expected success, got {:?}",
            fleet_context.outcome
        )));
    };
    let listed = report
        .entries
        .iter()
        .map(|entry| entry.node_id.clone())
        .collect::<Vec<_>>();
    if listed == node_ids(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected entries: {listed:?}")))
    }
}

#[then("the command aggregated {count} outcomes exactly once")]
fn aggregated_once(fleet_context: &FleetContext, count: usize) -> Result<(), StepError> {
    let calls = fleet_context.command.aggregated();
    match calls.as_slice() {
        [outcomes] if outcomes.len() == count => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected one aggregation of {count} outcomes, got {calls:?}"
        ))),
    }
}

#[then("no outcomes are aggregated")]
fn nothing_aggregated(fleet_context: &FleetContext) -> Result<(), StepError> {
    let calls = fleet_context.command.aggregated();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "aggregation should not run, got {calls:?}"
        )))
    }
}

#[then("all {count} nodes are destroyed exactly once")]
fn destroyed_once(fleet_context: &FleetContext, count: usize) -> Result<(), StepError> {
    let calls = fleet_context.backend.destroy_calls();
    let mut destroyed = fleet_context.backend.destroyed();
    destroyed.sort();
    if calls == 1 && destroyed == node_ids(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one destroy of {count} nodes, got {calls} call(s) for {destroyed:?}"
        )))
    }
}

#[then("the run fails with a session establishment error for \"{node}\"")]
fn session_failure(fleet_context: &FleetContext, node: String) -> Result<(), StepError> {
    expect_kind(
        fleet_context,
        &FailureKind::SessionEstablishment { node_id: node },
    )
}

#[then("the run fails with status {status} on \"{node}\"")]
fn execution_failure(
    fleet_context: &FleetContext,
    status: i32,
    node: String,
) -> Result<(), StepError> {
    expect_kind(
        fleet_context,
        &FailureKind::Execution {
            node_id: node,
            status,
        },
    )
}

#[then("the run fails with a provisioning error")]
fn provisioning_failure(fleet_context: &FleetContext) -> Result<(), StepError> {
    expect_kind(fleet_context, &FailureKind::Provisioning)
}

#[then("no session is opened")]
fn no_sessions(fleet_context: &FleetContext) -> Result<(), StepError> {
    let attempts = node_ids(fleet_context.count)
        .iter()
        .map(|node| fleet_context.transport.attempts(node))
        .sum::<u32>();
    if attempts == 0 && fleet_context.transport.closed().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no connection attempts, got {attempts}"
        )))
    }
}

#[then("the setup script runs on every node before the command")]
fn setup_before_command(fleet_context: &FleetContext) -> Result<(), StepError> {
    let count = fleet_context.count;
    let uploads = fleet_context.transport.uploads();
    let commands = fleet_context
        .transport
        .executions()
        .into_iter()
        .map(|(_, command, _)| command)
        .collect::<Vec<_>>();
    let (setup, rest) = commands.split_at(count.min(commands.len()));
    let setup_ok = setup
        .iter()
        .all(|command| command == "/bin/sh /tmp/prepare.sh");
    let rest_ok = rest.len() == count && rest.iter().all(|command| command == "echo hi");
    if uploads.len() == count && setup_ok && rest_ok {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected ordering: uploads {uploads:?}, commands {commands:?}"
        )))
    }
}
