//! Shared fixtures for fleet BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use employ::command::Report;
use employ::fleet::FleetError;
use employ::test_support::{RecordingCommand, ScriptedBackend, ScriptedTransport};
use employ::{FleetRequest, RunError};
use rstest::fixture;
use tempfile::TempDir;

#[derive(Clone, Debug)]
pub struct FleetContext {
    pub backend: ScriptedBackend,
    pub transport: ScriptedTransport,
    pub command: RecordingCommand,
    pub count: usize,
    pub setup_script: Option<Utf8PathBuf>,
    pub outcome: Option<RunResult>,
    pub(crate) workspace: Arc<TempDir>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Provisioning,
    SessionEstablishment { node_id: String },
    Execution { node_id: String, status: i32 },
    Other,
}

#[derive(Clone, Debug)]
pub enum RunResult {
    Success(Report),
    Failure { kind: FailureKind, message: String },
}

impl RunResult {
    pub fn from_error(err: &RunError) -> Self {
        let kind = match err.fleet_error() {
            FleetError::Provisioning { .. } => FailureKind::Provisioning,
            FleetError::SessionEstablishment { node_id, .. } => {
                FailureKind::SessionEstablishment {
                    node_id: node_id.clone(),
                }
            }
            FleetError::Execution(execution) => FailureKind::Execution {
                node_id: execution.node_id.clone(),
                status: execution.status,
            },
            _ => FailureKind::Other,
        };
        Self::Failure {
            kind,
            message: err.to_string(),
        }
    }
}

#[fixture]
pub fn fleet_context() -> FleetContext {
    let workspace = TempDir::new().unwrap_or_else(|err| panic!("create workspace: {err}"));
    FleetContext {
        backend: ScriptedBackend::new(),
        transport: ScriptedTransport::new(),
        command: RecordingCommand::new("echo hi"),
        count: 1,
        setup_script: None,
        outcome: None,
        workspace: Arc::new(workspace),
    }
}

pub fn request(count: usize) -> FleetRequest {
    FleetRequest::builder()
        .image_label("Ubuntu 24.04 Noble Numbat")
        .architecture("x86_64")
        .count(count)
        .instance_type("DEV1-S")
        .zone("fr-par-1")
        .project_id("project")
        .name("bdd")
        .build()
        .unwrap_or_else(|err| panic!("builder fixture should be valid: {err}"))
}

pub fn node_ids(count: usize) -> Vec<String> {
    (1..=count).map(|index| format!("node-{index}")).collect()
}
