//! Unit tests for the fleet manager lifecycle.

use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::Utf8Path;
use rstest::{fixture, rstest};

use super::*;
use crate::outcome::ExecutionOutcome;
use crate::ssh::{CommandOutput, CommandRunner, SpawnError, SshConfig, SshTransport};
use crate::test_support::{RecordingCommand, ScriptedBackend, ScriptedTransport};

struct Harness {
    backend: ScriptedBackend,
    transport: ScriptedTransport,
    manager: FleetManager<ScriptedBackend, ScriptedTransport>,
}

fn request(count: usize) -> FleetRequest {
    FleetRequest::builder()
        .image_label("Ubuntu 24.04 Noble Numbat")
        .architecture("x86_64")
        .count(count)
        .instance_type("DEV1-S")
        .zone("fr-par-1")
        .project_id("project")
        .name("bench")
        .build()
        .expect("valid request")
}

fn harness(count: usize) -> Harness {
    let backend = ScriptedBackend::new();
    let transport = ScriptedTransport::new();
    let settings = FleetSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        },
        ..FleetSettings::default()
    };
    let manager = FleetManager::new(
        "scripted",
        backend.clone(),
        transport.clone(),
        request(count),
        settings,
    );
    Harness {
        backend,
        transport,
        manager,
    }
}

#[fixture]
fn two_nodes() -> Harness {
    harness(2)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn provision_tags_waits_and_connects(two_nodes: Harness) {
    let Harness {
        backend,
        transport: _,
        mut manager,
    } = two_nodes;

    manager.provision().await.expect("provision");

    assert!(manager.owns_resources());
    assert_eq!(manager.nodes().len(), 2);
    assert_eq!(manager.sessions().len(), 2);
    assert_eq!(
        backend.tag_calls(),
        vec![(
            vec![String::from("node-1"), String::from("node-2")],
            String::from("bench")
        )]
    );
    manager.teardown().await.expect("teardown");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn second_provision_is_rejected(two_nodes: Harness) {
    let Harness { mut manager, .. } = two_nodes;
    manager.provision().await.expect("provision");

    let err = manager.provision().await.expect_err("already provisioned");

    assert!(matches!(err, FleetError::AlreadyProvisioned));
    manager.teardown().await.expect("teardown");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn teardown_closes_sessions_then_destroys_nodes_once(two_nodes: Harness) {
    let Harness {
        backend,
        transport,
        mut manager,
    } = two_nodes;
    manager.provision().await.expect("provision");

    manager.teardown().await.expect("teardown");
    manager.teardown().await.expect("second teardown is a no-op");

    let mut closed = transport.closed();
    closed.sort();
    assert_eq!(closed, vec!["node-1", "node-2"]);
    assert_eq!(backend.destroy_calls(), 1);
    assert_eq!(backend.destroyed(), vec!["node-1", "node-2"]);
    assert!(!manager.owns_resources());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unreachable_node_leaves_every_node_owned(two_nodes: Harness) {
    let Harness {
        backend,
        transport,
        mut manager,
    } = two_nodes;
    transport.never_connect("node-2");

    let err = manager.provision().await.expect_err("unreachable");

    assert!(matches!(err, FleetError::SessionEstablishment { attempts: 3, .. }));
    assert!(manager.owns_resources());
    manager.teardown().await.expect("teardown");
    assert_eq!(backend.destroyed(), vec!["node-1", "node-2"]);
}

/// Runner where 10.0.0.2 refuses at once and the master for 10.0.0.1 takes
/// a while to come up.
#[derive(Clone, Debug, Default)]
struct SlowMasterRunner {
    calls: Arc<Mutex<Vec<String>>>,
}

impl SlowMasterRunner {
    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandRunner for SlowMasterRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let line = std::iter::once(program.to_owned())
            .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
        let refused = line.ends_with("root@10.0.0.2");
        if refused {
            return Ok(CommandOutput {
                code: Some(255),
                stdout: Vec::new(),
                stderr: b"Connection refused".to_vec(),
            });
        }
        if line.contains("ControlMaster=yes") {
            std::thread::sleep(Duration::from_millis(300));
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

#[tokio::test]
async fn teardown_closes_master_opened_while_another_node_failed() {
    let runner = SlowMasterRunner::default();
    let config = SshConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::from("scp"),
        ssh_user: String::from("root"),
        ssh_port: 22,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        ssh_identity_file: None,
        control_dir: String::from("/run/employ"),
        connect_timeout_secs: 5,
    };
    let transport = SshTransport::new(config, runner.clone()).expect("valid config");
    let backend = ScriptedBackend::new();
    let settings = FleetSettings {
        readiness: ReadinessPolicy {
            poll_interval: Duration::from_millis(10),
            ready_timeout: None,
        },
        retry: RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(10),
        },
        ..FleetSettings::default()
    };
    let mut manager = FleetManager::new("ssh", backend.clone(), transport, request(2), settings);

    let err = manager.provision().await.expect_err("node-2 refuses");
    assert!(matches!(err, FleetError::SessionEstablishment { ref node_id, .. } if node_id == "node-2"));
    manager.teardown().await.expect("teardown");

    let calls = runner.calls();
    let started = calls
        .iter()
        .filter(|call| call.contains("ControlMaster=yes") && call.ends_with("root@10.0.0.1"))
        .count();
    let closed = calls
        .iter()
        .filter(|call| call.contains("-O exit") && call.ends_with("root@10.0.0.1"))
        .count();
    assert_eq!(started, 1);
    assert_eq!(closed, 1, "master for node-1 left running: {calls:?}");
    assert_eq!(backend.destroyed(), vec!["node-1", "node-2"]);
}

#[rstest]
#[tokio::test]
async fn rejected_batch_owns_nothing(two_nodes: Harness) {
    let Harness {
        backend,
        mut manager,
        ..
    } = two_nodes;
    backend.fail_on_create();

    let err = manager.provision().await.expect_err("rejected");

    assert!(matches!(err, FleetError::Provisioning { .. }));
    assert!(!manager.owns_resources());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn run_aggregates_validated_outcomes(two_nodes: Harness) {
    let Harness {
        transport,
        mut manager,
        ..
    } = two_nodes;
    transport.respond_all(&["node-1", "node-2"], &ExecutionOutcome::new(0, "hi\n", ""));
    manager.provision().await.expect("provision");
    let command = RecordingCommand::new("echo hi");

    let report = manager.run(&command).await.expect("run");

    assert_eq!(report.entries.len(), 2);
    let aggregated = command.aggregated();
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated.first().map(Vec::len), Some(2));
    manager.teardown().await.expect("teardown");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failing_node_skips_aggregation(two_nodes: Harness) {
    let Harness {
        transport,
        mut manager,
        ..
    } = two_nodes;
    transport.respond("node-2", ExecutionOutcome::new(1, "partial", "boom"));
    manager.provision().await.expect("provision");
    let command = RecordingCommand::new("make check");

    let err = manager.run(&command).await.expect_err("node-2 fails");

    let FleetError::Execution(failure) = err else {
        panic!("expected an execution error");
    };
    assert_eq!(failure.node_id, "node-2");
    assert_eq!(failure.status, 1);
    assert_eq!(failure.stdout, b"partial");
    assert_eq!(failure.stderr, b"boom");
    assert!(command.aggregated().is_empty());
    manager.teardown().await.expect("teardown");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn setup_uploads_before_running_script(two_nodes: Harness) {
    let Harness {
        transport,
        mut manager,
        ..
    } = two_nodes;
    manager.provision().await.expect("provision");

    manager
        .setup(Utf8Path::new("scripts/prepare.sh"))
        .await
        .expect("setup");

    assert_eq!(transport.uploads().len(), 2);
    let executions = transport.executions();
    assert_eq!(executions.len(), 2);
    assert!(
        executions
            .iter()
            .all(|(_, command, _)| command == "/bin/sh /tmp/prepare.sh")
    );
    manager.teardown().await.expect("teardown");
}

#[rstest]
#[tokio::test]
async fn run_before_provision_is_rejected(two_nodes: Harness) {
    let command = RecordingCommand::new("true");
    let err = two_nodes
        .manager
        .run(&command)
        .await
        .expect_err("not provisioned");
    assert!(matches!(err, FleetError::NotProvisioned));
}
