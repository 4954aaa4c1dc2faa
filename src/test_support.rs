//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here are thread-safe so they can be driven from the fan-out
//! tasks the fleet spawns.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;

use crate::backend::{Backend, BackendFuture, FleetRequest, Node, NodeState};
use crate::command::{AggregateError, Command, Report};
use crate::outcome::{ExecutionOutcome, NodeOutcome};
use crate::ssh::{CommandOutput, CommandRunner, Session, SpawnError, Transport, TransportError, TransportFuture};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| SpawnError {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Errors produced by [`ScriptedBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedBackendError {
    /// The batch request was rejected.
    #[error("create failure")]
    Create,
    /// Tagging failed.
    #[error("tag failure")]
    Tag,
    /// Destroying nodes failed.
    #[error("destroy failure")]
    Destroy,
}

#[derive(Debug, Default)]
struct BackendState {
    fail_on_create: bool,
    fail_on_tag: bool,
    fail_on_destroy: bool,
    short_by: usize,
    pending_polls: u32,
    refresh_calls: u32,
    terminated: HashSet<String>,
    tags: Vec<(Vec<String>, String)>,
    destroy_calls: u32,
    destroyed: Vec<String>,
}

/// Backend double that creates `node-1..=node-N` on `10.0.0.x` addresses.
///
/// Nodes report `Pending` for a configurable number of refresh polls before
/// switching to `Running`. Every call is recorded for assertions.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    /// Creates a backend whose nodes are running on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next batch request.
    pub fn fail_on_create(&self) {
        lock(&self.state).fail_on_create = true;
    }

    /// Fails tagging.
    pub fn fail_on_tag(&self) {
        lock(&self.state).fail_on_tag = true;
    }

    /// Fails teardown (after recording the call).
    pub fn fail_on_destroy(&self) {
        lock(&self.state).fail_on_destroy = true;
    }

    /// Returns `missing` fewer nodes than requested.
    pub fn short_batch(&self, missing: usize) {
        lock(&self.state).short_by = missing;
    }

    /// Keeps nodes pending for `polls` refresh calls.
    pub fn pending_for(&self, polls: u32) {
        lock(&self.state).pending_polls = polls;
    }

    /// Reports `node_id` as terminated on every refresh.
    pub fn terminate_on_refresh(&self, node_id: &str) {
        lock(&self.state).terminated.insert(node_id.to_owned());
    }

    /// Number of refresh polls observed.
    #[must_use]
    pub fn refresh_calls(&self) -> u32 {
        lock(&self.state).refresh_calls
    }

    /// Tag calls as `(node ids, name)` pairs.
    #[must_use]
    pub fn tag_calls(&self) -> Vec<(Vec<String>, String)> {
        lock(&self.state).tags.clone()
    }

    /// Number of destroy calls observed.
    #[must_use]
    pub fn destroy_calls(&self) -> u32 {
        lock(&self.state).destroy_calls
    }

    /// Every node id passed to destroy, in call order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        lock(&self.state).destroyed.clone()
    }
}

fn scripted_address(index: usize) -> IpAddr {
    let octet = u8::try_from(index.saturating_add(1)).unwrap_or(u8::MAX);
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet))
}

impl Backend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn create_batch<'a>(
        &'a self,
        request: &'a FleetRequest,
    ) -> BackendFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let state = lock(&self.state);
            if state.fail_on_create {
                return Err(ScriptedBackendError::Create);
            }
            let created = request.count.saturating_sub(state.short_by);
            Ok((1..=created)
                .map(|index| Node::pending(format!("node-{index}"), request.zone.clone()))
                .collect())
        })
    }

    fn tag<'a>(&'a self, nodes: &'a [Node], name: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.fail_on_tag {
                return Err(ScriptedBackendError::Tag);
            }
            let ids = nodes.iter().map(|node| node.id.clone()).collect();
            state.tags.push((ids, name.to_owned()));
            Ok(())
        })
    }

    fn refresh<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.refresh_calls += 1;
            let running = state.refresh_calls > state.pending_polls;
            Ok(nodes
                .iter()
                .enumerate()
                .map(|(index, node)| {
                    if state.terminated.contains(&node.id) {
                        return Node {
                            state: NodeState::Terminated,
                            address: None,
                            ..node.clone()
                        };
                    }
                    if running {
                        Node {
                            state: NodeState::Running,
                            address: Some(scripted_address(index)),
                            ..node.clone()
                        }
                    } else {
                        node.clone()
                    }
                })
                .collect())
        })
    }

    fn destroy<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.destroy_calls += 1;
            state
                .destroyed
                .extend(nodes.iter().map(|node| node.id.clone()));
            if state.fail_on_destroy {
                return Err(ScriptedBackendError::Destroy);
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct TransportState {
    failures_before_connect: HashMap<String, u32>,
    connect_delays: HashMap<String, Duration>,
    outcomes: HashMap<String, ExecutionOutcome>,
    disconnect_on_exec: HashSet<String>,
    fail_upload: HashSet<String>,
    hang_on_exec: HashSet<String>,
    attempts: HashMap<String, u32>,
    executions: Vec<(String, String, bool)>,
    uploads: Vec<(String, String, String)>,
    closed: Vec<String>,
}

/// Transport double with per-node connection and execution scripts.
///
/// By default every node connects on the first attempt and every command
/// exits 0 with empty output.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    /// Creates a transport where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `failures` connection attempts for `node_id`.
    pub fn fail_connects(&self, node_id: &str, failures: u32) {
        lock(&self.state)
            .failures_before_connect
            .insert(node_id.to_owned(), failures);
    }

    /// Makes every successful connection to `node_id` take `delay`.
    pub fn delay_connect(&self, node_id: &str, delay: Duration) {
        lock(&self.state)
            .connect_delays
            .insert(node_id.to_owned(), delay);
    }

    /// Makes `node_id` unreachable forever.
    pub fn never_connect(&self, node_id: &str) {
        self.fail_connects(node_id, u32::MAX);
    }

    /// Scripts the outcome returned for every command on `node_id`.
    pub fn respond(&self, node_id: &str, outcome: ExecutionOutcome) {
        lock(&self.state)
            .outcomes
            .insert(node_id.to_owned(), outcome);
    }

    /// Scripts the same outcome for every node without an explicit one.
    pub fn respond_all(&self, node_ids: &[&str], outcome: &ExecutionOutcome) {
        for node_id in node_ids {
            self.respond(node_id, outcome.clone());
        }
    }

    /// Drops the connection to `node_id` during command execution.
    pub fn disconnect_on_exec(&self, node_id: &str) {
        lock(&self.state)
            .disconnect_on_exec
            .insert(node_id.to_owned());
    }

    /// Fails file uploads to `node_id`.
    pub fn fail_upload(&self, node_id: &str) {
        lock(&self.state).fail_upload.insert(node_id.to_owned());
    }

    /// Makes commands on `node_id` never complete.
    pub fn hang_on_exec(&self, node_id: &str) {
        lock(&self.state).hang_on_exec.insert(node_id.to_owned());
    }

    /// Connection attempts made for `node_id`.
    #[must_use]
    pub fn attempts(&self, node_id: &str) -> u32 {
        lock(&self.state)
            .attempts
            .get(node_id)
            .copied()
            .unwrap_or(0)
    }

    /// Executed commands as `(node id, command, pty)` triples.
    #[must_use]
    pub fn executions(&self) -> Vec<(String, String, bool)> {
        lock(&self.state).executions.clone()
    }

    /// Uploads as `(node id, local path, remote path)` triples.
    #[must_use]
    pub fn uploads(&self) -> Vec<(String, String, String)> {
        lock(&self.state).uploads.clone()
    }

    /// Node ids whose sessions were closed, in call order.
    #[must_use]
    pub fn closed(&self) -> Vec<String> {
        lock(&self.state).closed.clone()
    }
}

impl Transport for ScriptedTransport {
    fn open<'a>(&'a self, node: &'a Node) -> TransportFuture<'a, Session> {
        Box::pin(async move {
            let host = node.address.ok_or_else(|| TransportError::MissingAddress {
                node_id: node.id.clone(),
            })?;
            let delay = {
                let mut state = lock(&self.state);
                let attempt = {
                    let counter = state.attempts.entry(node.id.clone()).or_insert(0);
                    *counter += 1;
                    *counter
                };
                let failures = state
                    .failures_before_connect
                    .get(&node.id)
                    .copied()
                    .unwrap_or(0);
                if attempt <= failures {
                    return Err(TransportError::Unreachable {
                        host: host.to_string(),
                        message: String::from("connection refused"),
                    });
                }
                state.connect_delays.get(&node.id).copied()
            };
            if let Some(wait) = delay {
                tokio::time::sleep(wait).await;
            }
            Ok(Session::new(node.id.clone(), host))
        })
    }

    fn exec<'a>(
        &'a self,
        session: &'a Session,
        command: &'a str,
        pty: bool,
    ) -> TransportFuture<'a, ExecutionOutcome> {
        Box::pin(async move {
            let (hang, result) = {
                let mut state = lock(&self.state);
                state
                    .executions
                    .push((session.node_id.clone(), command.to_owned(), pty));
                let hang = state.hang_on_exec.contains(&session.node_id);
                let result = if state.disconnect_on_exec.contains(&session.node_id) {
                    Err(TransportError::Disconnected {
                        host: session.host.to_string(),
                        message: String::from("broken pipe"),
                    })
                } else {
                    Ok(state
                        .outcomes
                        .get(&session.node_id)
                        .cloned()
                        .unwrap_or_default())
                };
                (hang, result)
            };
            if hang {
                std::future::pending::<()>().await;
            }
            result
        })
    }

    fn upload<'a>(
        &'a self,
        session: &'a Session,
        local: &'a Utf8Path,
        remote: &'a str,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.fail_upload.contains(&session.node_id) {
                return Err(TransportError::CommandFailure {
                    program: String::from("scp"),
                    status: Some(1),
                    status_text: String::from("1"),
                    stderr: String::from("permission denied"),
                });
            }
            state.uploads.push((
                session.node_id.clone(),
                local.to_string(),
                remote.to_owned(),
            ));
            Ok(())
        })
    }

    fn close(&self, session: Session) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.state).closed.push(session.node_id);
            Ok(())
        })
    }
}

/// Command double that records every outcome set it aggregates.
#[derive(Clone, Debug, Default)]
pub struct RecordingCommand {
    command: String,
    aggregated: Arc<Mutex<Vec<Vec<NodeOutcome>>>>,
}

impl RecordingCommand {
    /// Creates a command that dispatches `command` verbatim.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            aggregated: Arc::default(),
        }
    }

    /// Outcome sets passed to `aggregate`, one per call.
    #[must_use]
    pub fn aggregated(&self) -> Vec<Vec<NodeOutcome>> {
        lock(&self.aggregated).clone()
    }
}

impl Command for RecordingCommand {
    fn name(&self) -> &str {
        "recording"
    }

    fn command_string(&self) -> String {
        self.command.clone()
    }

    fn aggregate(&self, outcomes: Vec<NodeOutcome>) -> Result<Report, AggregateError> {
        lock(&self.aggregated).push(outcomes.clone());
        Ok(Report::from_outcomes(&self.command, outcomes))
    }
}

fn json_tagged_resources(items: &[(&str, &str, &[&str])]) -> String {
    items
        .iter()
        .map(|(id, zone, tags)| {
            let tags_json = tags
                .iter()
                .map(|tag| format!("\"{tag}\""))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{\"id\":\"{id}\",\"zone\":\"{zone}\",\"tags\":[{tags_json}]}}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Produces a JSON array matching `scw instance server list -o json`.
#[must_use]
pub fn json_servers(servers: &[(&str, &str, &[&str])]) -> String {
    format!("[{}]", json_tagged_resources(servers))
}
