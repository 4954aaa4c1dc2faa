//! Multiplexed SSH sessions driven through the system OpenSSH client.
//!
//! Each node gets one `ControlMaster` connection; commands and file copies
//! then reuse that authenticated channel through its control socket, and
//! closing the session tears the master down.

use std::ffi::OsString;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::backend::Node;
use crate::outcome::ExecutionOutcome;

mod config;
mod transport;
mod types;
mod util;

pub use config::{
    DEFAULT_CONTROL_DIR, DEFAULT_SSH_PORT, InvalidSshConfig, SshConfig, SshConfigLoadError,
};
pub use transport::{Session, Transport, TransportError, TransportFuture};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};
pub use util::expand_tilde;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// [`Transport`] backed by `ssh` and `scp`.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSshConfig`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, InvalidSshConfig> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a new transport using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSshConfig`] when configuration validation fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, InvalidSshConfig> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Control socket used for the session bound to `node_id`.
    #[must_use]
    pub fn control_path(&self, node_id: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(&self.config.control_dir))
            .join(format!("employ-{node_id}.sock"))
    }

    fn destination(&self, host: IpAddr) -> String {
        format!("{}@{host}", self.config.ssh_user)
    }

    fn scp_destination(&self, host: IpAddr, remote: &str) -> String {
        match host {
            IpAddr::V4(_) => format!("{}@{host}:{remote}", self.config.ssh_user),
            IpAddr::V6(_) => format!("{}@[{host}]:{remote}", self.config.ssh_user),
        }
    }

    pub(crate) fn master_args(&self, host: IpAddr, control_path: &Utf8Path) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_ssh_options());
        args.extend([
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout().as_secs()
            )),
            OsString::from("-o"),
            OsString::from("ControlMaster=yes"),
            OsString::from("-o"),
            OsString::from("ControlPersist=yes"),
            OsString::from("-S"),
            OsString::from(control_path.as_str()),
            OsString::from("-f"),
            OsString::from("-N"),
            OsString::from(self.destination(host)),
        ]);
        args
    }

    pub(crate) fn exec_args(&self, session: &Session, command: &str, pty: bool) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_ssh_options());
        if let Some(path) = &session.control_path {
            args.push(OsString::from("-S"));
            args.push(OsString::from(path.as_str()));
        }
        if pty {
            args.push(OsString::from("-tt"));
        }
        args.push(OsString::from(self.destination(session.host)));
        args.push(OsString::from(command));
        args
    }

    pub(crate) fn scp_args(&self, session: &Session, local: &Utf8Path, remote: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-q"),
            OsString::from("-P"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_ssh_options());
        if let Some(path) = &session.control_path {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!("ControlPath={path}")));
        }
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(self.scp_destination(session.host, remote)));
        args
    }

    /// Arguments sending the control command `operation` (`check`, `exit`)
    /// to the master behind `control_path`.
    pub(crate) fn control_args(
        &self,
        session: &Session,
        control_path: &Utf8Path,
        operation: &str,
    ) -> Vec<OsString> {
        vec![
            OsString::from("-S"),
            OsString::from(control_path.as_str()),
            OsString::from("-O"),
            OsString::from(operation),
            OsString::from(self.destination(session.host)),
        ]
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = Vec::new();

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            let expanded = expand_tilde(identity_file);
            args.push(OsString::from("-i"));
            args.push(OsString::from(expanded));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                expand_tilde(&self.config.ssh_known_hosts_file)
            )));
        }

        args
    }
}

impl<R> SshTransport<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Runs the client on the blocking pool so many nodes can be driven at
    /// once from async tasks.
    async fn run_blocking(
        &self,
        program: &str,
        args: Vec<OsString>,
    ) -> Result<CommandOutput, TransportError> {
        let runner = self.runner.clone();
        let owned_program = program.to_owned();
        let joined = tokio::task::spawn_blocking(move || runner.run(&owned_program, &args))
            .await
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;
        joined.map_err(|err| TransportError::Spawn {
            program: err.program,
            message: err.message,
        })
    }

    /// Returns `true` when the session's master still answers `-O check`.
    ///
    /// Used to tell a remote command that exited 255 apart from a dropped
    /// connection; sessions without a control socket never qualify.
    async fn master_alive(&self, session: &Session) -> bool {
        let Some(control_path) = &session.control_path else {
            return false;
        };
        let args = self.control_args(session, control_path, "check");
        self.run_blocking(&self.config.ssh_bin, args)
            .await
            .is_ok_and(|output| output.is_success())
    }
}

fn into_outcome(host: IpAddr, output: CommandOutput) -> Result<ExecutionOutcome, TransportError> {
    match output.code {
        Some(SSH_CLIENT_FAILURE) => Err(TransportError::Disconnected {
            host: host.to_string(),
            message: output.stderr_lossy().trim().to_owned(),
        }),
        Some(status) => Ok(ExecutionOutcome {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        None => Err(TransportError::Disconnected {
            host: host.to_string(),
            message: String::from("remote command terminated without an exit status"),
        }),
    }
}

impl<R> Transport for SshTransport<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    fn open<'a>(&'a self, node: &'a Node) -> TransportFuture<'a, Session> {
        Box::pin(async move {
            let host = node.address.ok_or_else(|| TransportError::MissingAddress {
                node_id: node.id.clone(),
            })?;
            let control_path = self.control_path(&node.id);
            let args = self.master_args(host, &control_path);
            let output = self.run_blocking(&self.config.ssh_bin, args).await?;
            if output.is_success() {
                return Ok(Session::new(node.id.clone(), host).with_control_path(control_path));
            }
            Err(TransportError::Unreachable {
                host: host.to_string(),
                message: output.stderr_lossy().trim().to_owned(),
            })
        })
    }

    fn exec<'a>(
        &'a self,
        session: &'a Session,
        command: &'a str,
        pty: bool,
    ) -> TransportFuture<'a, ExecutionOutcome> {
        Box::pin(async move {
            let args = self.exec_args(session, command, pty);
            let output = self.run_blocking(&self.config.ssh_bin, args).await?;
            if output.code == Some(SSH_CLIENT_FAILURE) && self.master_alive(session).await {
                return Ok(ExecutionOutcome {
                    status: SSH_CLIENT_FAILURE,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }
            into_outcome(session.host, output)
        })
    }

    fn upload<'a>(
        &'a self,
        session: &'a Session,
        local: &'a Utf8Path,
        remote: &'a str,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let args = self.scp_args(session, local, remote);
            let output = self.run_blocking(&self.config.scp_bin, args).await?;
            if output.is_success() {
                return Ok(());
            }
            Err(TransportError::CommandFailure {
                program: self.config.scp_bin.clone(),
                status: output.code,
                status_text: output.status_text(),
                stderr: output.stderr_lossy(),
            })
        })
    }

    fn close(&self, session: Session) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let Some(control_path) = session.control_path.clone() else {
                return Ok(());
            };
            let args = self.control_args(&session, &control_path, "exit");
            let output = self.run_blocking(&self.config.ssh_bin, args).await?;
            if output.is_success() {
                return Ok(());
            }
            Err(TransportError::CommandFailure {
                program: self.config.ssh_bin.clone(),
                status: output.code,
                status_text: output.status_text(),
                stderr: output.stderr_lossy(),
            })
        })
    }
}
