//! SSH session configuration structures and validation.
//!
//! [`SshConfig`] carries everything needed to open and multiplex sessions
//! with the system OpenSSH client. Configuration is loaded via `ortho-config`
//! which merges defaults, configuration files, and environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default directory that holds per-node `ControlMaster` sockets.
pub const DEFAULT_CONTROL_DIR: &str = "/tmp";

/// Default SSH port used when connecting to nodes.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// SSH client settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EMPLOY_SSH",
    discovery(
        app_name = "employ",
        env_var = "EMPLOY_CONFIG_PATH",
        config_file_name = "employ.toml",
        dotfile_name = ".employ.toml",
        project_file_name = "employ.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable used for setup-script uploads.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// TCP port of the remote SSH daemon.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; defaults to disabling to smooth
    /// ephemeral hosts.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null` for ephemeral hosts.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Path to the SSH private key file for remote authentication. Supports
    /// tilde expansion (`~/.ssh/id_ed25519`). Optional; when not provided, SSH
    /// falls back to default key locations. Validation rejects empty or
    /// whitespace-only values.
    pub ssh_identity_file: Option<String>,
    /// Directory in which per-node control sockets are created.
    #[ortho_config(default = DEFAULT_CONTROL_DIR.to_owned())]
    pub control_dir: String,
    /// Seconds a single connection attempt may take before SSH gives up.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
}

/// Errors raised when loading the SSH configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SshConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

/// Raised when the SSH configuration is missing a required value.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("missing {field}: set EMPLOY_SSH_{env_suffix} or add {field} to [ssh] in employ.toml", env_suffix = field.to_uppercase())]
pub struct InvalidSshConfig {
    /// Configuration field that failed validation.
    pub field: String,
}

impl SshConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSshConfig`] naming the first empty field.
    pub fn validate(&self) -> Result<(), InvalidSshConfig> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        Self::require_value(&self.control_dir, "control_dir")?;
        if self.ssh_port == 0 {
            return Err(InvalidSshConfig {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("employ")])
            .map_err(|err| SshConfigLoadError::Parse(err.to_string()))
    }

    /// Connection timeout applied to each connection attempt.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), InvalidSshConfig> {
        match value {
            None => Ok(()), // Not configured; SSH uses defaults
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(InvalidSshConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), InvalidSshConfig> {
        Self::require_optional_value(Some(value), field)
    }
}
