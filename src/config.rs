//! Configuration loading via `ortho-config`.
//!
//! Two sections are loaded here: `[scaleway]` (`SCW_*`) with provider
//! credentials and placement defaults, and `[fleet]` (`EMPLOY_FLEET_*`) with
//! fleet size, naming and timing. SSH settings live in
//! [`crate::ssh::SshConfig`].

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::FleetRequest;
use crate::fleet::{DispatchOptions, ReadinessPolicy, RetryPolicy};
use crate::manager::FleetSettings;

/// Scaleway specific configuration derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "employ",
        env_var = "EMPLOY_CONFIG_PATH",
        config_file_name = "employ.toml",
        dotfile_name = ".employ.toml",
        project_file_name = "employ.toml"
    )
)]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Not needed for API
    /// calls; accepted so a shared `scw` profile loads cleanly.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: String,
    /// Preferred availability zone. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Commercial type for new instances. Defaults to `DEV1-S`.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Human-friendly image label (for example `Ubuntu 24.04 Noble Numbat`).
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Fleet shape and timing loaded from `[fleet]` / `EMPLOY_FLEET_*`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EMPLOY_FLEET",
    discovery(
        app_name = "employ",
        env_var = "EMPLOY_CONFIG_PATH",
        config_file_name = "employ.toml",
        dotfile_name = ".employ.toml",
        project_file_name = "employ.toml"
    )
)]
pub struct FleetConfig {
    /// Number of nodes to provision.
    #[ortho_config(default = 1)]
    pub count: usize,
    /// Naming tag applied to every node.
    #[ortho_config(default = "employed".to_owned())]
    pub name: String,
    /// Seconds between two readiness polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound on the readiness wait; unset waits indefinitely.
    pub ready_timeout_secs: Option<u64>,
    /// Connection attempts per node before the run fails.
    #[ortho_config(default = 10)]
    pub max_connect_attempts: u32,
    /// Seconds to wait before the first connection attempt and between
    /// failed attempts.
    #[ortho_config(default = 5)]
    pub connect_backoff_secs: u64,
    /// Upper bound on each node's command; unset waits indefinitely.
    pub command_timeout_secs: Option<u64>,
    /// Requests a pseudo-terminal for remote commands.
    #[ortho_config(default = false)]
    pub request_pty: bool,
    /// Security group applied to every node.
    pub security_group: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in employ.toml",
            self.description, self.env_var, self.toml_key, self.section
        ))
    }

    fn invalid(&self, requirement: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {requirement}: check {} or {} in [{}] of employ.toml",
            self.description, self.env_var, self.toml_key, self.section
        ))
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(metadata.missing());
    }
    Ok(())
}

fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(metadata.invalid("must be at least 1"));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("employ")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds a [`FleetRequest`] from the provider defaults and the fleet
    /// shape.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either section fails validation.
    pub fn as_request(&self, fleet: &FleetConfig) -> Result<FleetRequest, ConfigError> {
        self.validate()?;
        fleet.validate()?;
        FleetRequest::builder()
            .image_label(&self.default_image)
            .architecture(&self.default_architecture)
            .count(fleet.count)
            .instance_type(&self.default_instance_type)
            .zone(&self.default_zone)
            .project_id(&self.default_project_id)
            .organisation_id(self.default_organization_id.clone())
            .security_group(fleet.security_group.clone())
            .name(&fleet.name)
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_image,
            &FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image", "scaleway"),
        )?;
        require_field(
            &self.default_instance_type,
            &FieldMetadata::new(
                "instance type",
                "SCW_DEFAULT_INSTANCE_TYPE",
                "default_instance_type",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new(
                "availability zone",
                "SCW_DEFAULT_ZONE",
                "default_zone",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_architecture,
            &FieldMetadata::new(
                "CPU architecture",
                "SCW_DEFAULT_ARCHITECTURE",
                "default_architecture",
                "scaleway",
            ),
        )
    }
}

impl FleetConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("employ")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks counts and intervals.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            u64::try_from(self.count).unwrap_or(u64::MAX),
            &FieldMetadata::new("node count", "EMPLOY_FLEET_COUNT", "count", "fleet"),
        )?;
        require_field(
            &self.name,
            &FieldMetadata::new("fleet name", "EMPLOY_FLEET_NAME", "name", "fleet"),
        )?;
        require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "EMPLOY_FLEET_POLL_INTERVAL_SECS",
                "poll_interval_secs",
                "fleet",
            ),
        )?;
        require_positive(
            u64::from(self.max_connect_attempts),
            &FieldMetadata::new(
                "connection attempt budget",
                "EMPLOY_FLEET_MAX_CONNECT_ATTEMPTS",
                "max_connect_attempts",
                "fleet",
            ),
        )?;
        if let Some(timeout) = self.ready_timeout_secs {
            require_positive(
                timeout,
                &FieldMetadata::new(
                    "ready timeout",
                    "EMPLOY_FLEET_READY_TIMEOUT_SECS",
                    "ready_timeout_secs",
                    "fleet",
                ),
            )?;
        }
        if let Some(timeout) = self.command_timeout_secs {
            require_positive(
                timeout,
                &FieldMetadata::new(
                    "command timeout",
                    "EMPLOY_FLEET_COMMAND_TIMEOUT_SECS",
                    "command_timeout_secs",
                    "fleet",
                ),
            )?;
        }
        if let Some(group) = &self.security_group {
            require_field(
                group,
                &FieldMetadata::new(
                    "security group",
                    "EMPLOY_FLEET_SECURITY_GROUP",
                    "security_group",
                    "fleet",
                ),
            )?;
        }
        Ok(())
    }

    /// Timing settings for a [`crate::manager::FleetManager`].
    #[must_use]
    pub fn settings(&self) -> FleetSettings {
        FleetSettings {
            readiness: ReadinessPolicy {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                ready_timeout: self.ready_timeout_secs.map(Duration::from_secs),
            },
            retry: RetryPolicy {
                max_attempts: self.max_connect_attempts,
                backoff: Duration::from_secs(self.connect_backoff_secs),
            },
            dispatch: DispatchOptions {
                pty: self.request_pty,
                timeout: self.command_timeout_secs.map(Duration::from_secs),
            },
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
