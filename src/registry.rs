//! Explicit registry of commands and managers.
//!
//! Nothing registers itself: [`Registry::with_builtins`] lists the built-in
//! plugins and callers pass the registry to whatever needs a lookup.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::command::{ApacheBenchCommand, Command, CommandArgsError, ShellCommand};
use crate::config::{FleetConfig, ScalewayConfig};
use crate::manager::{FleetManager, Manager};
use crate::scaleway::ScalewayBackend;
use crate::ssh::{SshConfig, SshTransport};

/// Builds a command from its positional arguments.
pub type CommandFactory = fn(&[String]) -> Result<Box<dyn Command>, CommandArgsError>;

/// Builds a manager from loaded settings.
pub type ManagerFactory = fn(ManagerSettings) -> Result<Box<dyn Manager>, RegistryError>;

/// Name of the manager used when none is requested.
pub const DEFAULT_MANAGER: &str = "scaleway";

/// Settings handed to a [`ManagerFactory`].
#[derive(Clone, Debug)]
pub struct ManagerSettings {
    /// Provider credentials and placement.
    pub scaleway: ScalewayConfig,
    /// Fleet shape and timing.
    pub fleet: FleetConfig,
    /// SSH client settings.
    pub ssh: SshConfig,
}

/// Errors raised while resolving plugins.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No command is registered under the name.
    #[error("unknown command '{0}' (see `employ commands`)")]
    UnknownCommand(String),
    /// No manager is registered under the name.
    #[error("unknown manager '{0}' (see `employ managers`)")]
    UnknownManager(String),
    /// The command rejected its arguments.
    #[error(transparent)]
    InvalidArguments(#[from] CommandArgsError),
    /// The manager could not be built from the settings.
    #[error("failed to build manager '{name}': {message}")]
    Manager {
        /// Manager name.
        name: String,
        /// Reason reported by the factory.
        message: String,
    },
}

#[derive(Clone, Copy)]
struct Entry<F> {
    factory: F,
    description: &'static str,
}

/// Name → factory maps for commands and managers.
#[derive(Default)]
pub struct Registry {
    commands: BTreeMap<String, Entry<CommandFactory>>,
    managers: BTreeMap<String, Entry<ManagerFactory>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the `shell` and `ab` commands and the
    /// `scaleway` manager.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_command(
            ShellCommand::NAME,
            "run a shell command verbatim and list each node's output",
            |args| Ok(Box::new(ShellCommand::from_args(args)?)),
        );
        registry.register_command(
            ApacheBenchCommand::NAME,
            "ab <target> <requests> [<concurrency> [<extra_args>...]]",
            |args| Ok(Box::new(ApacheBenchCommand::from_args(args)?)),
        );
        registry.register_manager(
            DEFAULT_MANAGER,
            "Scaleway instances reached over OpenSSH",
            scaleway_manager,
        );
        registry
    }

    /// Registers or replaces a command factory.
    pub fn register_command(
        &mut self,
        name: &str,
        description: &'static str,
        factory: CommandFactory,
    ) {
        self.commands.insert(
            name.to_owned(),
            Entry {
                factory,
                description,
            },
        );
    }

    /// Registers or replaces a manager factory.
    pub fn register_manager(
        &mut self,
        name: &str,
        description: &'static str,
        factory: ManagerFactory,
    ) {
        self.managers.insert(
            name.to_owned(),
            Entry {
                factory,
                description,
            },
        );
    }

    /// Builds the command `name` from `args`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCommand`] for unregistered names and
    /// [`RegistryError::InvalidArguments`] when the command rejects `args`.
    pub fn command(&self, name: &str, args: &[String]) -> Result<Box<dyn Command>, RegistryError> {
        let entry = self
            .commands
            .get(name)
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_owned()))?;
        Ok((entry.factory)(args)?)
    }

    /// Builds the manager `name` from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownManager`] for unregistered names and
    /// [`RegistryError::Manager`] when the factory fails.
    pub fn manager(
        &self,
        name: &str,
        settings: ManagerSettings,
    ) -> Result<Box<dyn Manager>, RegistryError> {
        let entry = self
            .managers
            .get(name)
            .ok_or_else(|| RegistryError::UnknownManager(name.to_owned()))?;
        (entry.factory)(settings)
    }

    /// Returns `true` when a manager is registered under `name`.
    #[must_use]
    pub fn has_manager(&self, name: &str) -> bool {
        self.managers.contains_key(name)
    }

    /// Registered commands with their descriptions, sorted by name.
    #[must_use]
    pub fn commands(&self) -> Vec<(&str, &'static str)> {
        self.commands
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.description))
            .collect()
    }

    /// Registered managers with their descriptions, sorted by name.
    #[must_use]
    pub fn managers(&self) -> Vec<(&str, &'static str)> {
        self.managers
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.description))
            .collect()
    }
}

fn scaleway_manager(settings: ManagerSettings) -> Result<Box<dyn Manager>, RegistryError> {
    let failure = |message: String| RegistryError::Manager {
        name: DEFAULT_MANAGER.to_owned(),
        message,
    };
    let request = settings
        .scaleway
        .as_request(&settings.fleet)
        .map_err(|err| failure(err.to_string()))?;
    let backend = ScalewayBackend::new(settings.scaleway).map_err(|err| failure(err.to_string()))?;
    let transport =
        SshTransport::with_process_runner(settings.ssh).map_err(|err| failure(err.to_string()))?;
    Ok(Box::new(FleetManager::new(
        DEFAULT_MANAGER,
        backend,
        transport,
        request,
        settings.fleet.settings(),
    )))
}
