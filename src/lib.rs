//! Core library for the employ fleet execution tool.
//!
//! A run provisions a batch of short-lived cloud nodes, opens one SSH
//! session per node, fans a single command out to every node, validates the
//! outcomes and hands them to the command's aggregator, then tears the fleet
//! down. The [`backend::Backend`] and [`ssh::Transport`] traits are the
//! seams; [`scaleway::ScalewayBackend`] and [`ssh::SshTransport`] are the
//! shipped implementations.

pub mod backend;
pub mod command;
pub mod config;
pub mod fleet;
pub mod janitor;
pub mod manager;
pub mod outcome;
pub mod registry;
pub mod run;
pub mod scaleway;
pub mod ssh;
pub mod test_support;

pub use backend::{Backend, FleetRequest, FleetRequestBuilder, Node, NodeState};
pub use command::{Command, Report};
pub use config::{FleetConfig, ScalewayConfig};
pub use fleet::{ExecutionError, FleetError};
pub use janitor::{Janitor, JanitorConfig, JanitorError, SweepSummary};
pub use manager::{FleetManager, FleetSettings, Manager};
pub use outcome::{ExecutionOutcome, NodeOutcome};
pub use registry::{Registry, RegistryError};
pub use run::{RunError, RunOrchestrator};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use ssh::{SshConfig, SshTransport, Transport};
