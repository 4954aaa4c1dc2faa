//! Backend abstraction for provisioning fleets of disposable compute nodes.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

/// Parameters required to create a fleet of identical nodes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FleetRequest {
    /// Human readable label used for the boot image. The backend resolves this
    /// to a provider specific image identifier.
    pub image_label: String,
    /// CPU architecture requested for every node.
    pub architecture: String,
    /// Number of nodes to create in a single batch.
    pub count: usize,
    /// Commercial type or flavour to request (for example `DEV1-S`).
    pub instance_type: String,
    /// Target availability zone (for example `fr-par-1`).
    pub zone: String,
    /// Project identifier used for billing and ownership.
    pub project_id: String,
    /// Optional organisation identifier when the provider requires one.
    pub organisation_id: Option<String>,
    /// Optional security group applied to every node.
    pub security_group: Option<String>,
    /// Naming tag applied to every node for identification and cleanup.
    pub name: String,
}

impl FleetRequest {
    /// Starts a builder for a [`FleetRequest`].
    #[must_use]
    pub fn builder() -> FleetRequestBuilder {
        FleetRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required string field is
    /// empty or the node count is zero.
    pub fn validate(&self) -> Result<(), BackendError> {
        let required = [
            ("image_label", &self.image_label),
            ("architecture", &self.architecture),
            ("instance_type", &self.instance_type),
            ("zone", &self.zone),
            ("project_id", &self.project_id),
            ("name", &self.name),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(BackendError::Validation(field.to_owned()));
            }
        }
        if self.count == 0 {
            return Err(BackendError::Validation(String::from("count")));
        }
        if self
            .security_group
            .as_deref()
            .is_some_and(|group| group.trim().is_empty())
        {
            return Err(BackendError::Validation(String::from("security_group")));
        }
        Ok(())
    }

    /// Returns the tag carried by every node of this fleet.
    #[must_use]
    pub fn fleet_tag(&self) -> String {
        fleet_tag(&self.name)
    }
}

/// Prefix of the tag that marks a node as belonging to a named fleet.
pub const FLEET_TAG_PREFIX: &str = "employ-fleet-";

/// Builds the fleet tag for `name`.
#[must_use]
pub fn fleet_tag(name: &str) -> String {
    format!("{FLEET_TAG_PREFIX}{name}")
}

/// Builder for [`FleetRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FleetRequestBuilder {
    image_label: String,
    architecture: String,
    count: usize,
    instance_type: String,
    zone: String,
    project_id: String,
    organisation_id: Option<String>,
    security_group: Option<String>,
    name: String,
}

impl Default for FleetRequestBuilder {
    fn default() -> Self {
        Self {
            image_label: String::new(),
            architecture: String::new(),
            count: 1,
            instance_type: String::new(),
            zone: String::new(),
            project_id: String::new(),
            organisation_id: None,
            security_group: None,
            name: String::new(),
        }
    }
}

impl FleetRequestBuilder {
    /// Creates a builder for a single-node fleet; string fields must be
    /// populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image label.
    #[must_use]
    pub fn image_label(mut self, value: impl Into<String>) -> Self {
        self.image_label = value.into();
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn architecture(mut self, value: impl Into<String>) -> Self {
        self.architecture = value.into();
        self
    }

    /// Sets the number of nodes.
    #[must_use]
    pub const fn count(mut self, value: usize) -> Self {
        self.count = value;
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.project_id = value.into();
        self
    }

    /// Sets the optional organisation identifier.
    #[must_use]
    pub fn organisation_id(mut self, value: Option<String>) -> Self {
        self.organisation_id = value;
        self
    }

    /// Sets the optional security group.
    #[must_use]
    pub fn security_group(mut self, value: Option<String>) -> Self {
        self.security_group = value;
        self
    }

    /// Sets the fleet naming tag.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Builds and validates the [`FleetRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty
    /// or the count is zero.
    pub fn build(self) -> Result<FleetRequest, BackendError> {
        let request = FleetRequest {
            image_label: self.image_label.trim().to_owned(),
            architecture: self.architecture.trim().to_owned(),
            count: self.count,
            instance_type: self.instance_type.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
            project_id: self.project_id.trim().to_owned(),
            organisation_id: self.organisation_id.map(|value| value.trim().to_owned()),
            security_group: self.security_group.map(|value| value.trim().to_owned()),
            name: self.name.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Lifecycle state of a node as reported by its backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Created but not yet running.
    Pending,
    /// Booted and running.
    Running,
    /// Destroyed or no longer known to the provider.
    Terminated,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// One compute instance owned by a fleet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// Provider specific identifier.
    pub id: String,
    /// Zone in which the node was created.
    pub zone: String,
    /// Public address, once the provider has assigned one.
    pub address: Option<IpAddr>,
    /// Last observed lifecycle state.
    pub state: NodeState,
}

impl Node {
    /// Creates a pending node with no address.
    #[must_use]
    pub fn pending(id: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            zone: zone.into(),
            address: None,
            state: NodeState::Pending,
        }
    }

    /// Returns `true` once the node is running and reachable by address.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, NodeState::Running) && self.address.is_some()
    }
}

/// Errors raised by backends.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud backends.
pub trait Backend: Send + Sync {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates `request.count` nodes in one batch.
    ///
    /// Either every node is created or none are: implementations that cannot
    /// create atomically must remove any partially created nodes before
    /// returning an error.
    fn create_batch<'a>(
        &'a self,
        request: &'a FleetRequest,
    ) -> BackendFuture<'a, Vec<Node>, Self::Error>;

    /// Labels every node with the fleet naming tag.
    fn tag<'a>(&'a self, nodes: &'a [Node], name: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Fetches the current state of every node, in input order. Nodes the
    /// provider no longer knows are reported as [`NodeState::Terminated`].
    fn refresh<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, Vec<Node>, Self::Error>;

    /// Destroys every node and ensures no provider resources remain.
    fn destroy<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, (), Self::Error>;
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(NodeState::Pending, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), false)]
    #[case(NodeState::Running, None, false)]
    #[case(NodeState::Running, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), true)]
    #[case(NodeState::Terminated, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), false)]
    fn node_readiness_requires_running_state_and_address(
        #[case] state: NodeState,
        #[case] address: Option<IpAddr>,
        #[case] expected: bool,
    ) {
        let node = Node {
            address,
            state,
            ..Node::pending("id", "zone")
        };
        assert_eq!(node.is_ready(), expected);
    }

    #[test]
    fn fleet_tag_uses_prefix() {
        assert_eq!(fleet_tag("bench"), "employ-fleet-bench");
    }
}
