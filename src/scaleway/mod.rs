//! Scaleway implementation of the fleet [`Backend`].

mod error;
mod lifecycle;
mod types;

use std::time::Duration;

use crate::backend::{Backend, BackendFuture, FleetRequest, Node};
use crate::config::ScalewayConfig;
use scaleway_rs::ScalewayApi;

pub use error::ScalewayBackendError;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Zones accepted by the Instances API.
pub const SCALEWAY_ZONES: &[&str] = &[
    "fr-par-1", "fr-par-2", "fr-par-3", "nl-ams-1", "nl-ams-2", "nl-ams-3", "pl-waw-1",
    "pl-waw-2", "pl-waw-3",
];

/// Backend that provisions servers through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    config: ScalewayConfig,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl ScalewayBackend {
    fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        request: &FleetRequest,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == request.instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayBackendError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        })
    }
}

impl Backend for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create_batch<'a>(
        &'a self,
        request: &'a FleetRequest,
    ) -> BackendFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            if !SCALEWAY_ZONES.contains(&request.zone.as_str()) {
                return Err(ScalewayBackendError::Validation(format!(
                    "unknown zone {}",
                    request.zone
                )));
            }
            self.create_fleet(request).await
        })
    }

    fn tag<'a>(&'a self, nodes: &'a [Node], name: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.tag_fleet(nodes, name))
    }

    fn refresh<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let mut refreshed = Vec::with_capacity(nodes.len());
            for node in nodes {
                refreshed.push(self.refresh_node(node).await?);
            }
            Ok(refreshed)
        })
    }

    fn destroy<'a>(&'a self, nodes: &'a [Node]) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.destroy_nodes(nodes))
    }
}
