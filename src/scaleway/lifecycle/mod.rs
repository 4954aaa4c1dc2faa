//! Server lifecycle helpers for the Scaleway backend.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{Node, NodeState};
use crate::scaleway::types::{Action, InstanceId, InstanceState};

use super::{ScalewayBackend, ScalewayBackendError};

mod create;
mod image;
mod tag;
mod wait;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Subset of a server record the lifecycle code works with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    pub(crate) id: InstanceId,
    pub(crate) state: InstanceState,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<String>,
}

impl InstanceSnapshot {
    fn from_server(server: scaleway_rs::ScalewayInstance) -> Self {
        Self {
            id: server.id.into(),
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server.public_ip.map(|ip| ip.address),
        }
    }

    fn allows(&self, action: &str) -> bool {
        self.allowed_actions.iter().any(|allowed| allowed.is(action))
    }

    /// Maps the provider view onto a [`Node`]. Only `running` counts as
    /// running; every transitional state stays pending.
    pub(crate) fn to_node(&self, zone: &str) -> Node {
        let state = if self.state.is_running() {
            NodeState::Running
        } else {
            NodeState::Pending
        };
        Node {
            id: self.id.as_str().to_owned(),
            zone: zone.to_owned(),
            address: self
                .public_ip
                .as_deref()
                .and_then(|ip| IpAddr::from_str(ip).ok()),
            state,
        }
    }
}

/// Status and raw body of an Instances API call made through reqwest.
struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    fn parse<T: DeserializeOwned>(&self) -> Result<T, ScalewayBackendError> {
        serde_json::from_slice(&self.body).map_err(|err| ScalewayBackendError::Provider {
            message: err.to_string(),
        })
    }

    fn api_error(&self) -> Option<scaleway_rs::ScalewayApiError> {
        serde_json::from_slice(&self.body).ok()
    }

    fn into_provider_error(self) -> ScalewayBackendError {
        ScalewayBackendError::Provider {
            message: format!(
                "{}: {}",
                self.status,
                String::from_utf8_lossy(&self.body).trim()
            ),
        }
    }
}

impl ScalewayBackend {
    async fn send_json<P: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        payload: &P,
    ) -> Result<ApiResponse, ScalewayBackendError> {
        let url = format!("{SCALEWAY_INSTANCE_API_BASE}{path}");
        let response = HTTP_CLIENT
            .request(method, &url)
            .header("X-Auth-Token", &self.config.secret_key)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests;
