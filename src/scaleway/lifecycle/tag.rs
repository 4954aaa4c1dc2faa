//! Fleet tagging for the Scaleway backend.

use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use crate::backend::{Node, fleet_tag};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::create::BASE_TAG;

#[derive(Debug, Serialize)]
pub(in crate::scaleway) struct UpdateServerRequest {
    pub(in crate::scaleway) name: String,
    pub(in crate::scaleway) tags: Vec<String>,
}

impl ScalewayBackend {
    pub(in crate::scaleway) fn tag_payload(name: &str, index: usize) -> UpdateServerRequest {
        UpdateServerRequest {
            name: format!("{name}-{index}"),
            tags: vec![String::from(BASE_TAG), fleet_tag(name)],
        }
    }

    /// Renames every server after the fleet and adds the fleet tag the
    /// janitor sweeps by.
    pub(in crate::scaleway) async fn tag_fleet(
        &self,
        nodes: &[Node],
        name: &str,
    ) -> Result<(), ScalewayBackendError> {
        for (position, node) in nodes.iter().enumerate() {
            let payload = Self::tag_payload(name, position + 1);
            let response = self
                .send_json(
                    Method::PATCH,
                    &format!("/zones/{}/servers/{}", node.zone, node.id),
                    &payload,
                )
                .await?;
            if !response.status.is_success() {
                return Err(response.into_provider_error());
            }
            debug!(id = %node.id, name = %payload.name, "server tagged");
        }
        Ok(())
    }
}
