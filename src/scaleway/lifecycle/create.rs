//! Batch creation for the Scaleway backend.
//!
//! The Instances API creates one server per call, so a batch is a sequence of
//! creations followed by a power-on pass. Any failure part way through removes
//! the servers created so far before the error is returned.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{FleetRequest, Node};
use crate::scaleway::types::{Action, Zone};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

/// Tag carried by every server this tool creates.
pub(in crate::scaleway) const BASE_TAG: &str = "employ";

#[derive(Debug, Serialize)]
pub(in crate::scaleway) struct CreateServerRequest {
    pub(in crate::scaleway) name: String,
    pub(in crate::scaleway) commercial_type: String,
    pub(in crate::scaleway) image: String,
    pub(in crate::scaleway) project: String,
    pub(in crate::scaleway) routed_ip_enabled: bool,
    pub(in crate::scaleway) dynamic_ip_required: bool,
    pub(in crate::scaleway) tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::scaleway) security_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::scaleway) organization: Option<String>,
}

#[derive(Deserialize)]
struct CreateServerResponse {
    server: scaleway_rs::ScalewayInstance,
}

impl ScalewayBackend {
    pub(in crate::scaleway) fn create_payload(
        request: &FleetRequest,
        image_id: &str,
        index: usize,
    ) -> CreateServerRequest {
        CreateServerRequest {
            name: format!("{}-{index}", request.name),
            commercial_type: request.instance_type.clone(),
            image: image_id.to_owned(),
            project: request.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: vec![String::from(BASE_TAG)],
            security_group: request.security_group.clone(),
            organization: request.organisation_id.clone(),
        }
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.state.is_running() {
            return Ok(());
        }
        if !snapshot.allows(Action::POWER_ON) {
            return Err(ScalewayBackendError::PowerOnNotAllowed {
                instance_id: snapshot.id.as_str().to_owned(),
                state: snapshot.state.as_str().to_owned(),
            });
        }
        self.api
            .perform_instance_action_async(zone.as_str(), snapshot.id.as_str(), Action::POWER_ON)
            .await?;
        Ok(())
    }

    async fn create_server(
        &self,
        request: &FleetRequest,
        image_id: &str,
        index: usize,
    ) -> Result<InstanceSnapshot, ScalewayBackendError> {
        let payload = Self::create_payload(request, image_id, index);
        let response = self
            .send_json(
                Method::POST,
                &format!("/zones/{}/servers", request.zone),
                &payload,
            )
            .await?;

        if response.status.is_success() {
            let parsed: CreateServerResponse = response.parse()?;
            return Ok(InstanceSnapshot::from_server(parsed.server));
        }

        if let Some(api_err) = response.api_error()
            && Self::is_instance_type_error(&api_err, request)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                instance_type: request.instance_type.clone(),
                zone: request.zone.clone(),
            });
        }
        Err(response.into_provider_error())
    }

    /// Creates and powers on `request.count` servers, or none at all.
    pub(in crate::scaleway) async fn create_fleet(
        &self,
        request: &FleetRequest,
    ) -> Result<Vec<Node>, ScalewayBackendError> {
        let image_id = self.resolve_image_id(request).await?;
        let zone = Zone::from(request.zone.as_str());
        let mut created: Vec<InstanceSnapshot> = Vec::with_capacity(request.count);

        for index in 1..=request.count {
            match self.create_server(request, &image_id, index).await {
                Ok(snapshot) => {
                    debug!(id = snapshot.id.as_str(), index, "server created");
                    created.push(snapshot);
                }
                Err(err) => {
                    self.roll_back(&zone, &created).await;
                    return Err(err);
                }
            }
        }

        for snapshot in &created {
            if let Err(err) = self.power_on_if_needed(&zone, snapshot).await {
                self.roll_back(&zone, &created).await;
                return Err(err);
            }
        }

        info!(count = created.len(), zone = %request.zone, "batch created");
        Ok(created
            .iter()
            .map(|snapshot| snapshot.to_node(&request.zone))
            .collect())
    }

    async fn roll_back(&self, zone: &Zone, created: &[InstanceSnapshot]) {
        for snapshot in created {
            if let Err(err) = self.remove_instance(zone, snapshot).await {
                warn!(
                    id = snapshot.id.as_str(),
                    error = %err,
                    "failed to remove partially created server"
                );
            }
        }
    }
}
