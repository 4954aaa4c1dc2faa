//! State lookups and teardown for the Scaleway backend.

use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::backend::{Node, NodeState};
use crate::scaleway::types::{Action, InstanceId, Zone};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::InstanceSnapshot;

impl ScalewayBackend {
    pub(in crate::scaleway) async fn fetch_instance(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<Option<InstanceSnapshot>, ScalewayBackendError> {
        let mut servers = self
            .api
            .list_instances(zone.as_str())
            .servers(id.as_str())
            .per_page(1)
            .run_async()
            .await?;
        Ok(servers.pop().map(InstanceSnapshot::from_server))
    }

    pub(in crate::scaleway) async fn refresh_node(
        &self,
        node: &Node,
    ) -> Result<Node, ScalewayBackendError> {
        let zone = Zone::from(node.zone.as_str());
        let id = InstanceId::from(node.id.as_str());
        let snapshot = self.fetch_instance(&zone, &id).await?;
        Ok(snapshot.map_or_else(
            || Node {
                state: NodeState::Terminated,
                ..node.clone()
            },
            |found| found.to_node(&node.zone),
        ))
    }

    /// Terminates the server when the API allows it (removing its volumes
    /// and IP), otherwise deletes it, then waits until it is gone.
    pub(in crate::scaleway) async fn remove_instance(
        &self,
        zone: &Zone,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if snapshot.allows(Action::TERMINATE) {
            self.api
                .perform_instance_action_async(
                    zone.as_str(),
                    snapshot.id.as_str(),
                    Action::TERMINATE,
                )
                .await?;
        } else {
            self.api
                .delete_instance_async(zone.as_str(), snapshot.id.as_str())
                .await?;
        }
        self.wait_until_gone(zone, &snapshot.id).await
    }

    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if self.fetch_instance(zone, id).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
        Err(ScalewayBackendError::ResidualResource {
            instance_id: id.as_str().to_owned(),
        })
    }

    async fn destroy_node(&self, node: &Node) -> Result<(), ScalewayBackendError> {
        let zone = Zone::from(node.zone.as_str());
        let id = InstanceId::from(node.id.as_str());
        match self.fetch_instance(&zone, &id).await? {
            Some(snapshot) => self.remove_instance(&zone, &snapshot).await,
            None => Ok(()),
        }
    }

    /// Destroys every node, continuing past individual failures.
    pub(in crate::scaleway) async fn destroy_nodes(
        &self,
        nodes: &[Node],
    ) -> Result<(), ScalewayBackendError> {
        let mut remaining = Vec::new();
        let mut first_failure: Option<ScalewayBackendError> = None;
        for node in nodes {
            if let Err(err) = self.destroy_node(node).await {
                warn!(id = %node.id, error = %err, "failed to destroy server");
                remaining.push(node.id.clone());
                first_failure.get_or_insert(err);
            }
        }
        if let Some(err) = first_failure {
            return Err(ScalewayBackendError::TeardownIncomplete {
                instance_ids: remaining.join(", "),
                message: err.to_string(),
            });
        }
        info!(count = nodes.len(), "servers destroyed");
        Ok(())
    }
}
