//! Batch creation and readiness polling.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::FleetError;
use crate::backend::{Backend, FleetRequest, Node, NodeState};

/// How readiness is polled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPolicy {
    /// Pause between two state polls.
    pub poll_interval: Duration,
    /// Upper bound on the whole wait; `None` waits indefinitely.
    pub ready_timeout: Option<Duration>,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            ready_timeout: None,
        }
    }
}

/// Requests `request.count` nodes in a single backend call.
///
/// A batch that comes back with any other number of nodes is rolled back
/// and reported as a provisioning failure, so the caller never owns a
/// partial fleet.
///
/// # Errors
///
/// Returns [`FleetError::Provisioning`] when the backend rejects the batch
/// or returns the wrong number of nodes.
pub async fn request_batch<B: Backend>(
    backend: &B,
    request: &FleetRequest,
) -> Result<Vec<Node>, FleetError> {
    info!(count = request.count, zone = %request.zone, name = %request.name, "requesting node batch");
    let nodes = backend
        .create_batch(request)
        .await
        .map_err(|err| FleetError::Provisioning {
            message: format!("backend rejected a batch of {} nodes", request.count),
            source: Some(Box::new(err)),
        })?;

    if nodes.len() == request.count {
        return Ok(nodes);
    }

    warn!(
        requested = request.count,
        returned = nodes.len(),
        "backend returned a partial batch; rolling back"
    );
    if !nodes.is_empty()
        && let Err(err) = backend.destroy(&nodes).await
    {
        warn!(error = %err, "failed to roll back partial batch");
    }
    Err(FleetError::provisioning(format!(
        "backend returned {} of {} requested nodes",
        nodes.len(),
        request.count
    )))
}

/// Polls the backend until every node is running with an address.
///
/// Returns the refreshed nodes in input order.
///
/// # Errors
///
/// Returns [`FleetError::NotReady`] when a node terminates while waiting,
/// the backend cannot be polled, or `ready_timeout` elapses.
pub async fn wait_until_running<B: Backend>(
    backend: &B,
    nodes: &[Node],
    policy: ReadinessPolicy,
) -> Result<Vec<Node>, FleetError> {
    let polling = poll_until_ready(backend, nodes, policy.poll_interval);
    match policy.ready_timeout {
        None => polling.await,
        Some(limit) => tokio::time::timeout(limit, polling).await.map_err(|_| {
            FleetError::not_ready(format!(
                "nodes were not running after {}s",
                limit.as_secs()
            ))
        })?,
    }
}

async fn poll_until_ready<B: Backend>(
    backend: &B,
    nodes: &[Node],
    interval: Duration,
) -> Result<Vec<Node>, FleetError> {
    let mut current = nodes.to_vec();
    loop {
        current = backend
            .refresh(&current)
            .await
            .map_err(|err| FleetError::NotReady {
                message: String::from("failed to refresh node state"),
                source: Some(Box::new(err)),
            })?;

        if current.len() != nodes.len() {
            return Err(FleetError::not_ready(format!(
                "backend reported {} of {} nodes",
                current.len(),
                nodes.len()
            )));
        }
        if let Some(node) = current
            .iter()
            .find(|node| node.state == NodeState::Terminated)
        {
            return Err(FleetError::not_ready(format!(
                "node {} terminated while waiting for it to run",
                node.id
            )));
        }

        let pending = current.iter().filter(|node| !node.is_ready()).count();
        if pending == 0 {
            info!(count = current.len(), "all nodes running");
            return Ok(current);
        }
        debug!(pending, "waiting for nodes to run");
        tokio::time::sleep(interval).await;
    }
}
