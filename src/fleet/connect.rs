//! Parallel session establishment with fixed backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::FleetError;
use crate::backend::Node;
use crate::ssh::{Session, Transport};

/// Bounded retry settings for opening sessions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Attempts made per node before giving up.
    pub max_attempts: u32,
    /// Pause before the first attempt and between failed attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Opens one session per node concurrently, pushing each into `sessions`
/// as it completes.
///
/// The first node to exhaust its attempts cancels the others: tasks still
/// in backoff stop retrying, while attempts already in flight are allowed
/// to finish so any session they open lands in `sessions` for teardown.
///
/// # Errors
///
/// Returns [`FleetError::SessionEstablishment`] naming the first node that
/// never became reachable, or [`FleetError::Join`] if a task panicked.
pub async fn connect_all<T: Transport>(
    transport: &Arc<T>,
    nodes: &[Node],
    policy: RetryPolicy,
    sessions: &mut Vec<Session>,
) -> Result<(), FleetError> {
    info!(
        nodes = nodes.len(),
        max_attempts = policy.max_attempts,
        backoff_secs = policy.backoff.as_secs(),
        "opening sessions"
    );
    let (cancel, cancelled) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for node in nodes {
        let worker = Arc::clone(transport);
        let target = node.clone();
        let stop = cancelled.clone();
        tasks.spawn(async move { establish(worker.as_ref(), &target, policy, stop).await });
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok(Ok(Some(session))) => {
                sessions.push(session);
                continue;
            }
            Ok(Ok(None)) => continue,
            Ok(Err(err)) => err,
            Err(err) => FleetError::Join(err.to_string()),
        };
        if failure.is_none() {
            warn!(error = %err, "cancelling remaining connection attempts");
            cancel.send_replace(true);
            failure = Some(err);
        }
    }

    failure.map_or(Ok(()), Err)
}

/// Retries `open` for one node. Returns `Ok(None)` when cancelled between
/// attempts.
async fn establish<T: Transport + ?Sized>(
    transport: &T,
    node: &Node,
    policy: RetryPolicy,
    mut cancelled: watch::Receiver<bool>,
) -> Result<Option<Session>, FleetError> {
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancelled.wait_for(|stop| *stop) => {
                debug!(node = %node.id, attempt, "connection attempts cancelled");
                return Ok(None);
            }
            () = tokio::time::sleep(policy.backoff) => {}
        }
        match transport.open(node).await {
            Ok(session) => {
                debug!(node = %node.id, attempt, "session established");
                return Ok(Some(session));
            }
            Err(err) => debug!(node = %node.id, attempt, error = %err, "connection attempt failed"),
        }
    }
    Err(FleetError::SessionEstablishment {
        node_id: node.id.clone(),
        attempts: policy.max_attempts,
    })
}
