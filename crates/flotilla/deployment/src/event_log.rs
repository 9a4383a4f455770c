//! Deployment event log
//!
//! Append-only record of every committed state change and every launch or
//! stop failure. The in-memory log also fans appended events out on a
//! broadcast channel so monitors can follow deployments live.

use crate::config::OrchestratorConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{Deployment, DeploymentId, DeploymentState, Event, EventStatus};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity for the live event stream
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Append-only event log
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event
    async fn append(&self, event: Event) -> Result<(), EventLogError>;

    /// Events of one deployment, oldest first
    async fn events_for(&self, deployment_id: &DeploymentId) -> Result<Vec<Event>, EventLogError>;

    /// Drop the history of a destroyed deployment
    async fn purge(&self, deployment_id: &DeploymentId) -> Result<(), EventLogError>;
}

/// Event log errors
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Append an event carrying the status' default summary
pub async fn record(
    log: &dyn EventLog,
    deployment_id: &DeploymentId,
    status: EventStatus,
    description: Option<String>,
) -> Result<(), EventLogError> {
    log.append(Event::new(
        deployment_id.clone(),
        status,
        status.default_summary(),
        description,
    ))
    .await
}

/// Commit `next` on `deployment`, appending the state event when it is an
/// actual change. Returns whether the state changed.
pub async fn commit_state(
    log: &dyn EventLog,
    deployment: &mut Deployment,
    next: DeploymentState,
) -> Result<bool, EventLogError> {
    let from = deployment.state();
    if !deployment.commit_state(next) {
        return Ok(false);
    }
    debug!(deployment_id = %deployment.id, from = %from, to = %next, "Deployment state committed");
    record(log, &deployment.id, EventStatus::State(next), None).await?;
    Ok(true)
}

/// In-memory event log with a live broadcast stream
pub struct InMemoryEventLog {
    events: DashMap<DeploymentId, Vec<Event>>,
    event_tx: broadcast::Sender<Event>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a log whose live stream buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            events: DashMap::new(),
            event_tx,
        }
    }

    /// Create a log sized by the orchestrator configuration
    pub fn for_config(config: &OrchestratorConfig) -> Self {
        Self::with_capacity(config.event_channel_capacity)
    }

    /// Subscribe to events appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: Event) -> Result<(), EventLogError> {
        debug!(
            deployment_id = %event.deployment_id,
            status = %event.status,
            "Event appended"
        );
        self.events
            .entry(event.deployment_id.clone())
            .or_default()
            .push(event.clone());
        // No subscribers is fine
        let _ = self.event_tx.send(event);
        Ok(())
    }

    async fn events_for(&self, deployment_id: &DeploymentId) -> Result<Vec<Event>, EventLogError> {
        Ok(self
            .events
            .get(deployment_id)
            .map(|events| events.clone())
            .unwrap_or_default())
    }

    async fn purge(&self, deployment_id: &DeploymentId) -> Result<(), EventLogError> {
        self.events.remove(deployment_id);
        Ok(())
    }
}
