//! Rollback controller
//!
//! Drives a deployment that failed to come up back to a state with nothing
//! running. The controller is re-entrant: it is invoked again whenever an
//! instance reports RUNNING while a rollback is in progress, which covers
//! launches that were still pending when the rollback started.

use crate::error::Result;
use crate::event_log::{commit_state, EventLog};
use crate::lifecycle::{request_stops, running_ids, InstanceLifecycle};
use crate::store::DeploymentStore;
use flotilla_types::{Deployment, DeploymentState, InstanceState};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What a rollback pass achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Nothing was running; the deployment is ROLLBACK_COMPLETE
    Completed,

    /// Stop requests were accepted; completion follows the stop
    /// confirmations reported by the provider
    AwaitingStops { requested: usize },

    /// At least one stop request failed; the deployment is ROLLBACK_FAILED
    Failed { stop_failures: usize },
}

/// Executes rollbacks
pub struct RollbackController {
    store: Arc<dyn DeploymentStore>,
    events: Arc<dyn EventLog>,
    lifecycle: Arc<dyn InstanceLifecycle>,
}

impl RollbackController {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        events: Arc<dyn EventLog>,
        lifecycle: Arc<dyn InstanceLifecycle>,
    ) -> Self {
        Self {
            store,
            events,
            lifecycle,
        }
    }

    /// Run one rollback pass over `deployment`.
    ///
    /// ROLLBACK_IN_PROGRESS is committed and persisted before any stop
    /// request goes out, so a crash mid-rollback is visible on reload.
    #[instrument(skip(self, deployment), fields(deployment_id = %deployment.id))]
    pub async fn execute(&self, deployment: &mut Deployment) -> Result<RollbackOutcome> {
        if commit_state(
            self.events.as_ref(),
            deployment,
            DeploymentState::RollbackInProgress,
        )
        .await?
        {
            self.store.save(deployment).await?;
            warn!("Rollback started");
        }

        if deployment.is_destroyable() {
            commit_state(
                self.events.as_ref(),
                deployment,
                DeploymentState::RollbackComplete,
            )
            .await?;
            info!("Rollback complete, nothing was running");
            return Ok(RollbackOutcome::Completed);
        }

        let running = running_ids(deployment);
        let round = request_stops(
            self.lifecycle.as_ref(),
            self.events.as_ref(),
            deployment,
            &running,
        )
        .await?;
        let requested = round.requested;
        let stop_failures = round.failures.len();

        if stop_failures > 0 {
            // Never-launched instances will not be attempted anymore
            for instance in deployment
                .instances
                .iter_mut()
                .filter(|i| i.state == InstanceState::New)
            {
                instance.set_state(InstanceState::CreateFailed);
            }
            commit_state(
                self.events.as_ref(),
                deployment,
                DeploymentState::RollbackFailed,
            )
            .await?;
            error!(stop_failures, "Rollback failed, manual intervention required");
            return Ok(RollbackOutcome::Failed { stop_failures });
        }

        info!(requested, "Rollback waiting for stop confirmations");
        Ok(RollbackOutcome::AwaitingStops { requested })
    }
}
