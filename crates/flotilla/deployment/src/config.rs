//! Orchestrator configuration

use crate::event_log::DEFAULT_EVENT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};

/// Orchestrator behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default partial-launch policy for new deployments.
    ///
    /// With partial launch a failed instance neither aborts the launch nor
    /// triggers a rollback; the deployment settles once every instance has
    /// either failed or started running.
    pub partial_launch: bool,

    /// Capacity of the live event stream
    pub event_channel_capacity: usize,

    /// Delete a deployment and its events once it is terminal, scheduled
    /// for deletion and has no active instance left
    pub destroy_on_terminal: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            partial_launch: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            destroy_on_terminal: true,
        }
    }
}
