//! Lifecycle events
//!
//! Events are immutable, append-only records of what happened to a
//! deployment. They are the input to uptime derivation and audit trails.

use crate::{DeploymentId, DeploymentState};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status code carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The deployment entered this state
    State(DeploymentState),
    /// An instance failed to launch while the deployment was pending
    InstanceLaunchFailed,
    /// A rollback stop request failed
    InstanceStopFailed,
}

impl EventStatus {
    pub fn code(&self) -> &'static str {
        match self {
            EventStatus::State(state) => state.as_str(),
            EventStatus::InstanceLaunchFailed => "instance_launch_failed",
            EventStatus::InstanceStopFailed => "instance_stop_failed",
        }
    }

    pub fn state(&self) -> Option<DeploymentState> {
        match self {
            EventStatus::State(state) => Some(*state),
            _ => None,
        }
    }

    /// Summary used when the caller has nothing more specific to say
    pub fn default_summary(&self) -> String {
        match self {
            EventStatus::State(state) => format!("Deployment state changed to {}", state),
            EventStatus::InstanceLaunchFailed => "Instance launch failed".to_string(),
            EventStatus::InstanceStopFailed => "Instance stop failed".to_string(),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    /// Requires operator intervention
    Critical,
}

/// A deployment lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Deployment the event belongs to
    pub deployment_id: DeploymentId,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Status code
    pub status: EventStatus,

    /// Severity inferred from the status
    pub severity: EventSeverity,

    /// One-line summary
    pub summary: String,

    /// Optional details, e.g. the underlying provider error
    pub description: Option<String>,
}

impl Event {
    pub fn new(
        deployment_id: DeploymentId,
        status: EventStatus,
        summary: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            timestamp: chrono::Utc::now(),
            status,
            severity: Self::infer_severity(&status),
            summary: summary.into(),
            description,
        }
    }

    /// Override the timestamp, for replaying recorded history
    pub fn at(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn infer_severity(status: &EventStatus) -> EventSeverity {
        match status {
            EventStatus::State(DeploymentState::RollbackFailed) => EventSeverity::Critical,

            EventStatus::InstanceLaunchFailed
            | EventStatus::InstanceStopFailed
            | EventStatus::State(DeploymentState::Failed) => EventSeverity::Error,

            EventStatus::State(DeploymentState::Incomplete)
            | EventStatus::State(DeploymentState::RollbackInProgress)
            | EventStatus::State(DeploymentState::RollbackComplete) => EventSeverity::Warning,

            EventStatus::State(_) => EventSeverity::Info,
        }
    }
}
