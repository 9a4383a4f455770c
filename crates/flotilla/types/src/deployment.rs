//! Deployment types
//!
//! A Deployment owns the arena of Instances built from its manifest. Its
//! state is never assigned ad hoc: it only moves through
//! [`Deployment::commit_state`], which the orchestrator's state machine and
//! rollback controller call.

use crate::{
    DeploymentId, DeploymentManifest, Instance, InstanceId, InstanceState, PoolFamilyId, PoolId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    New,
    Pending,
    Running,
    Incomplete,
    ShuttingDown,
    Stopped,
    Failed,
    RollbackInProgress,
    RollbackComplete,
    RollbackFailed,
}

impl DeploymentState {
    pub const ALL: [DeploymentState; 10] = [
        DeploymentState::New,
        DeploymentState::Pending,
        DeploymentState::Running,
        DeploymentState::Incomplete,
        DeploymentState::ShuttingDown,
        DeploymentState::Stopped,
        DeploymentState::Failed,
        DeploymentState::RollbackInProgress,
        DeploymentState::RollbackComplete,
        DeploymentState::RollbackFailed,
    ];

    /// States after which the deployment is only waiting to be destroyed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentState::Stopped
                | DeploymentState::RollbackComplete
                | DeploymentState::RollbackFailed
        )
    }

    pub fn is_rollback(self) -> bool {
        matches!(
            self,
            DeploymentState::RollbackInProgress
                | DeploymentState::RollbackComplete
                | DeploymentState::RollbackFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentState::New => "new",
            DeploymentState::Pending => "pending",
            DeploymentState::Running => "running",
            DeploymentState::Incomplete => "incomplete",
            DeploymentState::ShuttingDown => "shutting_down",
            DeploymentState::Stopped => "stopped",
            DeploymentState::Failed => "failed",
            DeploymentState::RollbackInProgress => "rollback_in_progress",
            DeploymentState::RollbackComplete => "rollback_complete",
            DeploymentState::RollbackFailed => "rollback_failed",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment of a manifest onto a single provider account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment identifier
    pub id: DeploymentId,

    /// Human-readable name
    pub name: String,

    /// Pool the deployment draws capacity from
    pub pool: PoolId,

    /// Pool family owning the pool and its accounts
    pub pool_family: PoolFamilyId,

    /// Requesting user
    pub owner: UserId,

    state: DeploymentState,

    /// Destroy the record once all instances are inactive
    pub scheduled_for_deletion: bool,

    /// Keep launching after a single instance fails
    pub partial_launch: bool,

    /// Manifest the instances were built from
    pub manifest: DeploymentManifest,

    /// Instances in manifest order
    pub instances: Vec<Instance>,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Deployment {
    /// Create a NEW deployment without instances
    pub fn new(
        name: impl Into<String>,
        pool: PoolId,
        pool_family: PoolFamilyId,
        owner: UserId,
        manifest: DeploymentManifest,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: DeploymentId::generate(),
            name: name.into(),
            pool,
            pool_family,
            owner,
            state: DeploymentState::New,
            scheduled_for_deletion: false,
            partial_launch: false,
            manifest,
            instances: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Move to `next`; returns false when it equals the current state.
    ///
    /// Reserved for the state machine and rollback controller, which pair
    /// every committed change with an event.
    pub fn commit_state(&mut self, next: DeploymentState) -> bool {
        if self.state == next {
            return false;
        }
        self.state = next;
        self.updated_at = chrono::Utc::now();
        true
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&Instance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    pub fn instance_mut(&mut self, id: &InstanceId) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| &i.id == id)
    }

    pub fn instance_states(&self) -> Vec<InstanceState> {
        self.instances.iter().map(|i| i.state).collect()
    }

    /// Every instance running. False for a deployment without instances.
    pub fn all_running(&self) -> bool {
        all_running(&self.instance_states())
    }

    pub fn any_instance_running(&self) -> bool {
        self.instances.iter().any(Instance::is_running)
    }

    pub fn running_instances(&self) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.is_running()).collect()
    }

    pub fn failed_instances(&self) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.is_failed()).collect()
    }

    /// No instance is running or transitioning
    pub fn is_destroyable(&self) -> bool {
        self.instances.iter().all(Instance::is_inactive)
    }

    /// Instances that are busy transitioning and can be neither stopped nor destroyed
    pub fn not_stoppable_or_destroyable(&self) -> Vec<&Instance> {
        self.instances
            .iter()
            .filter(|i| i.state.is_active() && !i.is_running())
            .collect()
    }
}

/// Non-empty and every state is RUNNING
pub fn all_running(states: &[InstanceState]) -> bool {
    !states.is_empty() && states.iter().all(|s| *s == InstanceState::Running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_state_suppresses_noop() {
        let mut deployment = Deployment::new(
            "d",
            PoolId::new("default"),
            PoolFamilyId::new("default"),
            UserId::new("alice"),
            DeploymentManifest::new("m"),
        );
        assert_eq!(deployment.state(), DeploymentState::New);
        assert!(!deployment.commit_state(DeploymentState::New));
        assert!(deployment.commit_state(DeploymentState::Pending));
        assert_eq!(deployment.state(), DeploymentState::Pending);
    }

    fn deployment_with(states: &[InstanceState]) -> Deployment {
        let mut deployment = Deployment::new(
            "d",
            PoolId::new("default"),
            PoolFamilyId::new("default"),
            UserId::new("alice"),
            DeploymentManifest::new("m"),
        );
        let profile = crate::HardwareProfile::new("small", 1, 1024, 10, "x86_64");
        for (i, state) in states.iter().enumerate() {
            let assembly = crate::AssemblySpec::new(format!("a{i}"), profile.clone(), "fedora");
            let mut instance = Instance::from_assembly(&deployment.id, "d", &assembly);
            instance.set_state(*state);
            deployment.instances.push(instance);
        }
        deployment
    }

    #[test]
    fn test_instance_queries() {
        let deployment = deployment_with(&[
            InstanceState::Running,
            InstanceState::Error,
            InstanceState::Pending,
            InstanceState::Vanished,
        ]);

        assert!(deployment.any_instance_running());
        let running: Vec<_> = deployment
            .running_instances()
            .iter()
            .map(|i| i.assembly.as_str())
            .collect();
        assert_eq!(running, vec!["a0"]);
        let failed: Vec<_> = deployment
            .failed_instances()
            .iter()
            .map(|i| i.assembly.as_str())
            .collect();
        assert_eq!(failed, vec!["a1", "a3"]);
        assert!(!deployment.is_destroyable());
    }

    #[test]
    fn test_settled_deployment_has_nothing_running() {
        let deployment = deployment_with(&[InstanceState::Stopped, InstanceState::CreateFailed]);

        assert!(!deployment.any_instance_running());
        assert!(deployment.running_instances().is_empty());
        assert_eq!(deployment.failed_instances().len(), 1);
        assert!(deployment.is_destroyable());
    }

    #[test]
    fn test_empty_deployment_is_never_all_running() {
        assert!(!all_running(&[]));
        assert!(all_running(&[InstanceState::Running, InstanceState::Running]));
        assert!(!all_running(&[InstanceState::Running, InstanceState::Pending]));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = DeploymentState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                DeploymentState::Stopped,
                DeploymentState::RollbackComplete,
                DeploymentState::RollbackFailed
            ]
        );
    }
}
