//! Instance types
//!
//! An Instance is the runtime counterpart of one manifest assembly. It is
//! mutated by the launch executor and by the provider-side lifecycle; the
//! deployment only ever reads its state.

use crate::{
    AccountId, AssemblySpec, DeploymentId, HardwareProfile, ImageId, InstanceId, Match, RealmId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Instance lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Created with the deployment, not yet handed to a provider
    New,
    /// Launch accepted by the provider, not yet running
    Pending,
    /// Running on the provider
    Running,
    /// Provider is shutting the instance down
    ShuttingDown,
    /// Stop requested and in flight
    Stopping,
    /// Stopped cleanly
    Stopped,
    /// The provider launch never produced an instance
    CreateFailed,
    /// Provider reported an error for a previously created instance
    Error,
    /// Instance disappeared from the provider
    Vanished,
}

impl InstanceState {
    pub const ALL: [InstanceState; 9] = [
        InstanceState::New,
        InstanceState::Pending,
        InstanceState::Running,
        InstanceState::ShuttingDown,
        InstanceState::Stopping,
        InstanceState::Stopped,
        InstanceState::CreateFailed,
        InstanceState::Error,
        InstanceState::Vanished,
    ];

    /// Member of the failed family
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            InstanceState::CreateFailed | InstanceState::Error | InstanceState::Vanished
        )
    }

    /// Running or transitioning on the provider
    pub fn is_active(self) -> bool {
        matches!(
            self,
            InstanceState::Pending
                | InstanceState::Running
                | InstanceState::ShuttingDown
                | InstanceState::Stopping
        )
    }

    /// Neither running nor transitioning
    pub fn is_inactive(self) -> bool {
        !self.is_active()
    }

    /// Settled launch outcome, used by partial launches
    pub fn is_failed_or_running(self) -> bool {
        self == InstanceState::Running || self.is_failed()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::New => "new",
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting_down",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::CreateFailed => "create_failed",
            InstanceState::Error => "error",
            InstanceState::Vanished => "vanished",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an instance was placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePlacement {
    /// Provider hardware profile chosen for the instance
    pub hardware_profile: String,

    /// Provider-side image identifier
    pub provider_image: String,

    /// Realm, when the assembly asked for one
    pub realm: Option<RealmId>,
}

/// One instance of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Unique instance identifier
    pub id: InstanceId,

    /// Instance name (`<deployment>/<assembly>`)
    pub name: String,

    /// Owning deployment
    pub deployment_id: DeploymentId,

    /// Assembly this instance was built from
    pub assembly: String,

    /// Requested hardware profile
    pub hardware_profile: HardwareProfile,

    /// Requested image
    pub image: ImageId,

    /// Requested realm
    pub realm: Option<RealmId>,

    /// Account the instance was matched to, None until matched
    pub provider_account: Option<AccountId>,

    /// Placement chosen at launch time
    pub placement: Option<InstancePlacement>,

    /// Current lifecycle state
    pub state: InstanceState,

    /// Launch parameters passed through to the provider
    pub launch_parameters: BTreeMap<String, String>,

    /// Last launch or stop error recorded against the instance
    pub last_error: Option<String>,

    /// Created timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last updated timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Instance {
    /// Build the NEW instance for one assembly of a deployment
    pub fn from_assembly(
        deployment_id: &DeploymentId,
        deployment_name: &str,
        assembly: &AssemblySpec,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: InstanceId::generate(),
            name: format!("{}/{}", deployment_name, assembly.name),
            deployment_id: deployment_id.clone(),
            assembly: assembly.name.clone(),
            hardware_profile: assembly.hardware_profile.clone(),
            image: assembly.image.clone(),
            realm: assembly.realm.clone(),
            provider_account: None,
            placement: None,
            state: InstanceState::New,
            launch_parameters: assembly.parameters.clone(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    pub fn is_failed(&self) -> bool {
        self.state.is_failed()
    }

    pub fn is_inactive(&self) -> bool {
        self.state.is_inactive()
    }

    /// Set a new state, returning whether it differed from the old one
    pub fn set_state(&mut self, state: InstanceState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.updated_at = chrono::Utc::now();
        true
    }

    /// Record a launch or stop failure
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = chrono::Utc::now();
    }

    /// Record the account and placement an accepted launch went to
    pub fn assign(&mut self, placement: &Match) {
        self.provider_account = Some(placement.account_id.clone());
        self.placement = Some(InstancePlacement {
            hardware_profile: placement.hardware_profile.name.clone(),
            provider_image: placement.provider_image.clone(),
            realm: placement.realm.clone(),
        });
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_families_partition() {
        for state in InstanceState::ALL {
            assert_ne!(state.is_active(), state.is_inactive());
            if state.is_failed() {
                assert!(state.is_inactive(), "{state} failed but active");
            }
        }
        assert!(InstanceState::New.is_inactive());
        assert!(InstanceState::Stopping.is_active());
    }

    #[test]
    fn test_failed_or_running() {
        assert!(InstanceState::Running.is_failed_or_running());
        assert!(InstanceState::Vanished.is_failed_or_running());
        assert!(!InstanceState::Pending.is_failed_or_running());
        assert!(!InstanceState::Stopped.is_failed_or_running());
    }
}
