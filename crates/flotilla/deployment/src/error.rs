//! Deployment error types

use crate::event_log::EventLogError;
use crate::store::StateStoreError;
use flotilla_types::{DeploymentId, DeploymentState, InstanceId, RejectionReason, UserId};
use thiserror::Error;

/// Manifest or permission problem found while building instances
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("manifest '{0}' has no assemblies")]
    EmptyManifest(String),

    #[error("assembly '{0}' appears more than once in the manifest")]
    DuplicateAssembly(String),

    #[error("{user} may not use hardware profile '{profile}' requested by assembly '{assembly}'")]
    HardwareProfileNotPermitted {
        assembly: String,
        profile: String,
        user: UserId,
    },

    #[error("assembly '{assembly}' is missing launch parameter '{parameter}'")]
    MissingParameter { assembly: String, parameter: String },
}

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Deployment not found: {0}")]
    NotFound(DeploymentId),

    #[error("Instance {instance} not found in {deployment}")]
    InstanceNotFound {
        deployment: DeploymentId,
        instance: InstanceId,
    },

    #[error("Deployment validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("No provider account can host all instances of {deployment}: {}", join(.reasons))]
    NoAccountAvailable {
        deployment: DeploymentId,
        reasons: Vec<RejectionReason>,
    },

    #[error("Launch failed for instance {instance} of {deployment}: {reason}")]
    Launch {
        deployment: DeploymentId,
        instance: InstanceId,
        reason: String,
    },

    #[error("Stop failed for instance {instance} of {deployment}: {reason}")]
    Stop {
        deployment: DeploymentId,
        instance: InstanceId,
        reason: String,
    },

    #[error("Invalid deployment state: {current}, expected one of: {expected:?}")]
    InvalidState {
        current: DeploymentState,
        expected: Vec<DeploymentState>,
    },

    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),
}

impl DeploymentError {
    /// Deployment the error refers to, when it outlives the failure
    pub fn deployment_id(&self) -> Option<&DeploymentId> {
        match self {
            DeploymentError::NotFound(deployment)
            | DeploymentError::InstanceNotFound { deployment, .. }
            | DeploymentError::NoAccountAvailable { deployment, .. }
            | DeploymentError::Launch { deployment, .. }
            | DeploymentError::Stop { deployment, .. } => Some(deployment),
            _ => None,
        }
    }

    /// Rejection reasons carried by a failed account selection
    pub fn rejection_reasons(&self) -> &[RejectionReason] {
        match self {
            DeploymentError::NoAccountAvailable { reasons, .. } => reasons,
            _ => &[],
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeploymentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_types::AccountId;

    #[test]
    fn test_validation_message_lists_every_problem() {
        let err = DeploymentError::Validation(vec![
            ValidationError::EmptyManifest("m".into()),
            ValidationError::DuplicateAssembly("db".into()),
        ]);
        assert_eq!(
            err.to_string(),
            "Deployment validation failed: manifest 'm' has no assemblies; \
             assembly 'db' appears more than once in the manifest"
        );
    }

    #[test]
    fn test_rejection_reasons_accessor() {
        let reasons = vec![RejectionReason::AccountDisabled {
            account: AccountId::new("a"),
        }];
        let err = DeploymentError::NoAccountAvailable {
            deployment: DeploymentId::generate(),
            reasons: reasons.clone(),
        };
        assert_eq!(err.rejection_reasons(), reasons.as_slice());
        assert!(DeploymentError::NotFound(DeploymentId::generate())
            .rejection_reasons()
            .is_empty());
    }
}
