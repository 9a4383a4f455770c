//! Provider-side instance lifecycle
//!
//! The orchestrator never talks to a cloud directly. Launch and stop
//! requests go through an [`InstanceLifecycle`]; the provider later reports
//! the resulting instance state changes back through
//! `DeploymentManager::apply_instance_state`.

use crate::event_log::{record, EventLog, EventLogError};
use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{Deployment, EventStatus, Instance, InstanceId, InstanceState, Match, UserId};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Provider-facing launch configuration of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub deployment_name: String,
    pub assembly: String,
    pub parameters: BTreeMap<String, String>,
}

impl InstanceConfig {
    /// Configuration of `instance` within `deployment`
    pub fn for_instance(deployment: &Deployment, instance: &Instance) -> Self {
        Self {
            deployment_name: deployment.name.clone(),
            assembly: instance.assembly.clone(),
            parameters: instance.launch_parameters.clone(),
        }
    }
}

/// Lifecycle errors reported by a provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),
}

/// Launch and stop requests against a provider account
#[async_trait]
pub trait InstanceLifecycle: Send + Sync {
    /// Request a launch of `instance` at `placement` on behalf of `user`.
    ///
    /// Success means the provider accepted the request; the instance
    /// reaches RUNNING later through a reported state change.
    async fn launch(
        &self,
        instance: &Instance,
        placement: &Match,
        user: &UserId,
        config: &InstanceConfig,
    ) -> Result<(), LifecycleError>;

    /// Request a stop of `instance`
    async fn stop(&self, instance: &Instance) -> Result<(), LifecycleError>;

    /// Lifecycle backend name
    fn name(&self) -> &str;
}

/// Stop requests issued in one pass
#[derive(Debug, Default)]
pub(crate) struct StopRound {
    pub requested: usize,
    pub failures: Vec<(InstanceId, String)>,
}

/// Request a stop of every instance in `targets`.
///
/// Accepted instances move to STOPPING. A refused stop is kept on the
/// instance as its last error and recorded as an `instance_stop_failed`
/// event.
pub(crate) async fn request_stops(
    lifecycle: &dyn InstanceLifecycle,
    events: &dyn EventLog,
    deployment: &mut Deployment,
    targets: &[InstanceId],
) -> Result<StopRound, EventLogError> {
    let mut round = StopRound::default();

    for instance_id in targets {
        let Some(instance) = deployment.instance(instance_id).cloned() else {
            continue;
        };

        match lifecycle.stop(&instance).await {
            Ok(()) => {
                if let Some(instance) = deployment.instance_mut(instance_id) {
                    instance.set_state(InstanceState::Stopping);
                }
                round.requested += 1;
            }
            Err(e) => {
                warn!(instance_id = %instance.id, error = %e, "Stop request failed");
                if let Some(instance) = deployment.instance_mut(instance_id) {
                    instance.record_error(e.to_string());
                }
                record(
                    events,
                    &deployment.id,
                    EventStatus::InstanceStopFailed,
                    Some(format!("{}: {}", instance.name, e)),
                )
                .await?;
                round.failures.push((instance.id.clone(), e.to_string()));
            }
        }
    }

    Ok(round)
}

/// Ids of the instances currently RUNNING
pub(crate) fn running_ids(deployment: &Deployment) -> Vec<InstanceId> {
    deployment
        .running_instances()
        .into_iter()
        .map(|i| i.id.clone())
        .collect()
}

/// Kind of request seen by a [`ScriptedLifecycle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Launch,
    Stop,
}

/// One request seen by a [`ScriptedLifecycle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCall {
    pub request: LifecycleRequest,
    pub instance_id: InstanceId,
    pub assembly: String,
}

/// Lifecycle that accepts every request unless scripted to fail.
///
/// Failures are keyed by assembly name since instance ids only exist once
/// a deployment is built. Every request is recorded in arrival order.
#[derive(Default)]
pub struct ScriptedLifecycle {
    launch_failures: DashMap<String, LifecycleError>,
    stop_failures: DashMap<String, LifecycleError>,
    calls: Mutex<Vec<LifecycleCall>>,
}

impl ScriptedLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every launch of `assembly`
    pub fn fail_launch_of(&self, assembly: impl Into<String>, error: LifecycleError) {
        self.launch_failures.insert(assembly.into(), error);
    }

    /// Reject every stop of `assembly`
    pub fn fail_stop_of(&self, assembly: impl Into<String>, error: LifecycleError) {
        self.stop_failures.insert(assembly.into(), error);
    }

    /// Accept launches of `assembly` again
    pub fn clear_failures(&self, assembly: &str) {
        self.launch_failures.remove(assembly);
        self.stop_failures.remove(assembly);
    }

    /// Every request received so far
    pub async fn calls(&self) -> Vec<LifecycleCall> {
        self.calls.lock().await.clone()
    }

    /// Assemblies a launch was requested for, in order
    pub async fn launched(&self) -> Vec<String> {
        self.assemblies_for(LifecycleRequest::Launch).await
    }

    /// Assemblies a stop was requested for, in order
    pub async fn stopped(&self) -> Vec<String> {
        self.assemblies_for(LifecycleRequest::Stop).await
    }

    async fn assemblies_for(&self, request: LifecycleRequest) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.request == request)
            .map(|c| c.assembly.clone())
            .collect()
    }

    async fn record(&self, request: LifecycleRequest, instance: &Instance) {
        self.calls.lock().await.push(LifecycleCall {
            request,
            instance_id: instance.id.clone(),
            assembly: instance.assembly.clone(),
        });
    }
}

#[async_trait]
impl InstanceLifecycle for ScriptedLifecycle {
    async fn launch(
        &self,
        instance: &Instance,
        placement: &Match,
        user: &UserId,
        _config: &InstanceConfig,
    ) -> Result<(), LifecycleError> {
        self.record(LifecycleRequest::Launch, instance).await;
        debug!(
            instance_id = %instance.id,
            account_id = %placement.account_id,
            user = %user,
            "Scripted launch"
        );
        match self.launch_failures.get(&instance.assembly) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn stop(&self, instance: &Instance) -> Result<(), LifecycleError> {
        self.record(LifecycleRequest::Stop, instance).await;
        match self.stop_failures.get(&instance.assembly) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_types::{AssemblySpec, DeploymentId, HardwareProfile};

    fn instance(assembly: &str) -> Instance {
        Instance::from_assembly(
            &DeploymentId::generate(),
            "web",
            &AssemblySpec::new(assembly, HardwareProfile::new("small", 1, 1024, 10, "x86_64"), "fedora"),
        )
    }

    fn placement(instance: &Instance) -> Match {
        Match {
            instance_id: instance.id.clone(),
            account_id: "a".into(),
            hardware_profile: instance.hardware_profile.clone(),
            provider_image: "ami-1".into(),
            realm: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_failures_by_assembly() {
        let lifecycle = ScriptedLifecycle::new();
        lifecycle.fail_launch_of("db", LifecycleError::Rejected("no capacity".into()));

        let app = instance("app");
        let db = instance("db");
        let user = UserId::new("alice");
        let config = InstanceConfig {
            deployment_name: "web".into(),
            assembly: "app".into(),
            parameters: BTreeMap::new(),
        };

        assert!(lifecycle.launch(&app, &placement(&app), &user, &config).await.is_ok());
        let err = lifecycle
            .launch(&db, &placement(&db), &user, &config)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Provider rejected request: no capacity");

        assert_eq!(lifecycle.launched().await, vec!["app", "db"]);

        lifecycle.clear_failures("db");
        assert!(lifecycle.launch(&db, &placement(&db), &user, &config).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_recorded() {
        let lifecycle = ScriptedLifecycle::new();
        lifecycle.fail_stop_of("db", LifecycleError::Unreachable("timeout".into()));

        assert!(lifecycle.stop(&instance("app")).await.is_ok());
        assert!(lifecycle.stop(&instance("db")).await.is_err());
        assert_eq!(lifecycle.stopped().await, vec!["app", "db"]);
        assert_eq!(lifecycle.calls().await.len(), 2);
    }
}
