//! Launch executor
//!
//! Issues provider launches for every instance of a deployment, one at a
//! time and in manifest order, against the placements of a [`Selection`].

use crate::lifecycle::{InstanceConfig, InstanceLifecycle};
use flotilla_placement::Selection;
use flotilla_types::{Deployment, InstanceId, InstanceState, UserId};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of launching a deployment's instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    /// Accepted by the provider, now PENDING
    pub launched: Vec<InstanceId>,

    /// Rejected by the provider, now CREATE_FAILED, with the error
    pub failed: Vec<(InstanceId, String)>,

    /// Never attempted because an earlier launch failed; still NEW
    pub skipped: Vec<InstanceId>,
}

impl LaunchReport {
    /// Every instance was accepted
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Launched and failed instances
    pub fn attempted(&self) -> impl Iterator<Item = &InstanceId> {
        self.launched
            .iter()
            .chain(self.failed.iter().map(|(id, _)| id))
    }
}

/// Sequential launcher
pub struct LaunchExecutor {
    lifecycle: Arc<dyn InstanceLifecycle>,
}

impl LaunchExecutor {
    pub fn new(lifecycle: Arc<dyn InstanceLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Launch every NEW instance of `deployment` at its selected placement.
    ///
    /// A failure is recorded on the instance. Without `partial_launch` the
    /// first failure stops the loop and the remaining instances stay NEW.
    pub async fn launch(
        &self,
        deployment: &mut Deployment,
        selection: &Selection,
        user: &UserId,
        partial_launch: bool,
    ) -> LaunchReport {
        let mut report = LaunchReport::default();
        let mut aborted = false;

        for index in 0..deployment.instances.len() {
            let instance = deployment.instances[index].clone();
            if instance.state != InstanceState::New {
                continue;
            }
            if aborted {
                report.skipped.push(instance.id.clone());
                continue;
            }

            let Some(placement) = selection.placement_for(&instance.id) else {
                let reason = format!("no placement selected for {}", instance.name);
                warn!(instance_id = %instance.id, "Launch skipped: {}", reason);
                let target = &mut deployment.instances[index];
                target.record_error(reason.clone());
                target.set_state(InstanceState::CreateFailed);
                report.failed.push((instance.id.clone(), reason));
                aborted = !partial_launch;
                continue;
            };

            let config = InstanceConfig::for_instance(deployment, &instance);
            let result = self
                .lifecycle
                .launch(&instance, placement, user, &config)
                .await;

            let target = &mut deployment.instances[index];
            match result {
                Ok(()) => {
                    target.assign(placement);
                    target.set_state(InstanceState::Pending);
                    info!(
                        instance_id = %instance.id,
                        account_id = %placement.account_id,
                        "Instance launch accepted"
                    );
                    report.launched.push(instance.id.clone());
                }
                Err(e) => {
                    warn!(
                        instance_id = %instance.id,
                        account_id = %placement.account_id,
                        error = %e,
                        "Instance launch failed"
                    );
                    target.record_error(e.to_string());
                    target.set_state(InstanceState::CreateFailed);
                    report.failed.push((instance.id.clone(), e.to_string()));
                    aborted = !partial_launch;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleError, ScriptedLifecycle};
    use flotilla_placement::{AccountSelector, InstanceMatcher, SelectionScope, UnlimitedQuota};
    use flotilla_types::{
        AssemblySpec, DeploymentManifest, HardwareProfile, PoolFamilyId, PoolId, ProviderAccount,
    };

    fn small() -> HardwareProfile {
        HardwareProfile::new("small", 1, 1024, 10, "x86_64")
    }

    fn deployment(assemblies: &[&str]) -> Deployment {
        let mut manifest = DeploymentManifest::new("web");
        for name in assemblies {
            manifest = manifest.with_assembly(AssemblySpec::new(*name, small(), "fedora"));
        }
        let mut d = Deployment::new(
            "web",
            PoolId::new("default"),
            PoolFamilyId::new("default"),
            UserId::new("alice"),
            manifest,
        );
        d.instances = d
            .manifest
            .assemblies
            .iter()
            .map(|a| flotilla_types::Instance::from_assembly(&d.id, &d.name, a))
            .collect();
        d
    }

    fn selection(d: &Deployment) -> Selection {
        let matcher = InstanceMatcher::new(vec![ProviderAccount::new("a", "default", 1)
            .with_hardware_profile(small())
            .with_image("fedora", "ami-1")]);
        let set = matcher.find_all(&d.instances);
        AccountSelector::new(Arc::new(UnlimitedQuota))
            .select(
                &set.candidates_per_instance,
                matcher.accounts(),
                &d.instances,
                SelectionScope {
                    pool: &d.pool,
                    pool_family: &d.pool_family,
                    user: &d.owner,
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_launched_become_pending() {
        let lifecycle = Arc::new(ScriptedLifecycle::new());
        let executor = LaunchExecutor::new(lifecycle.clone());
        let mut d = deployment(&["db", "app"]);
        let selection = selection(&d);

        let report = executor
            .launch(&mut d, &selection, &UserId::new("alice"), false)
            .await;

        assert!(report.is_success());
        assert_eq!(report.launched.len(), 2);
        assert!(d.instances.iter().all(|i| i.state == InstanceState::Pending));
        assert!(d
            .instances
            .iter()
            .all(|i| i.provider_account.as_ref().map(|a| a.as_str()) == Some("a")));
        assert_eq!(lifecycle.launched().await, vec!["db", "app"]);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_without_partial_launch() {
        let lifecycle = Arc::new(ScriptedLifecycle::new());
        lifecycle.fail_launch_of("app", LifecycleError::Rejected("quota".into()));
        let executor = LaunchExecutor::new(lifecycle.clone());
        let mut d = deployment(&["db", "app", "cache"]);
        let selection = selection(&d);

        let report = executor
            .launch(&mut d, &selection, &UserId::new("alice"), false)
            .await;

        assert_eq!(report.launched, vec![d.instances[0].id.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.skipped, vec![d.instances[2].id.clone()]);
        assert_eq!(d.instances[1].state, InstanceState::CreateFailed);
        assert_eq!(
            d.instances[1].last_error.as_deref(),
            Some("Provider rejected request: quota")
        );
        assert_eq!(d.instances[2].state, InstanceState::New);
        assert_eq!(lifecycle.launched().await, vec!["db", "app"]);
    }

    #[tokio::test]
    async fn test_partial_launch_keeps_going() {
        let lifecycle = Arc::new(ScriptedLifecycle::new());
        lifecycle.fail_launch_of("db", LifecycleError::Unreachable("timeout".into()));
        let executor = LaunchExecutor::new(lifecycle.clone());
        let mut d = deployment(&["db", "app"]);
        let selection = selection(&d);

        let report = executor
            .launch(&mut d, &selection, &UserId::new("alice"), true)
            .await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.launched.len(), 1);
        assert!(report.skipped.is_empty());
        assert_eq!(report.attempted().count(), 2);
        assert_eq!(d.instances[1].state, InstanceState::Pending);
    }
}
