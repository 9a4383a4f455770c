//! Deployment Manager - entry point for deployment operations
//!
//! The manager owns no state of its own beyond per-deployment locks. Every
//! operation loads the deployment from the store, works on it under that
//! deployment's lock, and persists it again, so instance state events for
//! one deployment are evaluated strictly one after another while different
//! deployments proceed independently.

use crate::builder::build_instances;
use crate::catalog::AccountCatalog;
use crate::config::OrchestratorConfig;
use crate::error::{DeploymentError, Result};
use crate::event_log::{commit_state, record, EventLog};
use crate::launcher::{LaunchExecutor, LaunchReport};
use crate::lifecycle::{request_stops, running_ids, InstanceLifecycle};
use crate::permissions::PermissionGate;
use crate::rollback::{RollbackController, RollbackOutcome};
use crate::state_machine::{self, MachineInput, Obligation};
use crate::store::DeploymentStore;
use crate::uptime::{uptime_all, uptime_first_instance};
use dashmap::DashMap;
use flotilla_placement::{AccountSelector, InstanceMatcher, QuotaGuard, SelectionScope};
use flotilla_types::{
    Deployment, DeploymentId, DeploymentManifest, DeploymentState, Event, EventStatus,
    InstanceId, InstanceState, PoolFamilyId, PoolId, RejectionReason, UserId,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Request to create a deployment
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub name: String,
    pub pool: PoolId,
    pub pool_family: PoolFamilyId,
    pub owner: UserId,
    pub manifest: DeploymentManifest,
    /// Overrides the configured default when set
    pub partial_launch: Option<bool>,
}

impl DeploymentRequest {
    /// Request in the default pool, named after the manifest
    pub fn new(manifest: DeploymentManifest, owner: UserId) -> Self {
        Self {
            name: manifest.name.clone(),
            pool: PoolId::new("default"),
            pool_family: PoolFamilyId::new("default"),
            owner,
            manifest,
            partial_launch: None,
        }
    }

    pub fn in_pool(mut self, pool: PoolId, pool_family: PoolFamilyId) -> Self {
        self.pool = pool;
        self.pool_family = pool_family;
        self
    }

    pub fn with_partial_launch(mut self, partial_launch: bool) -> Self {
        self.partial_launch = Some(partial_launch);
        self
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The deployment and its events are gone
    Destroyed,
    /// Nothing was active; the deployment is kept in its final state
    Stopped,
    /// Stop requests were issued; the deployment now waits for the provider
    Stopping { requested: usize },
}

/// Uptime of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentUptime {
    pub first_instance: Option<chrono::Duration>,
    pub all: chrono::Duration,
}

/// Deployment Manager orchestrates launches, state and rollback
pub struct DeploymentManager {
    /// State store for persistence
    store: Arc<dyn DeploymentStore>,
    /// Lifecycle event log
    events: Arc<dyn EventLog>,
    /// Provider launch/stop requests
    lifecycle: Arc<dyn InstanceLifecycle>,
    /// Hardware profile permissions
    permissions: Arc<dyn PermissionGate>,
    /// Quota ceilings
    quota: Arc<dyn QuotaGuard>,
    /// Provider accounts per pool family
    catalog: Arc<dyn AccountCatalog>,
    launcher: LaunchExecutor,
    rollback: RollbackController,
    config: OrchestratorConfig,
    locks: DashMap<DeploymentId, Arc<Mutex<()>>>,
}

impl DeploymentManager {
    /// Create a new deployment manager
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        events: Arc<dyn EventLog>,
        lifecycle: Arc<dyn InstanceLifecycle>,
        permissions: Arc<dyn PermissionGate>,
        quota: Arc<dyn QuotaGuard>,
        catalog: Arc<dyn AccountCatalog>,
        config: OrchestratorConfig,
    ) -> Self {
        let launcher = LaunchExecutor::new(lifecycle.clone());
        let rollback = RollbackController::new(store.clone(), events.clone(), lifecycle.clone());

        info!(
            lifecycle = lifecycle.name(),
            permissions = permissions.name(),
            quota = quota.name(),
            "Deployment manager initialized"
        );

        Self {
            store,
            events,
            lifecycle,
            permissions,
            quota,
            catalog,
            launcher,
            rollback,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate a request and persist the NEW deployment with its instances
    #[instrument(skip(self, request), fields(name = %request.name, owner = %request.owner))]
    pub async fn create_deployment(&self, request: DeploymentRequest) -> Result<Deployment> {
        let DeploymentRequest {
            name,
            pool,
            pool_family,
            owner,
            manifest,
            partial_launch,
        } = request;

        let mut deployment = Deployment::new(name, pool, pool_family, owner.clone(), manifest);
        deployment.partial_launch = partial_launch.unwrap_or(self.config.partial_launch);

        deployment.instances = build_instances(&deployment, &owner, self.permissions.as_ref())
            .await
            .map_err(DeploymentError::Validation)?;

        // Unplaceable instances are reported again, with every other reason,
        // if the launch cannot find an account.
        let matcher = InstanceMatcher::new(self.catalog.accounts(&deployment.pool_family).await);
        let preflight = matcher.find_all(&deployment.instances);
        if !preflight.is_complete() {
            warn!(
                deployment_id = %deployment.id,
                rejections = preflight.rejections.len(),
                "Some instances have no candidate account"
            );
        }

        self.store.save(&deployment).await?;

        info!(
            deployment_id = %deployment.id,
            instances = deployment.instances.len(),
            "Deployment created"
        );

        Ok(deployment)
    }

    /// Create a deployment and launch it right away
    pub async fn create_and_launch(&self, request: DeploymentRequest) -> Result<Deployment> {
        let owner = request.owner.clone();
        let deployment = self.create_deployment(request).await?;
        self.launch(&deployment.id, &owner).await?;
        self.get(&deployment.id).await
    }

    /// Launch a NEW deployment.
    ///
    /// The deployment is PENDING before any placement is attempted and stays
    /// there when no account can host it. A launch failure without partial
    /// launch is returned as an error after the deployment has been handed
    /// to rollback and persisted.
    #[instrument(skip(self, user), fields(deployment_id = %deployment_id))]
    pub async fn launch(&self, deployment_id: &DeploymentId, user: &UserId) -> Result<LaunchReport> {
        let lock = self.lock_for(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        if deployment.state() != DeploymentState::New {
            return Err(DeploymentError::InvalidState {
                current: deployment.state(),
                expected: vec![DeploymentState::New],
            });
        }

        commit_state(self.events.as_ref(), &mut deployment, DeploymentState::Pending).await?;
        self.store.save(&deployment).await?;

        let accounts = self.catalog.accounts(&deployment.pool_family).await;
        let matcher = InstanceMatcher::new(accounts);
        let matches = matcher.find_all(&deployment.instances);
        let selection = AccountSelector::new(self.quota.clone()).select(
            &matches.candidates_per_instance,
            matcher.accounts(),
            &deployment.instances,
            SelectionScope {
                pool: &deployment.pool,
                pool_family: &deployment.pool_family,
                user,
            },
        );

        let selection = match selection {
            Ok(selection) => selection,
            Err(reasons) => {
                let reasons = merge_reasons(matches.rejections, reasons);
                warn!(reasons = reasons.len(), "No account can host the deployment");
                return Err(DeploymentError::NoAccountAvailable {
                    deployment: deployment_id.clone(),
                    reasons,
                });
            }
        };

        let partial_launch = deployment.partial_launch;
        let report = self
            .launcher
            .launch(&mut deployment, &selection, user, partial_launch)
            .await;

        if partial_launch {
            for (instance_id, reason) in &report.failed {
                let description = describe(&deployment, instance_id, reason);
                record(
                    self.events.as_ref(),
                    &deployment.id,
                    EventStatus::InstanceLaunchFailed,
                    Some(description),
                )
                .await?;
            }
        }

        let attempted: HashSet<&InstanceId> = report.attempted().collect();
        let order: Vec<InstanceId> = deployment
            .instances
            .iter()
            .filter(|i| attempted.contains(&i.id))
            .map(|i| i.id.clone())
            .collect();

        let mut destroy = false;
        for instance_id in &order {
            destroy |= self.step(&mut deployment, instance_id).await?;
        }
        self.finish(deployment, destroy).await?;

        info!(
            launched = report.launched.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Launch finished"
        );

        match report.failed.first() {
            Some((instance, reason)) if !partial_launch => Err(DeploymentError::Launch {
                deployment: deployment_id.clone(),
                instance: instance.clone(),
                reason: reason.clone(),
            }),
            _ => Ok(report),
        }
    }

    /// Apply a provider-reported instance state and evaluate the deployment.
    ///
    /// Returns the deployment state after evaluation. A report that does not
    /// change the instance state is ignored.
    #[instrument(skip(self), fields(deployment_id = %deployment_id, instance_id = %instance_id))]
    pub async fn apply_instance_state(
        &self,
        deployment_id: &DeploymentId,
        instance_id: &InstanceId,
        state: InstanceState,
    ) -> Result<DeploymentState> {
        let lock = self.lock_for(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        let instance = deployment
            .instance_mut(instance_id)
            .ok_or_else(|| DeploymentError::InstanceNotFound {
                deployment: deployment_id.clone(),
                instance: instance_id.clone(),
            })?;

        if !instance.set_state(state) {
            debug!(state = %state, "Instance state unchanged");
            return Ok(deployment.state());
        }

        let destroy = self.step(&mut deployment, instance_id).await?;
        let current = deployment.state();
        self.finish(deployment, destroy).await?;
        Ok(current)
    }

    /// Re-evaluate the deployment for an instance whose state is already
    /// recorded in the store. Returns whether the deployment state changed.
    #[instrument(skip(self), fields(deployment_id = %deployment_id, instance_id = %instance_id))]
    pub async fn update_state(
        &self,
        deployment_id: &DeploymentId,
        instance_id: &InstanceId,
    ) -> Result<bool> {
        let lock = self.lock_for(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        let before = deployment.state();
        let destroy = self.step(&mut deployment, instance_id).await?;
        let changed = deployment.state() != before;
        self.finish(deployment, destroy).await?;
        Ok(changed)
    }

    /// User-initiated stop.
    ///
    /// Moves the deployment to SHUTTING_DOWN and stops every RUNNING
    /// instance; the deployment is flagged for deletion only when nothing
    /// was active anymore, in which case it goes straight on to STOPPED and
    /// is destroyed. A deployment being rolled back keeps its rollback
    /// state.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn stop(&self, deployment_id: &DeploymentId) -> Result<StopOutcome> {
        let lock = self.lock_for(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        if deployment.is_destroyable() {
            deployment.scheduled_for_deletion = true;
        }
        self.shut_down(deployment).await
    }

    /// Stop everything and destroy the deployment once it is stopped.
    ///
    /// A deployment with no active instance is destroyed immediately.
    #[instrument(skip(self), fields(deployment_id = %deployment_id))]
    pub async fn stop_instances_and_destroy(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<StopOutcome> {
        let lock = self.lock_for(deployment_id);
        let _guard = lock.lock().await;

        let mut deployment = self.load(deployment_id).await?;
        if deployment.is_destroyable() {
            self.destroy(&deployment).await?;
            return Ok(StopOutcome::Destroyed);
        }

        deployment.scheduled_for_deletion = true;
        self.shut_down(deployment).await
    }

    /// Get a deployment by ID
    pub async fn get(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        self.load(deployment_id).await
    }

    /// List every deployment
    pub async fn list(&self) -> Result<Vec<Deployment>> {
        Ok(self.store.list().await?)
    }

    /// Event trail of a deployment, oldest first
    pub async fn events(&self, deployment_id: &DeploymentId) -> Result<Vec<Event>> {
        Ok(self.events.events_for(deployment_id).await?)
    }

    /// Uptime derived from the event trail
    pub async fn uptime(&self, deployment_id: &DeploymentId) -> Result<DeploymentUptime> {
        let events = self.events.events_for(deployment_id).await?;
        let now = chrono::Utc::now();
        Ok(DeploymentUptime {
            first_instance: uptime_first_instance(&events, now),
            all: uptime_all(&events, now),
        })
    }

    /// Evaluate one instance change and carry out its obligations.
    /// Returns whether the deployment must be destroyed.
    async fn step(&self, deployment: &mut Deployment, trigger: &InstanceId) -> Result<bool> {
        let instance = deployment
            .instance(trigger)
            .ok_or_else(|| DeploymentError::InstanceNotFound {
                deployment: deployment.id.clone(),
                instance: trigger.clone(),
            })?;
        let trigger_state = instance.state;
        let states = deployment.instance_states();

        let transition = state_machine::evaluate(MachineInput {
            current: deployment.state(),
            trigger: trigger_state,
            instances: &states,
            partial_launch: deployment.partial_launch,
            scheduled_for_deletion: deployment.scheduled_for_deletion,
        });

        if let Some(next) = transition.next {
            commit_state(self.events.as_ref(), deployment, next).await?;
        }

        let mut destroy = false;
        for obligation in transition.obligations {
            match obligation {
                Obligation::RecordLaunchFailure => {
                    let reason = deployment
                        .instance(trigger)
                        .and_then(|i| i.last_error.clone())
                        .unwrap_or_else(|| trigger_state.to_string());
                    let description = describe(deployment, trigger, &reason);
                    record(
                        self.events.as_ref(),
                        &deployment.id,
                        EventStatus::InstanceLaunchFailed,
                        Some(description),
                    )
                    .await?;
                }
                Obligation::StartRollback => {
                    let outcome = self.rollback.execute(deployment).await?;
                    debug!(?outcome, "Rollback pass finished");
                    if outcome == RollbackOutcome::Completed && deployment.scheduled_for_deletion {
                        destroy = true;
                    }
                }
                Obligation::StopInstance => {
                    let round = request_stops(
                        self.lifecycle.as_ref(),
                        self.events.as_ref(),
                        deployment,
                        std::slice::from_ref(trigger),
                    )
                    .await?;
                    debug!(requested = round.requested, "Instance came up during shutdown");
                }
                Obligation::Destroy => destroy = true,
            }
        }

        Ok(destroy)
    }

    /// Persist, or destroy when asked to and allowed by configuration
    async fn finish(&self, deployment: Deployment, destroy: bool) -> Result<()> {
        if destroy && self.config.destroy_on_terminal {
            self.destroy(&deployment).await
        } else {
            self.store.save(&deployment).await?;
            Ok(())
        }
    }

    /// Commit SHUTTING_DOWN unless rolling back, then stop every RUNNING
    /// instance. A deployment left with nothing active will get no further
    /// instance report, so it is STOPPED (and destroyed when flagged) here.
    async fn shut_down(&self, mut deployment: Deployment) -> Result<StopOutcome> {
        if !deployment.state().is_rollback() {
            commit_state(
                self.events.as_ref(),
                &mut deployment,
                DeploymentState::ShuttingDown,
            )
            .await?;
        }

        let running = running_ids(&deployment);
        let round = request_stops(
            self.lifecycle.as_ref(),
            self.events.as_ref(),
            &mut deployment,
            &running,
        )
        .await?;

        let settled = deployment.is_destroyable();
        if settled && deployment.state() == DeploymentState::ShuttingDown {
            commit_state(self.events.as_ref(), &mut deployment, DeploymentState::Stopped).await?;
        }
        if settled
            && deployment.scheduled_for_deletion
            && deployment.state().is_terminal()
            && self.config.destroy_on_terminal
        {
            self.destroy(&deployment).await?;
            return Ok(StopOutcome::Destroyed);
        }

        let deployment_id = deployment.id.clone();
        self.store.save(&deployment).await?;

        info!(
            requested = round.requested,
            scheduled_for_deletion = deployment.scheduled_for_deletion,
            state = %deployment.state(),
            "Deployment shutting down"
        );

        match round.failures.into_iter().next() {
            Some((instance, reason)) => Err(DeploymentError::Stop {
                deployment: deployment_id,
                instance,
                reason,
            }),
            None if settled => Ok(StopOutcome::Stopped),
            None => Ok(StopOutcome::Stopping {
                requested: round.requested,
            }),
        }
    }

    /// Cascading delete of the deployment, its instances and its events
    async fn destroy(&self, deployment: &Deployment) -> Result<()> {
        self.store.delete(&deployment.id).await?;
        self.events.purge(&deployment.id).await?;
        self.locks.remove(&deployment.id);
        info!(deployment_id = %deployment.id, state = %deployment.state(), "Deployment destroyed");
        Ok(())
    }

    async fn load(&self, deployment_id: &DeploymentId) -> Result<Deployment> {
        self.store
            .get(deployment_id)
            .await?
            .ok_or_else(|| DeploymentError::NotFound(deployment_id.clone()))
    }

    fn lock_for(&self, deployment_id: &DeploymentId) -> Arc<Mutex<()>> {
        self.locks
            .entry(deployment_id.clone())
            .or_default()
            .value()
            .clone()
    }
}

/// Matcher reasons first, then selector reasons, without repeats
fn merge_reasons(
    matcher: Vec<RejectionReason>,
    selector: Vec<RejectionReason>,
) -> Vec<RejectionReason> {
    let mut merged: Vec<RejectionReason> = Vec::with_capacity(matcher.len() + selector.len());
    for reason in matcher.into_iter().chain(selector) {
        if !merged.contains(&reason) {
            merged.push(reason);
        }
    }
    merged
}

fn describe(deployment: &Deployment, instance: &InstanceId, reason: &str) -> String {
    match deployment.instance(instance) {
        Some(instance) => format!("{}: {}", instance.name, reason),
        None => reason.to_string(),
    }
}
