//! Scenario simulation
//!
//! Wires a DeploymentManager to in-memory collaborators, launches the
//! scenario's manifest and replays the scripted provider reports.

use crate::scenario::Scenario;
use flotilla_deployment::{
    AllowAllPermissions, DeploymentManager, DeploymentRequest, HardwareProfileAllowList,
    InMemoryAccountCatalog, InMemoryDeploymentStore, InMemoryEventLog, LifecycleError,
    OrchestratorConfig, PermissionGate, ScriptedLifecycle,
};
use flotilla_types::{Deployment, DeploymentId, Event};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

/// Outcome of one simulated scenario
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub deployment_id: Option<DeploymentId>,

    /// Final deployment, None if it was never created or got destroyed
    pub deployment: Option<Deployment>,

    /// Creation, launch and report errors, in order
    pub errors: Vec<String>,

    /// Every event appended during the run, destroyed history included
    pub events: Vec<Event>,

    pub destroyed: bool,
}

/// Run `scenario` to completion
pub async fn run(scenario: Scenario, config: OrchestratorConfig) -> anyhow::Result<SimulationReport> {
    let events = Arc::new(InMemoryEventLog::for_config(&config));
    let mut trail = events.subscribe();

    let lifecycle = Arc::new(ScriptedLifecycle::new());
    for assembly in &scenario.failures.launch {
        lifecycle.fail_launch_of(
            assembly.clone(),
            LifecycleError::Rejected(format!("scripted launch failure of {assembly}")),
        );
    }
    for assembly in &scenario.failures.stop {
        lifecycle.fail_stop_of(
            assembly.clone(),
            LifecycleError::Rejected(format!("scripted stop failure of {assembly}")),
        );
    }

    let permissions: Arc<dyn PermissionGate> = if scenario.permissions.is_empty() {
        Arc::new(AllowAllPermissions)
    } else {
        let allow_list = HardwareProfileAllowList::new();
        for entry in &scenario.permissions {
            allow_list.restrict(entry.user.clone(), entry.hardware_profiles.iter().cloned());
        }
        Arc::new(allow_list)
    };

    let manager = DeploymentManager::new(
        Arc::new(InMemoryDeploymentStore::new()),
        events.clone(),
        lifecycle,
        permissions,
        Arc::new(scenario.quota_guard()),
        Arc::new(InMemoryAccountCatalog::with_accounts(scenario.accounts.clone())),
        config,
    );

    let mut request = DeploymentRequest::new(scenario.manifest.clone(), scenario.user.clone())
        .in_pool(scenario.pool.clone(), scenario.pool_family.clone());
    if let Some(partial_launch) = scenario.partial_launch {
        request = request.with_partial_launch(partial_launch);
    }

    let mut report = SimulationReport {
        deployment_id: None,
        deployment: None,
        errors: Vec::new(),
        events: Vec::new(),
        destroyed: false,
    };

    let created = match manager.create_deployment(request).await {
        Ok(deployment) => deployment,
        Err(e) => {
            warn!(error = %e, "Deployment rejected");
            report.errors.push(e.to_string());
            return Ok(report);
        }
    };
    report.deployment_id = Some(created.id.clone());

    if let Err(e) = manager.launch(&created.id, &scenario.user).await {
        warn!(error = %e, "Launch failed");
        report.errors.push(e.to_string());
    }

    for event in &scenario.events {
        let Some(instance) = created.instances.iter().find(|i| i.assembly == event.assembly) else {
            report
                .errors
                .push(format!("no instance for assembly '{}'", event.assembly));
            continue;
        };

        match manager
            .apply_instance_state(&created.id, &instance.id, event.state)
            .await
        {
            Ok(state) => info!(
                assembly = %event.assembly,
                instance_state = %event.state,
                deployment_state = %state,
                "Provider report applied"
            ),
            Err(e) => {
                warn!(assembly = %event.assembly, error = %e, "Provider report rejected");
                report.errors.push(e.to_string());
            }
        }
    }

    report.deployment = manager.get(&created.id).await.ok();
    report.destroyed = report.deployment.is_none();

    loop {
        match trail.try_recv() {
            Ok(event) => report.events.push(event),
            Err(TryRecvError::Lagged(missed)) => {
                warn!(missed, "Event trail lagged");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    Ok(report)
}
