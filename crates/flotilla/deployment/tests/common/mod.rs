//! Shared fixtures for deployment scenario tests

#![allow(dead_code)]

use flotilla_deployment::{
    DeploymentManager, DeploymentRequest, EventLog, InMemoryAccountCatalog,
    InMemoryDeploymentStore, InMemoryEventLog, OrchestratorConfig, ScriptedLifecycle,
    AllowAllPermissions,
};
use flotilla_placement::InMemoryQuotaGuard;
use flotilla_types::{
    AssemblySpec, Deployment, DeploymentId, DeploymentManifest, DeploymentState, EventStatus,
    HardwareProfile, InstanceState, ProviderAccount, UserId,
};
use std::sync::Arc;

pub struct Fixture {
    pub manager: Arc<DeploymentManager>,
    pub store: Arc<InMemoryDeploymentStore>,
    pub events: Arc<InMemoryEventLog>,
    pub lifecycle: Arc<ScriptedLifecycle>,
    pub quota: Arc<InMemoryQuotaGuard>,
    pub catalog: Arc<InMemoryAccountCatalog>,
}

impl Fixture {
    /// One account able to host up to 4 cpus
    pub fn new() -> Self {
        Self::with_accounts(OrchestratorConfig::default(), vec![account("a", 1, 4)])
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self::with_accounts(config, vec![account("a", 1, 4)])
    }

    pub fn with_accounts(config: OrchestratorConfig, accounts: Vec<ProviderAccount>) -> Self {
        let store = Arc::new(InMemoryDeploymentStore::new());
        let events = Arc::new(InMemoryEventLog::for_config(&config));
        let lifecycle = Arc::new(ScriptedLifecycle::new());
        let quota = Arc::new(InMemoryQuotaGuard::new());
        let catalog = Arc::new(InMemoryAccountCatalog::with_accounts(accounts));

        let manager = Arc::new(DeploymentManager::new(
            store.clone(),
            events.clone(),
            lifecycle.clone(),
            Arc::new(AllowAllPermissions),
            quota.clone(),
            catalog.clone(),
            config,
        ));

        Self {
            manager,
            store,
            events,
            lifecycle,
            quota,
            catalog,
        }
    }

    /// Deployment state changes, in commit order
    pub async fn state_trail(&self, id: &DeploymentId) -> Vec<DeploymentState> {
        self.statuses(id)
            .await
            .into_iter()
            .filter_map(|s| s.state())
            .collect()
    }

    pub async fn statuses(&self, id: &DeploymentId) -> Vec<EventStatus> {
        self.events
            .events_for(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect()
    }

    /// Report a provider state for the instance built from `assembly`
    pub async fn report(
        &self,
        deployment: &Deployment,
        assembly: &str,
        state: InstanceState,
    ) -> DeploymentState {
        let instance = deployment
            .instances
            .iter()
            .find(|i| i.assembly == assembly)
            .unwrap_or_else(|| panic!("no instance for assembly {assembly}"));
        self.manager
            .apply_instance_state(&deployment.id, &instance.id, state)
            .await
            .unwrap()
    }

    pub async fn reload(&self, id: &DeploymentId) -> Deployment {
        self.manager.get(id).await.unwrap()
    }
}

pub fn profile(cpus: u32) -> HardwareProfile {
    HardwareProfile::new(format!("cpu{cpus}"), cpus, 1024 * cpus as u64, 10, "x86_64")
}

pub fn account(id: &str, priority: i32, max_cpus: u32) -> ProviderAccount {
    ProviderAccount::new(id, "default", priority)
        .with_hardware_profile(profile(max_cpus))
        .with_image("fedora", format!("ami-{id}"))
}

pub fn alice() -> UserId {
    UserId::new("alice")
}

/// Manifest of (assembly, cpus) pairs
pub fn manifest(assemblies: &[(&str, u32)]) -> DeploymentManifest {
    assemblies
        .iter()
        .fold(DeploymentManifest::new("web"), |manifest, (name, cpus)| {
            manifest.with_assembly(AssemblySpec::new(*name, profile(*cpus), "fedora"))
        })
}

pub fn request(assemblies: &[(&str, u32)]) -> DeploymentRequest {
    DeploymentRequest::new(manifest(assemblies), alice())
}
