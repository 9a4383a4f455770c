//! Scenario files
//!
//! A scenario describes one simulated deployment: the provider accounts of
//! the pool family, quota ceilings, the manifest, which assemblies the fake
//! provider should fail, and the instance state changes it reports back.

use anyhow::Context;
use flotilla_placement::{InMemoryQuotaGuard, Quota, QuotaScope};
use flotilla_types::{
    AccountId, DeploymentManifest, InstanceState, PoolFamilyId, PoolId, ProviderAccount,
    QuotaScopeKind, UserId,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One simulated deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Requesting user
    pub user: UserId,

    #[serde(default = "default_pool")]
    pub pool: PoolId,

    #[serde(default = "default_pool_family")]
    pub pool_family: PoolFamilyId,

    /// Overrides the configured partial-launch default
    #[serde(default)]
    pub partial_launch: Option<bool>,

    pub manifest: DeploymentManifest,

    #[serde(default)]
    pub accounts: Vec<ProviderAccount>,

    #[serde(default)]
    pub quotas: Vec<QuotaEntry>,

    /// Hardware profiles each listed user is restricted to
    #[serde(default)]
    pub permissions: Vec<PermissionEntry>,

    #[serde(default)]
    pub failures: FailureScript,

    /// Provider state reports, replayed in order after the launch
    #[serde(default)]
    pub events: Vec<ProviderEvent>,
}

/// Quota ceiling for one scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaEntry {
    pub scope: QuotaScopeKind,
    pub id: String,
    #[serde(flatten)]
    pub quota: Quota,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub user: UserId,
    pub hardware_profiles: Vec<String>,
}

/// Assemblies whose provider requests fail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureScript {
    #[serde(default)]
    pub launch: Vec<String>,
    #[serde(default)]
    pub stop: Vec<String>,
}

/// A provider-reported state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub assembly: String,
    pub state: InstanceState,
}

fn default_pool() -> PoolId {
    PoolId::new("default")
}

fn default_pool_family() -> PoolFamilyId {
    PoolFamilyId::new("default")
}

impl Scenario {
    /// Read a TOML scenario file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Quota guard holding every configured ceiling
    pub fn quota_guard(&self) -> InMemoryQuotaGuard {
        let guard = InMemoryQuotaGuard::new();
        for entry in &self.quotas {
            let quota = entry.quota;
            match entry.scope {
                QuotaScopeKind::Pool => {
                    guard.set_quota(QuotaScope::Pool(&PoolId::new(entry.id.as_str())), quota)
                }
                QuotaScopeKind::PoolFamily => guard.set_quota(
                    QuotaScope::PoolFamily(&PoolFamilyId::new(entry.id.as_str())),
                    quota,
                ),
                QuotaScopeKind::Account => guard.set_quota(
                    QuotaScope::Account(&AccountId::new(entry.id.as_str())),
                    quota,
                ),
                QuotaScopeKind::User => {
                    guard.set_quota(QuotaScope::User(&UserId::new(entry.id.as_str())), quota)
                }
            }
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_placement::QuotaGuard;

    const SCENARIO: &str = r#"
user = "alice"

[manifest]
name = "two-tier"

[[manifest.assemblies]]
name = "db"
image = "fedora"
hardware_profile = { name = "small", cpus = 1, memory_mb = 1024, storage_gb = 10, architecture = "x86_64" }

[[accounts]]
id = "east"
pool_family = "default"
priority = 1
images = { fedora = "ami-123" }
hardware_profiles = [{ name = "m1.small", cpus = 2, memory_mb = 2048, storage_gb = 20, architecture = "x86_64" }]

[[quotas]]
scope = "user"
id = "alice"
maximum_running_instances = 0

[failures]
launch = ["db"]

[[events]]
assembly = "db"
state = "running"
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::parse(SCENARIO).unwrap();

        assert_eq!(scenario.user.as_str(), "alice");
        assert_eq!(scenario.pool.as_str(), "default");
        assert_eq!(scenario.manifest.assemblies.len(), 1);
        assert_eq!(scenario.accounts[0].priority, 1);
        assert!(scenario.accounts[0].enabled);
        assert_eq!(scenario.failures.launch, vec!["db"]);
        assert!(scenario.failures.stop.is_empty());
        assert_eq!(scenario.events[0].state, InstanceState::Running);
    }

    #[test]
    fn test_quota_guard_from_entries() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let guard = scenario.quota_guard();

        let quota = guard.quota(QuotaScope::User(&UserId::new("alice"))).unwrap();
        assert_eq!(quota.maximum_running_instances, Some(0));
        assert!(guard.can_start(QuotaScope::User(&UserId::new("bob")), &[]));
    }

    #[test]
    fn test_invalid_scenario() {
        assert!(Scenario::parse("user = 3").is_err());
    }
}
