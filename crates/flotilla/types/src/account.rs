//! Provider accounts and the placement catalog they expose
//!
//! A ProviderAccount is read-only from the orchestrator's point of view:
//! accounts are owned by their pool family and only consulted for matching.

use crate::{AccountId, ImageId, PoolFamilyId, RealmId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Hardware profile, either requested by an assembly or offered by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Profile name (e.g. `m1.small`)
    pub name: String,

    /// Virtual CPU count
    pub cpus: u32,

    /// Memory in megabytes
    pub memory_mb: u64,

    /// Root storage in gigabytes
    pub storage_gb: u64,

    /// CPU architecture (`x86_64`, `aarch64`, ...)
    pub architecture: String,
}

impl HardwareProfile {
    pub fn new(
        name: impl Into<String>,
        cpus: u32,
        memory_mb: u64,
        storage_gb: u64,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cpus,
            memory_mb,
            storage_gb,
            architecture: architecture.into(),
        }
    }

    /// Whether this (offered) profile can host the `requested` one
    pub fn satisfies(&self, requested: &HardwareProfile) -> bool {
        self.architecture == requested.architecture
            && self.cpus >= requested.cpus
            && self.memory_mb >= requested.memory_mb
            && self.storage_gb >= requested.storage_gb
    }

    fn size_key(&self) -> (u32, u64, u64) {
        (self.cpus, self.memory_mb, self.storage_gb)
    }
}

/// A realm as exposed by one provider account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRealm {
    pub id: RealmId,

    /// Realms can be temporarily unavailable on the provider side
    #[serde(default = "default_true")]
    pub available: bool,
}

impl ProviderRealm {
    pub fn new(id: impl Into<RealmId>) -> Self {
        Self {
            id: id.into(),
            available: true,
        }
    }
}

impl From<&str> for ProviderRealm {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A set of provider credentials deployments can be placed on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// Unique account identifier
    pub id: AccountId,

    /// Human-readable label
    #[serde(default)]
    pub label: String,

    /// Provider type (`ec2`, `openstack`, `mock`, ...)
    #[serde(default)]
    pub provider: String,

    /// Pool family owning this account
    pub pool_family: PoolFamilyId,

    /// Priority rank, lower is preferred
    #[serde(default)]
    pub priority: i32,

    /// Disabled accounts never receive placements
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hardware profiles the provider offers through this account
    #[serde(default)]
    pub hardware_profiles: Vec<HardwareProfile>,

    /// Front-end image -> provider image identifier
    #[serde(default)]
    pub images: BTreeMap<ImageId, String>,

    /// Realms reachable through this account
    #[serde(default)]
    pub realms: Vec<ProviderRealm>,
}

impl ProviderAccount {
    /// Create an enabled account with an empty catalog
    pub fn new(id: impl Into<AccountId>, pool_family: impl Into<PoolFamilyId>, priority: i32) -> Self {
        let id = id.into();
        Self {
            label: id.as_str().to_string(),
            id,
            provider: String::new(),
            pool_family: pool_family.into(),
            priority,
            enabled: true,
            hardware_profiles: Vec::new(),
            images: BTreeMap::new(),
            realms: Vec::new(),
        }
    }

    pub fn with_hardware_profile(mut self, profile: HardwareProfile) -> Self {
        self.hardware_profiles.push(profile);
        self
    }

    pub fn with_image(mut self, image: impl Into<ImageId>, provider_image: impl Into<String>) -> Self {
        self.images.insert(image.into(), provider_image.into());
        self
    }

    pub fn with_realm(mut self, realm: impl Into<ProviderRealm>) -> Self {
        self.realms.push(realm.into());
        self
    }

    /// Smallest offered profile able to host `requested`
    pub fn best_hardware_profile(&self, requested: &HardwareProfile) -> Option<&HardwareProfile> {
        self.hardware_profiles
            .iter()
            .filter(|offered| offered.satisfies(requested))
            .min_by_key(|offered| offered.size_key())
    }

    /// Provider-side identifier of a front-end image, if pushed to this account
    pub fn provider_image(&self, image: &ImageId) -> Option<&str> {
        self.images.get(image).map(String::as_str)
    }

    /// Whether `realm` exists on this account and is currently available
    pub fn realm_available(&self, realm: &RealmId) -> bool {
        self.realms.iter().any(|r| &r.id == realm && r.available)
    }

    /// Deterministic priority ordering: rank first, identity breaks ties
    pub fn priority_cmp(&self, other: &ProviderAccount) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort accounts into selection order
pub fn sort_by_priority(accounts: &mut [ProviderAccount]) {
    accounts.sort_by(|a, b| a.priority_cmp(b));
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> HardwareProfile {
        HardwareProfile::new("small", 1, 1024, 10, "x86_64")
    }

    #[test]
    fn test_profile_satisfaction() {
        let large = HardwareProfile::new("large", 4, 8192, 80, "x86_64");
        assert!(large.satisfies(&small()));
        assert!(!small().satisfies(&large));

        let arm = HardwareProfile::new("arm", 8, 16384, 100, "aarch64");
        assert!(!arm.satisfies(&small()));
    }

    #[test]
    fn test_best_profile_is_smallest_fit() {
        let account = ProviderAccount::new("a", "default", 0)
            .with_hardware_profile(HardwareProfile::new("xl", 8, 32768, 200, "x86_64"))
            .with_hardware_profile(HardwareProfile::new("m", 2, 4096, 40, "x86_64"))
            .with_hardware_profile(HardwareProfile::new("xs", 1, 512, 5, "x86_64"));

        let best = account.best_hardware_profile(&small()).unwrap();
        assert_eq!(best.name, "m");
    }

    #[test]
    fn test_priority_ordering_breaks_ties_by_id() {
        let mut accounts = vec![
            ProviderAccount::new("zeta", "f", 1),
            ProviderAccount::new("beta", "f", 2),
            ProviderAccount::new("alpha", "f", 1),
        ];
        sort_by_priority(&mut accounts);
        let order: Vec<_> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["alpha", "zeta", "beta"]);
    }

    #[test]
    fn test_unavailable_realm() {
        let mut account = ProviderAccount::new("a", "f", 0).with_realm("us-east-1a");
        account.realms.push(ProviderRealm {
            id: RealmId::new("us-east-1b"),
            available: false,
        });
        assert!(account.realm_available(&RealmId::new("us-east-1a")));
        assert!(!account.realm_available(&RealmId::new("us-east-1b")));
        assert!(!account.realm_available(&RealmId::new("eu-west-1a")));
    }
}
