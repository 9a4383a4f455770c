//! Quota guard
//!
//! Quota policy is a black box to the orchestrator: it only asks whether
//! starting a set of instances would break a ceiling at a given scope.

use dashmap::DashMap;
use flotilla_types::{AccountId, Instance, PoolFamilyId, PoolId, QuotaScopeKind, UserId};
use serde::{Deserialize, Serialize};

/// Scope a quota question is asked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope<'a> {
    Pool(&'a PoolId),
    PoolFamily(&'a PoolFamilyId),
    Account(&'a AccountId),
    User(&'a UserId),
}

impl QuotaScope<'_> {
    pub fn kind(&self) -> QuotaScopeKind {
        match self {
            QuotaScope::Pool(_) => QuotaScopeKind::Pool,
            QuotaScope::PoolFamily(_) => QuotaScopeKind::PoolFamily,
            QuotaScope::Account(_) => QuotaScopeKind::Account,
            QuotaScope::User(_) => QuotaScopeKind::User,
        }
    }

    /// Raw identifier of the scope owner
    pub fn key(&self) -> &str {
        match self {
            QuotaScope::Pool(id) => id.as_str(),
            QuotaScope::PoolFamily(id) => id.as_str(),
            QuotaScope::Account(id) => id.as_str(),
            QuotaScope::User(id) => id.as_str(),
        }
    }
}

/// Resource ceiling predicate
///
/// Implementations must be side-effect free: answering never reserves
/// capacity.
pub trait QuotaGuard: Send + Sync {
    /// Whether starting `instances` keeps `scope` within its ceiling
    fn can_start(&self, scope: QuotaScope<'_>, instances: &[Instance]) -> bool;

    /// Guard name for logging
    fn name(&self) -> &str;
}

/// Guard that never objects
pub struct UnlimitedQuota;

impl QuotaGuard for UnlimitedQuota {
    fn can_start(&self, _scope: QuotaScope<'_>, _instances: &[Instance]) -> bool {
        true
    }

    fn name(&self) -> &str {
        "unlimited"
    }
}

/// Instance-count quota for one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Ceiling on running instances, None for unlimited
    #[serde(default)]
    pub maximum_running_instances: Option<u32>,

    /// Instances currently counted against the ceiling
    #[serde(default)]
    pub running_instances: u32,
}

impl Quota {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn limited(maximum: u32) -> Self {
        Self {
            maximum_running_instances: Some(maximum),
            running_instances: 0,
        }
    }

    pub fn with_running(mut self, running: u32) -> Self {
        self.running_instances = running;
        self
    }

    /// Whether `count` more instances fit under the ceiling
    pub fn can_start(&self, count: usize) -> bool {
        match self.maximum_running_instances {
            None => true,
            Some(max) => (self.running_instances as u64 + count as u64) <= max as u64,
        }
    }
}

/// In-memory quota table keyed by scope
///
/// Scopes without an entry are unlimited.
pub struct InMemoryQuotaGuard {
    quotas: DashMap<(QuotaScopeKind, String), Quota>,
}

impl InMemoryQuotaGuard {
    pub fn new() -> Self {
        Self {
            quotas: DashMap::new(),
        }
    }

    pub fn set_quota(&self, scope: QuotaScope<'_>, quota: Quota) {
        self.quotas
            .insert((scope.kind(), scope.key().to_string()), quota);
    }

    pub fn quota(&self, scope: QuotaScope<'_>) -> Option<Quota> {
        self.quotas
            .get(&(scope.kind(), scope.key().to_string()))
            .map(|q| *q)
    }

}

impl Default for InMemoryQuotaGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaGuard for InMemoryQuotaGuard {
    fn can_start(&self, scope: QuotaScope<'_>, instances: &[Instance]) -> bool {
        self.quota(scope)
            .map_or(true, |quota| quota.can_start(instances.len()))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_ceiling() {
        let quota = Quota::limited(3).with_running(1);
        assert!(quota.can_start(2));
        assert!(!quota.can_start(3));
        assert!(Quota::unlimited().can_start(10_000));
    }

    #[test]
    fn test_guard_scopes_are_independent() {
        let guard = InMemoryQuotaGuard::new();
        let pool = PoolId::new("shared");
        let user = UserId::new("shared");
        guard.set_quota(QuotaScope::Pool(&pool), Quota::limited(0));

        assert!(guard.can_start(QuotaScope::User(&user), &[]));
        assert_eq!(guard.quota(QuotaScope::User(&user)), None);
        assert_eq!(
            guard.quota(QuotaScope::Pool(&pool)),
            Some(Quota::limited(0))
        );
    }
}
