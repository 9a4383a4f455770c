//! Instance matcher
//!
//! Pairs one instance with every provider account able to host it. Matching
//! is pure over a snapshot of the pool family's accounts; failing to match is
//! reported as data, never as an error.

use flotilla_types::{sort_by_priority, Instance, Match, ProviderAccount, RejectionReason};
use tracing::debug;

/// Candidates and rejections for one instance
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Valid placements, in account priority order
    pub candidates: Vec<Match>,

    /// Why the remaining accounts were rejected
    pub rejections: Vec<RejectionReason>,
}

impl MatchOutcome {
    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Candidate lists for a whole instance set, aligned with the input order
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    pub candidates_per_instance: Vec<Vec<Match>>,
    pub rejections: Vec<RejectionReason>,
}

impl MatchSet {
    /// Every instance has at least one candidate
    pub fn is_complete(&self) -> bool {
        self.candidates_per_instance.iter().all(|c| !c.is_empty())
    }
}

/// Matches instances against a snapshot of provider accounts
#[derive(Debug, Clone)]
pub struct InstanceMatcher {
    accounts: Vec<ProviderAccount>,
}

impl InstanceMatcher {
    /// Create a matcher over `accounts`; they are kept in priority order
    pub fn new(mut accounts: Vec<ProviderAccount>) -> Self {
        sort_by_priority(&mut accounts);
        Self { accounts }
    }

    /// Accounts in priority order
    pub fn accounts(&self) -> &[ProviderAccount] {
        &self.accounts
    }

    /// Find every account able to host `instance`
    pub fn find_candidates(&self, instance: &Instance) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        for account in &self.accounts {
            match self.match_account(instance, account) {
                Ok(candidate) => outcome.candidates.push(candidate),
                Err(mut reasons) => outcome.rejections.append(&mut reasons),
            }
        }

        if outcome.candidates.is_empty() {
            outcome.rejections.push(RejectionReason::NoCandidates {
                instance: instance.id.clone(),
                assembly: instance.assembly.clone(),
            });
        }

        debug!(
            instance_id = %instance.id,
            candidates = outcome.candidates.len(),
            rejections = outcome.rejections.len(),
            "Matched instance"
        );

        outcome
    }

    /// Match a whole instance set, keeping per-instance alignment
    pub fn find_all(&self, instances: &[Instance]) -> MatchSet {
        let mut set = MatchSet::default();
        for instance in instances {
            let MatchOutcome {
                candidates,
                mut rejections,
            } = self.find_candidates(instance);
            set.candidates_per_instance.push(candidates);
            set.rejections.append(&mut rejections);
        }
        set
    }

    /// Check every constraint of one account, collecting all mismatches
    fn match_account(
        &self,
        instance: &Instance,
        account: &ProviderAccount,
    ) -> Result<Match, Vec<RejectionReason>> {
        if !account.enabled {
            return Err(vec![RejectionReason::AccountDisabled {
                account: account.id.clone(),
            }]);
        }

        let mut reasons = Vec::new();

        let profile = account.best_hardware_profile(&instance.hardware_profile);
        if profile.is_none() {
            reasons.push(RejectionReason::HardwareProfileUnavailable {
                instance: instance.id.clone(),
                assembly: instance.assembly.clone(),
                account: account.id.clone(),
                profile: instance.hardware_profile.name.clone(),
            });
        }

        let provider_image = account.provider_image(&instance.image);
        if provider_image.is_none() {
            reasons.push(RejectionReason::ImageUnavailable {
                instance: instance.id.clone(),
                assembly: instance.assembly.clone(),
                account: account.id.clone(),
                image: instance.image.clone(),
            });
        }

        if let Some(realm) = &instance.realm {
            if !account.realm_available(realm) {
                reasons.push(RejectionReason::RealmUnavailable {
                    instance: instance.id.clone(),
                    assembly: instance.assembly.clone(),
                    account: account.id.clone(),
                    realm: realm.clone(),
                });
            }
        }

        match (profile, provider_image) {
            (Some(profile), Some(provider_image)) if reasons.is_empty() => Ok(Match {
                instance_id: instance.id.clone(),
                account_id: account.id.clone(),
                hardware_profile: profile.clone(),
                provider_image: provider_image.to_string(),
                realm: instance.realm.clone(),
            }),
            _ => Err(reasons),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_types::{AssemblySpec, DeploymentId, HardwareProfile, ProviderRealm, RealmId};

    fn small() -> HardwareProfile {
        HardwareProfile::new("small", 1, 1024, 10, "x86_64")
    }

    fn instance(assembly: AssemblySpec) -> Instance {
        Instance::from_assembly(&DeploymentId::generate(), "web", &assembly)
    }

    fn account(id: &str, priority: i32) -> ProviderAccount {
        ProviderAccount::new(id, "default", priority)
            .with_hardware_profile(HardwareProfile::new("m1.small", 1, 2048, 20, "x86_64"))
            .with_image("fedora", format!("ami-{id}"))
            .with_realm("zone-a")
    }

    #[test]
    fn test_candidates_in_priority_order() {
        let matcher = InstanceMatcher::new(vec![account("b", 2), account("a", 1)]);
        let outcome = matcher.find_candidates(&instance(AssemblySpec::new("app", small(), "fedora")));

        let accounts: Vec<_> = outcome.candidates.iter().map(|m| m.account_id.as_str()).collect();
        assert_eq!(accounts, vec!["a", "b"]);
        assert!(outcome.rejections.is_empty());
        assert_eq!(outcome.candidates[0].provider_image, "ami-a");
        assert_eq!(outcome.candidates[0].hardware_profile.name, "m1.small");
    }

    #[test]
    fn test_every_constraint_is_reported() {
        let matcher = InstanceMatcher::new(vec![account("a", 1)]);
        let big = HardwareProfile::new("huge", 64, 1 << 20, 1000, "x86_64");
        let outcome = matcher.find_candidates(&instance(
            AssemblySpec::new("db", big, "debian").in_realm("zone-z"),
        ));

        assert!(!outcome.has_candidates());
        assert!(matches!(
            outcome.rejections[0],
            RejectionReason::HardwareProfileUnavailable { .. }
        ));
        assert!(matches!(
            outcome.rejections[1],
            RejectionReason::ImageUnavailable { .. }
        ));
        assert!(matches!(
            outcome.rejections[2],
            RejectionReason::RealmUnavailable { .. }
        ));
        assert!(matches!(
            outcome.rejections[3],
            RejectionReason::NoCandidates { .. }
        ));
    }

    #[test]
    fn test_unavailable_realm_and_disabled_account() {
        let mut down = account("down", 1);
        down.realms = vec![ProviderRealm {
            id: RealmId::new("zone-a"),
            available: false,
        }];
        let mut disabled = account("disabled", 0);
        disabled.enabled = false;

        let matcher = InstanceMatcher::new(vec![down, disabled, account("up", 3)]);
        let outcome = matcher.find_candidates(&instance(
            AssemblySpec::new("app", small(), "fedora").in_realm("zone-a"),
        ));

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].account_id.as_str(), "up");
        assert_eq!(
            outcome.candidates[0].realm.as_ref().map(RealmId::as_str),
            Some("zone-a")
        );
        assert!(matches!(
            outcome.rejections[0],
            RejectionReason::AccountDisabled { .. }
        ));
        assert!(matches!(
            outcome.rejections[1],
            RejectionReason::RealmUnavailable { .. }
        ));
    }

    #[test]
    fn test_find_all_keeps_alignment() {
        let matcher = InstanceMatcher::new(vec![account("a", 1)]);
        let instances = vec![
            instance(AssemblySpec::new("app", small(), "fedora")),
            instance(AssemblySpec::new("db", small(), "missing")),
        ];
        let set = matcher.find_all(&instances);

        assert_eq!(set.candidates_per_instance.len(), 2);
        assert_eq!(set.candidates_per_instance[0].len(), 1);
        assert!(set.candidates_per_instance[1].is_empty());
        assert!(!set.is_complete());
        assert_eq!(set.rejections.len(), 2);
    }
}
