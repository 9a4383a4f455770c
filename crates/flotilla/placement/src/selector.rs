//! Account selector
//!
//! Picks the single provider account that hosts an entire deployment.
//! Accounts are tried strictly in priority order; the first one that is a
//! candidate for every instance and passes every quota scope wins. There is
//! no backtracking and no "best fit" scoring: priority expresses operator
//! preference and outranks any capacity heuristic.
//!
//! ## Consistency boundary
//!
//! Quota is only *checked* here, never reserved. Two deployments racing for
//! the same account can both pass the check and jointly exceed the ceiling
//! once launched. Providers re-check their own limits, so quota is treated
//! as advisory and eventually consistent rather than atomic with the launch.

use crate::quota::{QuotaGuard, QuotaScope};
use flotilla_types::{
    AccountId, Instance, InstanceId, Match, PoolFamilyId, PoolId, ProviderAccount,
    RejectionReason, UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Who is asking and which pool the capacity comes from
#[derive(Debug, Clone, Copy)]
pub struct SelectionScope<'a> {
    pub pool: &'a PoolId,
    pub pool_family: &'a PoolFamilyId,
    pub user: &'a UserId,
}

/// A committed all-or-nothing placement
#[derive(Debug, Clone)]
pub struct Selection {
    /// The one account hosting every instance
    pub account: ProviderAccount,

    /// Placement per instance, all on `account`
    pub assignment: BTreeMap<InstanceId, Match>,
}

impl Selection {
    pub fn account_id(&self) -> &AccountId {
        &self.account.id
    }

    pub fn placement_for(&self, instance: &InstanceId) -> Option<&Match> {
        self.assignment.get(instance)
    }
}

/// Selects one account for a whole instance set
pub struct AccountSelector {
    quota: Arc<dyn QuotaGuard>,
}

impl AccountSelector {
    pub fn new(quota: Arc<dyn QuotaGuard>) -> Self {
        Self { quota }
    }

    /// Select the highest-priority account able to host every instance.
    ///
    /// `candidates_per_instance[i]` holds the matches of `instances[i]`. On
    /// failure the reasons of every account considered are returned, not
    /// only those of the last one.
    pub fn select(
        &self,
        candidates_per_instance: &[Vec<Match>],
        accounts_by_priority: &[ProviderAccount],
        instances: &[Instance],
        scope: SelectionScope<'_>,
    ) -> Result<Selection, Vec<RejectionReason>> {
        if accounts_by_priority.is_empty() {
            return Err(vec![RejectionReason::NoProviderAccounts]);
        }

        let mut ordered: Vec<&ProviderAccount> = accounts_by_priority.iter().collect();
        ordered.sort_by(|a, b| a.priority_cmp(b));

        let mut reasons = Vec::new();

        for account in ordered {
            let assignment = match Self::assignment_on(account, candidates_per_instance, instances)
            {
                Ok(assignment) => assignment,
                Err(mut missing) => {
                    debug!(account_id = %account.id, missing = missing.len(), "Account skipped");
                    reasons.append(&mut missing);
                    continue;
                }
            };

            let quota_reasons = self.quota_violations(account, instances, scope);
            if !quota_reasons.is_empty() {
                debug!(account_id = %account.id, "Account rejected on quota");
                reasons.extend(quota_reasons);
                continue;
            }

            info!(
                account_id = %account.id,
                instances = instances.len(),
                "Account selected for deployment"
            );
            return Ok(Selection {
                account: account.clone(),
                assignment,
            });
        }

        Err(reasons)
    }

    /// The account's match for every instance, or the instances it misses
    fn assignment_on(
        account: &ProviderAccount,
        candidates_per_instance: &[Vec<Match>],
        instances: &[Instance],
    ) -> Result<BTreeMap<InstanceId, Match>, Vec<RejectionReason>> {
        let mut assignment = BTreeMap::new();
        let mut missing = Vec::new();

        for (index, instance) in instances.iter().enumerate() {
            let found = candidates_per_instance
                .get(index)
                .and_then(|candidates| candidates.iter().find(|m| m.account_id == account.id));

            match found {
                Some(candidate) => {
                    assignment.insert(instance.id.clone(), candidate.clone());
                }
                None => missing.push(RejectionReason::MissingCandidate {
                    instance: instance.id.clone(),
                    assembly: instance.assembly.clone(),
                    account: account.id.clone(),
                }),
            }
        }

        if missing.is_empty() {
            Ok(assignment)
        } else {
            Err(missing)
        }
    }

    /// Pool, pool family, user and account checks, in that order
    fn quota_violations(
        &self,
        account: &ProviderAccount,
        instances: &[Instance],
        scope: SelectionScope<'_>,
    ) -> Vec<RejectionReason> {
        [
            QuotaScope::Pool(scope.pool),
            QuotaScope::PoolFamily(scope.pool_family),
            QuotaScope::User(scope.user),
            QuotaScope::Account(&account.id),
        ]
        .into_iter()
        .filter(|quota_scope| !self.quota.can_start(*quota_scope, instances))
        .map(|quota_scope| RejectionReason::QuotaExceeded {
            account: account.id.clone(),
            scope: quota_scope.kind(),
            scope_id: quota_scope.key().to_string(),
        })
        .collect()
    }
}
