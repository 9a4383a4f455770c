//! Placement candidates and rejection reasons
//!
//! Matches are ephemeral: produced by the matcher, consumed by the account
//! selector, never persisted. Rejection reasons are plain data so that every
//! reason from every instance and account can be collected and reported once.

use crate::{AccountId, HardwareProfile, ImageId, InstanceId, RealmId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A candidate pairing of one instance with one provider account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Instance being placed
    pub instance_id: InstanceId,

    /// Candidate account
    pub account_id: AccountId,

    /// Offered hardware profile that satisfies the request
    pub hardware_profile: HardwareProfile,

    /// Provider-side image identifier
    pub provider_image: String,

    /// Realm, when the instance requested one
    pub realm: Option<RealmId>,
}

/// Scope a quota ceiling applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScopeKind {
    Pool,
    PoolFamily,
    Account,
    User,
}

impl fmt::Display for QuotaScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuotaScopeKind::Pool => "pool",
            QuotaScopeKind::PoolFamily => "pool family",
            QuotaScopeKind::Account => "account",
            QuotaScopeKind::User => "user",
        };
        f.write_str(name)
    }
}

/// Why a candidate or an account was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("no provider accounts are available in the pool family")]
    NoProviderAccounts,

    #[error("{account} is disabled")]
    AccountDisabled { account: AccountId },

    #[error("{account} offers no hardware profile matching '{profile}' for assembly '{assembly}'")]
    HardwareProfileUnavailable {
        instance: InstanceId,
        assembly: String,
        account: AccountId,
        profile: String,
    },

    #[error("{image} is not available on {account} for assembly '{assembly}'")]
    ImageUnavailable {
        instance: InstanceId,
        assembly: String,
        account: AccountId,
        image: ImageId,
    },

    #[error("{realm} is not available on {account} for assembly '{assembly}'")]
    RealmUnavailable {
        instance: InstanceId,
        assembly: String,
        account: AccountId,
        realm: RealmId,
    },

    #[error("no provider account can host assembly '{assembly}'")]
    NoCandidates { instance: InstanceId, assembly: String },

    #[error("{account} is not a candidate for assembly '{assembly}'")]
    MissingCandidate {
        instance: InstanceId,
        assembly: String,
        account: AccountId,
    },

    #[error("starting the deployment on {account} would exceed the {scope} quota of '{scope_id}'")]
    QuotaExceeded {
        account: AccountId,
        scope: QuotaScopeKind,
        scope_id: String,
    },
}

impl RejectionReason {
    /// Quota rejections as opposed to constraint mismatches
    pub fn is_quota(&self) -> bool {
        matches!(self, RejectionReason::QuotaExceeded { .. })
    }

    /// Account the reason refers to, if any
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            RejectionReason::NoProviderAccounts | RejectionReason::NoCandidates { .. } => None,
            RejectionReason::AccountDisabled { account }
            | RejectionReason::HardwareProfileUnavailable { account, .. }
            | RejectionReason::ImageUnavailable { account, .. }
            | RejectionReason::RealmUnavailable { account, .. }
            | RejectionReason::MissingCandidate { account, .. }
            | RejectionReason::QuotaExceeded { account, .. } => Some(account),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_reason_message() {
        let reason = RejectionReason::QuotaExceeded {
            account: AccountId::new("ec2"),
            scope: QuotaScopeKind::PoolFamily,
            scope_id: "default".into(),
        };
        assert!(reason.is_quota());
        assert_eq!(
            reason.to_string(),
            "starting the deployment on account:ec2 would exceed the pool family quota of 'default'"
        );
    }

    #[test]
    fn test_reason_account() {
        assert_eq!(RejectionReason::NoProviderAccounts.account(), None);
        let reason = RejectionReason::AccountDisabled {
            account: AccountId::new("x"),
        };
        assert_eq!(reason.account(), Some(&AccountId::new("x")));
    }
}
