//! Provider account catalog
//!
//! Source of the account snapshot a launch attempt is placed against.

use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{sort_by_priority, AccountId, PoolFamilyId, ProviderAccount};

/// Provider accounts grouped by pool family
#[async_trait]
pub trait AccountCatalog: Send + Sync {
    /// Accounts of `family`, in priority order
    async fn accounts(&self, family: &PoolFamilyId) -> Vec<ProviderAccount>;
}

/// In-memory account catalog
#[derive(Default)]
pub struct InMemoryAccountCatalog {
    accounts: DashMap<AccountId, ProviderAccount>,
}

impl InMemoryAccountCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of accounts
    pub fn with_accounts(accounts: impl IntoIterator<Item = ProviderAccount>) -> Self {
        let catalog = Self::new();
        for account in accounts {
            catalog.register(account);
        }
        catalog
    }

    /// Register or replace an account
    pub fn register(&self, account: ProviderAccount) {
        self.accounts.insert(account.id.clone(), account);
    }

    /// Enable or disable an account; returns false if unknown
    pub fn set_enabled(&self, id: &AccountId, enabled: bool) -> bool {
        match self.accounts.get_mut(id) {
            Some(mut account) => {
                account.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountCatalog for InMemoryAccountCatalog {
    async fn accounts(&self, family: &PoolFamilyId) -> Vec<ProviderAccount> {
        let mut accounts: Vec<ProviderAccount> = self
            .accounts
            .iter()
            .filter(|a| &a.pool_family == family)
            .map(|a| a.clone())
            .collect();
        sort_by_priority(&mut accounts);
        accounts
    }
}
