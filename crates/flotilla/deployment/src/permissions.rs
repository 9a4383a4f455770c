//! Hardware profile permissions

use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{HardwareProfile, PoolId, UserId};
use std::collections::HashSet;

/// Permission gate consulted while building instances
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// May `user` launch instances of `profile` in `pool`
    async fn can_use_hardware_profile(
        &self,
        user: &UserId,
        pool: &PoolId,
        profile: &HardwareProfile,
    ) -> bool;

    /// Get the permission gate name
    fn name(&self) -> &str;
}

/// Default permission gate that allows everything
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionGate for AllowAllPermissions {
    async fn can_use_hardware_profile(
        &self,
        _user: &UserId,
        _pool: &PoolId,
        _profile: &HardwareProfile,
    ) -> bool {
        true
    }

    fn name(&self) -> &str {
        "allow-all"
    }
}

/// Per-user allow list of hardware profile names.
///
/// Users without an entry may use every profile.
#[derive(Default)]
pub struct HardwareProfileAllowList {
    allowed: DashMap<UserId, HashSet<String>>,
}

impl HardwareProfileAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `user` to the given profile names
    pub fn restrict<I, S>(&self, user: UserId, profiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .insert(user, profiles.into_iter().map(Into::into).collect());
    }
}

#[async_trait]
impl PermissionGate for HardwareProfileAllowList {
    async fn can_use_hardware_profile(
        &self,
        user: &UserId,
        _pool: &PoolId,
        profile: &HardwareProfile,
    ) -> bool {
        self.allowed
            .get(user)
            .map(|allowed| allowed.contains(&profile.name))
            .unwrap_or(true)
    }

    fn name(&self) -> &str {
        "hardware-profile-allow-list"
    }
}
