//! Deployable manifest
//!
//! The manifest is the already-parsed, ordered list of assemblies. Parsing
//! and template substitution happen upstream; the orchestrator only reads it.

use crate::{HardwareProfile, ImageId, RealmId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Ordered specification of the assemblies making up a deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentManifest {
    /// Manifest name
    pub name: String,

    /// Assemblies in launch order
    #[serde(default)]
    pub assemblies: Vec<AssemblySpec>,
}

impl DeploymentManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assemblies: Vec::new(),
        }
    }

    pub fn with_assembly(mut self, assembly: AssemblySpec) -> Self {
        self.assemblies.push(assembly);
        self
    }

    /// Assembly names appearing more than once, in manifest order
    pub fn duplicate_assemblies(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for assembly in &self.assemblies {
            if !seen.insert(assembly.name.as_str()) && !duplicates.contains(&assembly.name.as_str())
            {
                duplicates.push(assembly.name.as_str());
            }
        }
        duplicates
    }
}

/// One named unit of a manifest, mapped 1:1 to an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySpec {
    /// Assembly name, unique within the manifest
    pub name: String,

    /// Requested hardware profile
    pub hardware_profile: HardwareProfile,

    /// Requested front-end image
    pub image: ImageId,

    /// Realm constraint, if any
    #[serde(default)]
    pub realm: Option<RealmId>,

    /// Launch parameter values supplied with the request
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Launch parameters the assembly cannot start without
    #[serde(default)]
    pub required_parameters: Vec<String>,
}

impl AssemblySpec {
    pub fn new(
        name: impl Into<String>,
        hardware_profile: HardwareProfile,
        image: impl Into<ImageId>,
    ) -> Self {
        Self {
            name: name.into(),
            hardware_profile,
            image: image.into(),
            realm: None,
            parameters: BTreeMap::new(),
            required_parameters: Vec::new(),
        }
    }

    pub fn in_realm(mut self, realm: impl Into<RealmId>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn requires_parameter(mut self, key: impl Into<String>) -> Self {
        self.required_parameters.push(key.into());
        self
    }

    /// Required parameters without a non-empty value
    pub fn missing_parameters(&self) -> Vec<&str> {
        self.required_parameters
            .iter()
            .filter(|key| {
                self.parameters
                    .get(key.as_str())
                    .map_or(true, |value| value.trim().is_empty())
            })
            .map(String::as_str)
            .collect()
    }
}
