//! Instance builder
//!
//! Turns a manifest into the NEW instances of a deployment. Building is
//! atomic: every problem in the manifest is collected and reported at once,
//! and no instance is produced unless the manifest is clean.

use crate::error::ValidationError;
use crate::permissions::PermissionGate;
use flotilla_types::{Deployment, Instance, UserId};
use tracing::debug;

/// Validate `deployment`'s manifest and build one instance per assembly,
/// in manifest order.
pub async fn build_instances(
    deployment: &Deployment,
    user: &UserId,
    permissions: &dyn PermissionGate,
) -> Result<Vec<Instance>, Vec<ValidationError>> {
    let manifest = &deployment.manifest;
    let mut errors = Vec::new();

    if manifest.assemblies.is_empty() {
        errors.push(ValidationError::EmptyManifest(manifest.name.clone()));
    }

    for name in manifest.duplicate_assemblies() {
        errors.push(ValidationError::DuplicateAssembly(name.to_string()));
    }

    for assembly in &manifest.assemblies {
        for parameter in assembly.missing_parameters() {
            errors.push(ValidationError::MissingParameter {
                assembly: assembly.name.clone(),
                parameter: parameter.to_string(),
            });
        }

        if !permissions
            .can_use_hardware_profile(user, &deployment.pool, &assembly.hardware_profile)
            .await
        {
            errors.push(ValidationError::HardwareProfileNotPermitted {
                assembly: assembly.name.clone(),
                profile: assembly.hardware_profile.name.clone(),
                user: user.clone(),
            });
        }
    }

    if !errors.is_empty() {
        debug!(
            deployment_id = %deployment.id,
            errors = errors.len(),
            "Manifest rejected"
        );
        return Err(errors);
    }

    Ok(manifest
        .assemblies
        .iter()
        .map(|assembly| Instance::from_assembly(&deployment.id, &deployment.name, assembly))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{AllowAllPermissions, HardwareProfileAllowList};
    use flotilla_types::{
        AssemblySpec, DeploymentManifest, HardwareProfile, InstanceState, PoolFamilyId, PoolId,
    };

    fn small() -> HardwareProfile {
        HardwareProfile::new("small", 1, 1024, 10, "x86_64")
    }

    fn deployment(manifest: DeploymentManifest) -> Deployment {
        Deployment::new(
            "web",
            PoolId::new("default"),
            PoolFamilyId::new("default"),
            UserId::new("alice"),
            manifest,
        )
    }

    #[tokio::test]
    async fn test_builds_instances_in_manifest_order() {
        let d = deployment(
            DeploymentManifest::new("web")
                .with_assembly(AssemblySpec::new("db", small(), "fedora"))
                .with_assembly(
                    AssemblySpec::new("app", small(), "fedora").with_parameter("port", "8080"),
                ),
        );

        let instances = build_instances(&d, &UserId::new("alice"), &AllowAllPermissions)
            .await
            .unwrap();

        let names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["web/db", "web/app"]);
        assert!(instances.iter().all(|i| i.state == InstanceState::New));
        assert!(instances.iter().all(|i| i.deployment_id == d.id));
        assert_eq!(
            instances[1].launch_parameters.get("port").map(String::as_str),
            Some("8080")
        );
    }

    #[tokio::test]
    async fn test_collects_every_problem() {
        let gate = HardwareProfileAllowList::new();
        gate.restrict(UserId::new("alice"), ["tiny"]);

        let d = deployment(
            DeploymentManifest::new("web")
                .with_assembly(AssemblySpec::new("app", small(), "fedora").requires_parameter("port"))
                .with_assembly(AssemblySpec::new("app", small(), "fedora")),
        );

        let errors = build_instances(&d, &UserId::new("alice"), &gate)
            .await
            .unwrap_err();

        assert!(errors.contains(&ValidationError::DuplicateAssembly("app".into())));
        assert!(errors.contains(&ValidationError::MissingParameter {
            assembly: "app".into(),
            parameter: "port".into(),
        }));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::HardwareProfileNotPermitted { .. }))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_empty_manifest_rejected() {
        let d = deployment(DeploymentManifest::new("empty"));
        let errors = build_instances(&d, &UserId::new("alice"), &AllowAllPermissions)
            .await
            .unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyManifest("empty".into())]);
    }
}
