//! Flotilla Types - Core types for deployment orchestration
//!
//! Flotilla brings up multi-instance cloud deployments: every assembly of a
//! manifest becomes an instance, the whole set is placed on one provider
//! account, launched, and tracked by a deployment-level state machine that
//! rolls back when the deployment cannot reach a fully running state.
//!
//! ## Key Concepts
//!
//! - **DeploymentManifest**: ordered assemblies to bring up
//! - **Deployment**: owns the instance arena and the aggregated state
//! - **Instance**: one assembly on one provider account
//! - **ProviderAccount**: a placement target with a catalog and a priority
//! - **Match**: ephemeral candidate pairing of instance and account
//! - **Event**: append-only lifecycle record

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod account;
pub mod deployment;
pub mod events;
pub mod ids;
pub mod instance;
pub mod manifest;
pub mod placement;

// Re-export main types
pub use account::{sort_by_priority, HardwareProfile, ProviderAccount, ProviderRealm};
pub use deployment::{all_running, Deployment, DeploymentState};
pub use events::{Event, EventSeverity, EventStatus};
pub use ids::{AccountId, DeploymentId, ImageId, InstanceId, PoolFamilyId, PoolId, RealmId, UserId};
pub use instance::{Instance, InstancePlacement, InstanceState};
pub use manifest::{AssemblySpec, DeploymentManifest};
pub use placement::{Match, QuotaScopeKind, RejectionReason};
