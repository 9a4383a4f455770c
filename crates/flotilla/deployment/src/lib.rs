//! Flotilla Deployment - launch orchestration, state machine and rollback
//!
//! This crate brings a validated manifest up on a single provider account and
//! keeps the deployment's aggregate state in step with its instances:
//!
//! - **DeploymentManager**: entry point (create, launch, instance state
//!   reports, stop, destroy, queries), serializing work per deployment
//! - **LaunchExecutor**: sequential provider launches with the
//!   partial-launch policy
//! - **state_machine**: pure deployment transitions with obligations
//! - **RollbackController**: best-effort teardown of a failed launch
//!
//! Persistence, the event log, provider lifecycle, permissions and the
//! account catalog are traits with in-memory implementations.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event_log;
pub mod launcher;
pub mod lifecycle;
pub mod manager;
pub mod permissions;
pub mod rollback;
pub mod state_machine;
pub mod store;
pub mod uptime;

pub use catalog::{AccountCatalog, InMemoryAccountCatalog};
pub use config::OrchestratorConfig;
pub use error::{DeploymentError, Result, ValidationError};
pub use event_log::{EventLog, EventLogError, InMemoryEventLog};
pub use launcher::{LaunchExecutor, LaunchReport};
pub use lifecycle::{
    InstanceConfig, InstanceLifecycle, LifecycleCall, LifecycleError, LifecycleRequest,
    ScriptedLifecycle,
};
pub use manager::{DeploymentManager, DeploymentRequest, DeploymentUptime, StopOutcome};
pub use permissions::{AllowAllPermissions, HardwareProfileAllowList, PermissionGate};
pub use rollback::{RollbackController, RollbackOutcome};
pub use state_machine::{MachineInput, Obligation, Transition};
pub use store::{DeploymentStore, InMemoryDeploymentStore, StateStoreError};
