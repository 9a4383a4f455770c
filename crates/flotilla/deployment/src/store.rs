//! Deployment state persistence

use async_trait::async_trait;
use dashmap::DashMap;
use flotilla_types::{Deployment, DeploymentId};

/// State store for deployment persistence
///
/// The whole deployment, instance arena included, is saved as one record so
/// that a reload always sees instance states consistent with the aggregate.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Save (insert or replace) a deployment
    async fn save(&self, deployment: &Deployment) -> Result<(), StateStoreError>;

    /// Get a deployment by ID
    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, StateStoreError>;

    /// Delete a deployment
    async fn delete(&self, id: &DeploymentId) -> Result<(), StateStoreError>;

    /// List every stored deployment
    async fn list(&self) -> Result<Vec<Deployment>, StateStoreError>;
}

/// State store errors
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// In-memory implementation for development and tests
pub struct InMemoryDeploymentStore {
    deployments: DashMap<DeploymentId, Deployment>,
}

impl InMemoryDeploymentStore {
    /// Create a new in-memory state store
    pub fn new() -> Self {
        Self {
            deployments: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

impl Default for InMemoryDeploymentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn save(&self, deployment: &Deployment) -> Result<(), StateStoreError> {
        self.deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, StateStoreError> {
        Ok(self.deployments.get(id).map(|d| d.clone()))
    }

    async fn delete(&self, id: &DeploymentId) -> Result<(), StateStoreError> {
        self.deployments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StateStoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Deployment>, StateStoreError> {
        let mut deployments: Vec<Deployment> =
            self.deployments.iter().map(|d| d.clone()).collect();
        deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(deployments)
    }
}
