//! SecretStore trait for mocking
//!
//! This trait abstracts the store so the reconciliation core can be unit
//! tested against an in-memory implementation. The Kubernetes-backed
//! `KubeSecretStore` implements it for production use.

use crate::error::StoreError;
use crate::key::ObjectKey;
use k8s_openapi::api::core::v1::Secret;

/// The four primitives the reconciliation core consumes.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret. Fails with `StoreError::NotFound` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Secret, StoreError>;

    /// Create a secret. Fails with `StoreError::AlreadyExists` if the key is taken.
    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace a secret, guarded by `metadata.resource_version`.
    /// Fails with `StoreError::Conflict` when the version is stale.
    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Delete a secret. Fails with `StoreError::NotFound` if it does not exist.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}
