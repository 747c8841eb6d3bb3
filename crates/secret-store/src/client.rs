//! Kubernetes-backed secret store

use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::store_trait::SecretStore;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// `SecretStore` over the Kubernetes API server.
///
/// Optimistic concurrency comes from the API server itself: `replace`
/// sends the object's `resourceVersion` and the server answers 409 when
/// it is stale.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Store over the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, key: &ObjectKey) -> Result<Secret, StoreError> {
        debug!(secret = %key, "GET secret");
        Ok(self.api(&key.namespace).get(&key.name).await?)
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = ObjectKey::of(secret);
        debug!(secret = %key, "CREATE secret");
        Ok(self
            .api(&key.namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = ObjectKey::of(secret);
        debug!(
            secret = %key,
            resource_version = secret.metadata.resource_version.as_deref().unwrap_or(""),
            "REPLACE secret"
        );
        Ok(self
            .api(&key.namespace)
            .replace(&key.name, &PostParams::default(), secret)
            .await?)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        debug!(secret = %key, "DELETE secret");
        self.api(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
