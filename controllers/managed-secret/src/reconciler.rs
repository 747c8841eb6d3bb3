//! Reconciliation logic for ManagedSecret CRDs.
//!
//! [`SecretSync`] turns a ManagedSecret into a desired Secret and drives the
//! store towards it; it only needs a [`SecretStore`] and is tested against
//! the in-memory mock. [`Reconciler`] adds the Kubernetes side: finalizer,
//! status updates and Deployment rollouts.

use crate::error::ControllerError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use crds::{ManagedSecret, ManagedSecretStatus, MergeStrategy, SyncState};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event};
use reconcile_core::secret::{data_sha256, ensure_deleted, synchronize};
use reconcile_core::{RetryPolicy, SecretStrategy, SyncOutcome};
use secret_store::{ObjectKey, SecretStore};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finalizer placed on ManagedSecrets so the Secret is removed with them
pub const FINALIZER: &str = "secrets.microscaler.io/cleanup";

/// Pod template annotation carrying the fingerprint of the Secret's data
pub const FINGERPRINT_ANNOTATION: &str = "secrets.microscaler.io/fingerprint";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "managed-secret-controller";

/// Built-in strategy for a CRD merge strategy
pub fn strategy_for(kind: MergeStrategy) -> SecretStrategy {
    match kind {
        MergeStrategy::Data => SecretStrategy::DataOnly,
        MergeStrategy::AnnotationsAndData => SecretStrategy::AnnotationsAndData,
    }
}

/// Key of the Secret a ManagedSecret manages
pub fn target_key(ms: &ManagedSecret) -> Result<ObjectKey, ControllerError> {
    let name = ms
        .target_secret_name()
        .ok_or_else(|| ControllerError::InvalidSpec("ManagedSecret missing name".to_string()))?;
    let namespace = ms
        .namespace()
        .ok_or_else(|| ControllerError::InvalidSpec(format!("ManagedSecret {} missing namespace", name)))?;
    Ok(ObjectKey::new(name, namespace))
}

/// Build the Secret a ManagedSecret describes.
///
/// `data` values are base64-decoded; `stringData` values are taken as-is
/// and win over `data` for the same key.
pub fn desired_secret(ms: &ManagedSecret) -> Result<Secret, ControllerError> {
    let key = target_key(ms)?;

    let mut data = BTreeMap::new();
    for (k, v) in &ms.spec.data {
        let bytes = STANDARD.decode(v).map_err(|e| {
            ControllerError::InvalidSpec(format!("data key {:?} of {} is not valid base64: {}", k, key, e))
        })?;
        data.insert(k.clone(), ByteString(bytes));
    }
    for (k, v) in &ms.spec.string_data {
        data.insert(k.clone(), ByteString(v.as_bytes().to_vec()));
    }

    let mut labels = ms.spec.labels.clone();
    labels
        .entry(MANAGED_BY_LABEL.to_string())
        .or_insert_with(|| MANAGED_BY.to_string());

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(key.name),
            namespace: Some(key.namespace),
            labels: Some(labels),
            annotations: (!ms.spec.annotations.is_empty()).then(|| ms.spec.annotations.clone()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

/// Result of syncing one ManagedSecret's Secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Fingerprint of the stored data after the sync
    pub fingerprint: String,
    /// The stored data differs from what dependent workloads were last
    /// rolled out with, so they must be restarted
    pub rollout: bool,
}

/// Store-side half of the reconciler
#[derive(Clone)]
pub struct SecretSync {
    store: Arc<dyn SecretStore>,
    retry: RetryPolicy,
}

impl SecretSync {
    /// Sync over `store`, retrying conflicts per `retry`
    pub fn new(store: Arc<dyn SecretStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Make the Secret match the ManagedSecret
    pub async fn apply(&self, ms: &ManagedSecret) -> Result<SyncReport, ControllerError> {
        let desired = desired_secret(ms)?;
        let key = ObjectKey::of(&desired);
        let strategy = strategy_for(ms.spec.strategy);

        let before = data_sha256(self.store.as_ref(), &key).await;
        let outcome = synchronize(self.store.as_ref(), &desired, &strategy, &self.retry).await?;
        let fingerprint = if outcome.wrote() {
            data_sha256(self.store.as_ref(), &key).await
        } else {
            before.clone()
        };

        // The status only records a fingerprint once its rollout succeeded,
        // so a rollout that failed on an earlier pass is retried here
        let recorded = ms.status.as_ref().and_then(|s| s.fingerprint.as_deref());
        let rollout = match recorded {
            Some(recorded) => recorded != fingerprint,
            None => fingerprint != before,
        };
        debug!(secret = %key, %outcome, rollout, "Secret synced");

        Ok(SyncReport {
            outcome,
            fingerprint,
            rollout,
        })
    }

    /// Delete the Secret; returns whether it still existed
    pub async fn cleanup(&self, ms: &ManagedSecret) -> Result<bool, ControllerError> {
        let key = target_key(ms)?;
        Ok(ensure_deleted(self.store.as_ref(), &key).await?)
    }
}

/// Status for a successful sync.
///
/// `lastSynced` only moves when the Secret was written, so repeated no-op
/// passes patch identical content.
pub fn synced_status(ms: &ManagedSecret, report: &SyncReport) -> ManagedSecretStatus {
    let previous = ms.status.as_ref();
    ManagedSecretStatus {
        state: SyncState::Synced,
        fingerprint: Some(report.fingerprint.clone()),
        observed_generation: ms.metadata.generation,
        last_outcome: Some(report.outcome.as_str().to_string()),
        error: None,
        last_synced: if report.outcome.wrote() {
            Some(Utc::now())
        } else {
            previous.and_then(|s| s.last_synced)
        },
    }
}

/// Status for a failed sync; keeps the last known fingerprint
pub fn failed_status(ms: &ManagedSecret, error: &ControllerError) -> ManagedSecretStatus {
    let previous = ms.status.clone().unwrap_or_default();
    ManagedSecretStatus {
        state: SyncState::Failed,
        observed_generation: ms.metadata.generation,
        error: Some(error.to_string()),
        ..previous
    }
}

/// Merge patch body for a status.
///
/// Cleared optional fields are sent as `null`, otherwise a merge patch
/// would leave the old value in place.
pub fn status_patch(status: &ManagedSecretStatus) -> serde_json::Value {
    let mut body = json!(status);
    if let Some(fields) = body.as_object_mut() {
        for field in ["fingerprint", "observedGeneration", "lastOutcome", "error", "lastSynced"] {
            fields.entry(field).or_insert(serde_json::Value::Null);
        }
    }
    json!({ "status": body })
}

/// Reconciles ManagedSecret resources.
pub struct Reconciler {
    client: Client,
    sync: SecretSync,
    requeue_interval: Duration,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Client, sync: SecretSync, requeue_interval: Duration) -> Self {
        Self {
            client,
            sync,
            requeue_interval,
        }
    }

    /// Reconciles a ManagedSecret.
    ///
    /// Adds the finalizer on first sight; afterwards keeps the Secret in
    /// sync, or deletes it once the ManagedSecret is being deleted.
    pub async fn reconcile_managed_secret(&self, ms: Arc<ManagedSecret>) -> Result<Action, ControllerError> {
        let namespace = ms
            .namespace()
            .ok_or_else(|| ControllerError::InvalidSpec(format!("ManagedSecret {} missing namespace", ms.name_any())))?;
        let api: Api<ManagedSecret> = Api::namespaced(self.client.clone(), &namespace);
        let api_ref = &api;

        finalizer(api_ref, FINALIZER, ms, |event| async move {
            match event {
                Event::Apply(ms) => self.apply(api_ref, &ms).await,
                Event::Cleanup(ms) => self.cleanup(&ms).await,
            }
        })
        .await
        .map_err(ControllerError::from)
    }

    async fn apply(&self, api: &Api<ManagedSecret>, ms: &ManagedSecret) -> Result<Action, ControllerError> {
        let name = ms.name_any();
        let namespace = ms.namespace().unwrap_or_default();
        info!("Reconciling ManagedSecret {}/{}", namespace, name);

        let result = async {
            let report = self.sync.apply(ms).await?;
            if report.rollout {
                self.rollout(&namespace, &ms.spec.rollout_deployments, &report.fingerprint)
                    .await?;
            }
            Ok::<_, ControllerError>(report)
        }
        .await;

        match result {
            Ok(report) => {
                self.patch_status(api, &name, &synced_status(ms, &report)).await?;
                info!(
                    "ManagedSecret {}/{} synced ({})",
                    namespace, name, report.outcome
                );
                Ok(Action::requeue(self.requeue_interval))
            }
            Err(e) => {
                error!("Failed to sync ManagedSecret {}/{}: {}", namespace, name, e);
                if let Err(status_err) = self.patch_status(api, &name, &failed_status(ms, &e)).await {
                    error!(
                        "Failed to update ManagedSecret {}/{} error status: {}",
                        namespace, name, status_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn cleanup(&self, ms: &ManagedSecret) -> Result<Action, ControllerError> {
        let existed = self.sync.cleanup(ms).await?;
        info!(
            "ManagedSecret {}/{} deleted (secret existed: {})",
            ms.namespace().unwrap_or_default(),
            ms.name_any(),
            existed
        );
        Ok(Action::await_change())
    }

    async fn patch_status(
        &self,
        api: &Api<ManagedSecret>,
        name: &str,
        status: &ManagedSecretStatus,
    ) -> Result<(), ControllerError> {
        let patch = status_patch(status);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Restart Deployments by stamping the fingerprint on their pod template.
    ///
    /// Missing Deployments are skipped; the next data change retries them.
    async fn rollout(&self, namespace: &str, deployments: &[String], fingerprint: &str) -> Result<(), ControllerError> {
        if deployments.is_empty() {
            return Ok(());
        }

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = rollout_patch(fingerprint);

        for name in deployments {
            match api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await {
                Ok(_) => info!("Rolled out Deployment {}/{}", namespace, name),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    warn!("Deployment {}/{} not found, skipping rollout", namespace, name);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Merge patch that sets the fingerprint annotation on a pod template
pub fn rollout_patch(fingerprint: &str) -> serde_json::Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        FINGERPRINT_ANNOTATION: fingerprint
                    }
                }
            }
        }
    })
}
