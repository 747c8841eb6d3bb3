//! Secret reconciliation
//!
//! `synchronize` is a create-or-update driver:
//! 1. Get the current secret by the desired secret's key
//! 2. If it does not exist, create it
//! 3. If it exists and the strategy says it differs, re-fetch, merge the
//!    desired fields into the fresh copy and update it, retrying on conflict
//!
//! Which fields matter is decided by a [`SyncStrategy`]; fields outside its
//! merge scope (including the resource version) are never touched.

use crate::error::ReconcileError;
use crate::fingerprint::{secret_fingerprint, EMPTY_FINGERPRINT};
use crate::retry::{retry, RetryError, RetryPolicy};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use secret_store::{ObjectKey, SecretStore, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Equality and merge rules for one kind of reconciliation.
pub trait SyncStrategy: Send + Sync {
    /// True if `current` already matches `desired` for the fields this strategy owns
    fn equal(&self, current: &Secret, desired: &Secret) -> bool;

    /// Copy the owned fields from `desired` into `current`
    fn merge(&self, current: &mut Secret, desired: &Secret);
}

/// Built-in strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretStrategy {
    /// Compare and copy `data` only
    #[default]
    DataOnly,
    /// Compare and copy `metadata.annotations` and `data`
    AnnotationsAndData,
}

impl SyncStrategy for SecretStrategy {
    fn equal(&self, current: &Secret, desired: &Secret) -> bool {
        match self {
            Self::DataOnly => data_equal(current, desired),
            Self::AnnotationsAndData => annotations_and_data_equal(current, desired),
        }
    }

    fn merge(&self, current: &mut Secret, desired: &Secret) {
        match self {
            Self::DataOnly => merge_data_only(current, desired),
            Self::AnnotationsAndData => merge_annotations_and_data(current, desired),
        }
    }
}

/// Absent and empty maps compare equal.
fn semantic_eq<V: PartialEq>(a: Option<&BTreeMap<String, V>>, b: Option<&BTreeMap<String, V>>) -> bool {
    a.filter(|m| !m.is_empty()) == b.filter(|m| !m.is_empty())
}

/// `data` matches, treating absent and empty as equal
pub fn data_equal(current: &Secret, desired: &Secret) -> bool {
    semantic_eq(current.data.as_ref(), desired.data.as_ref())
}

/// `metadata.annotations` and `data` both match
pub fn annotations_and_data_equal(current: &Secret, desired: &Secret) -> bool {
    semantic_eq(
        current.metadata.annotations.as_ref(),
        desired.metadata.annotations.as_ref(),
    ) && data_equal(current, desired)
}

/// Overwrite `data` with the desired value
pub fn merge_data_only(current: &mut Secret, desired: &Secret) {
    current.data.clone_from(&desired.data);
}

/// Overwrite `metadata.annotations` and `data` with the desired values
pub fn merge_annotations_and_data(current: &mut Secret, desired: &Secret) {
    current.metadata.annotations.clone_from(&desired.metadata.annotations);
    current.data.clone_from(&desired.data);
}

/// What `synchronize` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The secret did not exist and was created
    Created,
    /// Already matched; nothing written
    Unchanged,
    /// Updated on the given attempt (1 = no conflict)
    Updated { attempts: u32 },
}

impl SyncOutcome {
    /// Name used in logs and status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Unchanged => "Unchanged",
            Self::Updated { .. } => "Updated",
        }
    }

    /// True if the store was written to
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a secret from its key parts and raw data
pub fn new_secret(name: &str, namespace: &str, data: BTreeMap<String, Vec<u8>>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
        ..Default::default()
    }
}

/// Fetch a secret, wrapping failures with its key
pub async fn get<S>(store: &S, key: &ObjectKey) -> Result<Secret, ReconcileError>
where
    S: SecretStore + ?Sized,
{
    store.get(key).await.map_err(|source| ReconcileError::Get {
        key: key.clone(),
        source,
    })
}

/// Failure inside one get-merge-update attempt
enum AttemptError {
    Get(StoreError),
    Update(StoreError),
}

/// Make the stored secret match `desired` according to `strategy`.
///
/// Creates the secret if it does not exist. Otherwise updates it only if
/// `strategy.equal` reports a difference, re-fetching before each merge so
/// that the update carries the latest resource version. Conflicts are
/// retried per `policy`; any other failure is returned immediately.
pub async fn synchronize<S, St>(
    store: &S,
    desired: &Secret,
    strategy: &St,
    policy: &RetryPolicy,
) -> Result<SyncOutcome, ReconcileError>
where
    S: SecretStore + ?Sized,
    St: SyncStrategy + ?Sized,
{
    let key = ObjectKey::of(desired);

    let current = match store.get(&key).await {
        Ok(current) => current,
        Err(e) if e.is_not_found() => {
            return match store.create(desired).await {
                Ok(_) => {
                    info!(secret = %key, "Created secret");
                    Ok(SyncOutcome::Created)
                }
                Err(source) => Err(ReconcileError::Create { key, source }),
            };
        }
        Err(source) => return Err(ReconcileError::Get { key, source }),
    };

    if strategy.equal(&current, desired) {
        debug!(secret = %key, "Secret already up-to-date");
        return Ok(SyncOutcome::Unchanged);
    }

    info!(secret = %key, "Secret differs from desired state, updating");

    let key_ref = &key;
    let result = retry(
        policy,
        |e: &AttemptError| matches!(e, AttemptError::Update(StoreError::Conflict(_))),
        move |attempt| async move {
            let mut current = store.get(key_ref).await.map_err(AttemptError::Get)?;
            strategy.merge(&mut current, desired);
            match store.update(&current).await {
                Ok(_) => Ok(attempt),
                Err(e) => {
                    if e.is_conflict() {
                        warn!(secret = %key_ref, attempt, "Conflict updating secret, retrying");
                    }
                    Err(AttemptError::Update(e))
                }
            }
        },
    )
    .await;

    match result {
        Ok(attempts) => {
            info!(secret = %key, attempts, "Updated secret");
            Ok(SyncOutcome::Updated { attempts })
        }
        Err(RetryError::Exhausted { attempts, .. }) => Err(ReconcileError::ConflictExhausted { key, attempts }),
        Err(RetryError::Aborted(AttemptError::Get(source))) => Err(ReconcileError::Get { key, source }),
        Err(RetryError::Aborted(AttemptError::Update(source))) => Err(ReconcileError::Update { key, source }),
    }
}

/// Delete a secret; any failure, including not found, is an error
pub async fn delete<S>(store: &S, key: &ObjectKey) -> Result<(), ReconcileError>
where
    S: SecretStore + ?Sized,
{
    store.delete(key).await.map_err(|source| ReconcileError::Delete {
        key: key.clone(),
        source,
    })?;
    info!(secret = %key, "Deleted secret");
    Ok(())
}

/// Create a secret unless one with the same key exists.
///
/// Returns whether this call created it.
pub async fn ensure_created<S>(store: &S, secret: &Secret) -> Result<bool, ReconcileError>
where
    S: SecretStore + ?Sized,
{
    let key = ObjectKey::of(secret);
    match store.create(secret).await {
        Ok(_) => {
            info!(secret = %key, "Created secret");
            Ok(true)
        }
        Err(e) if e.is_already_exists() => {
            debug!(secret = %key, "Secret already exists");
            Ok(false)
        }
        Err(source) => Err(ReconcileError::Create { key, source }),
    }
}

/// Delete a secret if it exists.
///
/// Returns whether this call deleted it.
pub async fn ensure_deleted<S>(store: &S, key: &ObjectKey) -> Result<bool, ReconcileError>
where
    S: SecretStore + ?Sized,
{
    match store.delete(key).await {
        Ok(()) => {
            info!(secret = %key, "Deleted secret");
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            debug!(secret = %key, "Secret already gone");
            Ok(false)
        }
        Err(source) => Err(ReconcileError::Delete {
            key: key.clone(),
            source,
        }),
    }
}

/// Fingerprint of the stored secret's data.
///
/// Returns [`EMPTY_FINGERPRINT`] if the secret cannot be fetched, the same
/// value an empty secret yields.
pub async fn data_sha256<S>(store: &S, key: &ObjectKey) -> String
where
    S: SecretStore + ?Sized,
{
    match get(store, key).await {
        Ok(secret) => secret_fingerprint(&secret),
        Err(e) => {
            debug!("Fingerprint unavailable: {}", e);
            EMPTY_FINGERPRINT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use secret_store::{MockSecretStore, Operation};

    const NS: &str = "logging";

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(name, NS)
    }

    fn desired(name: &str, entries: &[(&str, &str)]) -> Secret {
        new_secret(
            name,
            NS,
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.as_bytes().to_vec()))
                .collect(),
        )
    }

    fn with_annotations(mut secret: Secret, entries: &[(&str, &str)]) -> Secret {
        secret.metadata.annotations = Some(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        secret
    }

    fn data_of(secret: &Secret, k: &str) -> Option<String> {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(k))
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
    }

    #[tokio::test]
    async fn test_creates_missing_secret() {
        let store = MockSecretStore::new();
        let want = desired("es-certs", &[("ca", "1")]);

        let outcome = synchronize(&store, &want, &SecretStrategy::DataOnly, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Created);
        assert_eq!(store.calls(Operation::Create), 1);
        assert_eq!(data_of(&store.stored(&key("es-certs")).unwrap(), "ca").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_create_failure_is_surfaced_with_key() {
        let store = MockSecretStore::new();
        store.fail_next(Operation::Create, StoreError::AlreadyExists("raced".into()), 1);

        let err = synchronize(&store, &desired("es-certs", &[]), &SecretStrategy::DataOnly, &RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Create { .. }));
        assert_eq!(err.key(), &key("es-certs"));
    }

    #[tokio::test]
    async fn test_get_failure_is_not_retried() {
        let store = MockSecretStore::new();
        store.fail_next(Operation::Get, StoreError::Transport("timeout".into()), 1);

        let err = synchronize(&store, &desired("es-certs", &[]), &SecretStrategy::DataOnly, &RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Get { .. }));
        assert_eq!(store.calls(Operation::Get), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let store = MockSecretStore::new();
        let want = desired("es-certs", &[("ca", "1"), ("key", "2")]);
        let policy = RetryPolicy::default();

        synchronize(&store, &want, &SecretStrategy::AnnotationsAndData, &policy).await.unwrap();
        let writes = store.writes();

        let outcome = synchronize(&store, &want, &SecretStrategy::AnnotationsAndData, &policy)
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert!(!outcome.wrote());
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn test_updates_changed_data() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("ca", "old")]));

        let outcome = synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, SyncOutcome::Updated { attempts: 1 });
        assert_eq!(data_of(&store.stored(&key("es-certs")).unwrap(), "ca").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_data_only_ignores_annotation_drift() {
        let store = MockSecretStore::new();
        store.insert(with_annotations(desired("es-certs", &[("ca", "1")]), &[("owner", "someone-else")]));

        let outcome = synchronize(
            &store,
            &desired("es-certs", &[("ca", "1")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_annotations_and_data_replaces_annotations() {
        let store = MockSecretStore::new();
        store.insert(with_annotations(desired("es-certs", &[("ca", "1")]), &[("owner", "someone-else")]));
        let want = with_annotations(desired("es-certs", &[("ca", "1")]), &[("owner", "operator")]);

        let outcome = synchronize(&store, &want, &SecretStrategy::AnnotationsAndData, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Updated { attempts: 1 });
        let stored = store.stored(&key("es-certs")).unwrap();
        assert_eq!(stored.metadata.annotations, want.metadata.annotations);
    }

    #[tokio::test]
    async fn test_empty_and_absent_data_are_equal() {
        let store = MockSecretStore::new();
        let mut existing = desired("empty", &[]);
        existing.data = None;
        store.insert(existing);

        let outcome = synchronize(&store, &desired("empty", &[]), &SecretStrategy::DataOnly, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_merge_preserves_fields_outside_scope() {
        let store = MockSecretStore::new();
        let mut existing = desired("es-certs", &[("ca", "old")]);
        existing.metadata.labels = Some([("app".to_string(), "es".to_string())].into());
        existing.type_ = Some("Opaque".to_string());
        store.insert(existing);

        synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        let stored = store.stored(&key("es-certs")).unwrap();
        assert_eq!(stored.type_.as_deref(), Some("Opaque"));
        assert_eq!(stored.metadata.labels.unwrap().get("app").map(String::as_str), Some("es"));
    }

    #[tokio::test]
    async fn test_converges_after_concurrent_write() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("ca", "old")]));

        // gets: #1 initial read, #2 first re-fetch (then someone else writes), #3 second re-fetch
        store.write_after_get(2, key("es-certs"), |s| {
            s.metadata.annotations = Some([("rotated-by".to_string(), "cert-manager".to_string())].into());
        });

        let outcome = synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::immediate(5),
        )
        .await
        .unwrap();

        assert_eq!(outcome, SyncOutcome::Updated { attempts: 2 });
        assert_eq!(store.calls(Operation::Update), 2);

        let stored = store.stored(&key("es-certs")).unwrap();
        assert_eq!(data_of(&stored, "ca").as_deref(), Some("new"));
        assert_eq!(
            stored.metadata.annotations.unwrap().get("rotated-by").map(String::as_str),
            Some("cert-manager")
        );
    }

    #[tokio::test]
    async fn test_conflict_budget_is_bounded() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("ca", "old")]));
        store.fail_next(Operation::Update, StoreError::Conflict("stale".into()), 10);

        let err = synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::immediate(3),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::ConflictExhausted { attempts: 3, .. }));
        assert!(err.is_conflict());
        assert_eq!(store.calls(Operation::Update), 3);
        // initial read plus one re-fetch per attempt
        assert_eq!(store.calls(Operation::Get), 4);
    }

    #[tokio::test]
    async fn test_non_conflict_update_failure_aborts() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("ca", "old")]));
        store.fail_next(Operation::Update, StoreError::Transport("forbidden".into()), 1);

        let err = synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::immediate(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::Update { .. }));
        assert_eq!(store.calls(Operation::Update), 1);
    }

    #[tokio::test]
    async fn test_refetch_not_found_aborts() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("ca", "old")]));
        // deleted by someone else between the first read and the re-fetch
        store.delete_after_get(1, key("es-certs"));

        let err = synchronize(
            &store,
            &desired("es-certs", &[("ca", "new")]),
            &SecretStrategy::DataOnly,
            &RetryPolicy::immediate(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReconcileError::Get { .. }));
        assert!(err.is_not_found());
        assert_eq!(store.calls(Operation::Update), 0);
    }

    #[tokio::test]
    async fn test_ensure_created_tolerates_existing() {
        let store = MockSecretStore::new();
        let secret = desired("es-certs", &[("ca", "1")]);

        assert!(ensure_created(&store, &secret).await.unwrap());
        assert!(!ensure_created(&store, &secret).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_deleted_tolerates_missing() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[]));

        assert!(ensure_deleted(&store, &key("es-certs")).await.unwrap());
        assert!(!ensure_deleted(&store, &key("es-certs")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_deleted_surfaces_other_errors() {
        let store = MockSecretStore::new();
        store.fail_next(Operation::Delete, StoreError::Transport("forbidden".into()), 1);

        let err = ensure_deleted(&store, &key("es-certs")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Delete { .. }));
    }

    #[tokio::test]
    async fn test_strict_delete_reports_missing() {
        let store = MockSecretStore::new();
        let err = delete(&store, &key("es-certs")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_data_sha256() {
        let store = MockSecretStore::new();
        store.insert(desired("es-certs", &[("b", "y"), ("a", "x")]));

        assert_eq!(
            data_sha256(&store, &key("es-certs")).await,
            fingerprint([("a", "x"), ("b", "y")])
        );
        assert_eq!(data_sha256(&store, &key("missing")).await, EMPTY_FINGERPRINT);
    }
}
