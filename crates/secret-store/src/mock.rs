//! Mock SecretStore for unit testing
//!
//! Stores secrets in memory and mimics the API server's optimistic
//! concurrency: every write bumps `resourceVersion`, and an update carrying
//! a stale version is rejected with `StoreError::Conflict`.
//!
//! Tests can also:
//! - inject failures for the next N calls of an operation
//! - schedule an "external writer" that mutates an object right after a
//!   given `get` returns, to exercise conflict handling
//! - count calls per operation, to assert that no writes happened

use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::store_trait::SecretStore;
use k8s_openapi::api::core::v1::Secret;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Store operation, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
}

type ExternalWrite = Box<dyn FnOnce(&mut Secret) + Send>;

struct ScheduledWrite {
    after_get: usize,
    key: ObjectKey,
    /// `None` deletes the object
    write: Option<ExternalWrite>,
}

/// In-memory `SecretStore`
#[derive(Clone, Default)]
pub struct MockSecretStore {
    secrets: Arc<Mutex<HashMap<ObjectKey, Secret>>>,
    version: Arc<Mutex<u64>>,
    calls: Arc<Mutex<HashMap<Operation, usize>>>,
    failures: Arc<Mutex<HashMap<Operation, VecDeque<StoreError>>>>,
    scheduled: Arc<Mutex<Vec<ScheduledWrite>>>,
}

impl std::fmt::Debug for MockSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSecretStore")
            .field("secrets", &self.secrets.lock().unwrap().len())
            .field("calls", &*self.calls.lock().unwrap())
            .finish_non_exhaustive()
    }
}

impl MockSecretStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret (for test setup). Assigns a fresh resource version.
    pub fn insert(&self, mut secret: Secret) {
        secret.metadata.resource_version = Some(self.next_version());
        self.secrets
            .lock()
            .unwrap()
            .insert(ObjectKey::of(&secret), secret);
    }

    /// Current stored copy of a secret
    pub fn stored(&self, key: &ObjectKey) -> Option<Secret> {
        self.secrets.lock().unwrap().get(key).cloned()
    }

    /// Number of calls made for an operation, including injected failures
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Number of create, update and delete calls
    pub fn writes(&self) -> usize {
        self.calls(Operation::Create) + self.calls(Operation::Update) + self.calls(Operation::Delete)
    }

    /// Fail the next `times` calls of `op` with `error`
    pub fn fail_next(&self, op: Operation, error: StoreError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Mutate the stored object under `key` right after the `nth` `get`
    /// call (1-based, counted over the store's lifetime) has read it.
    ///
    /// The write bumps the resource version, so any update based on what
    /// that `get` returned will conflict.
    pub fn write_after_get<F>(&self, nth: usize, key: ObjectKey, write: F)
    where
        F: FnOnce(&mut Secret) + Send + 'static,
    {
        self.scheduled.lock().unwrap().push(ScheduledWrite {
            after_get: nth,
            key,
            write: Some(Box::new(write)),
        });
    }

    /// Delete the object under `key` right after the `nth` `get` call
    pub fn delete_after_get(&self, nth: usize, key: ObjectKey) {
        self.scheduled.lock().unwrap().push(ScheduledWrite {
            after_get: nth,
            key,
            write: None,
        });
    }

    fn next_version(&self) -> String {
        let mut version = self.version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Record a call and return its 1-based sequence number for `op`
    fn record(&self, op: Operation) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(op).or_insert(0);
        *count += 1;
        *count
    }

    fn injected(&self, op: Operation) -> Option<StoreError> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }

    fn run_scheduled_writes(&self, get_count: usize) {
        let due: Vec<ScheduledWrite> = {
            let mut scheduled = self.scheduled.lock().unwrap();
            let (due, pending): (Vec<_>, Vec<_>) = scheduled
                .drain(..)
                .partition(|w: &ScheduledWrite| w.after_get == get_count);
            *scheduled = pending;
            due
        };

        for scheduled in due {
            let Some(write) = scheduled.write else {
                self.secrets.lock().unwrap().remove(&scheduled.key);
                continue;
            };
            let version = self.next_version();
            let mut secrets = self.secrets.lock().unwrap();
            if let Some(secret) = secrets.get_mut(&scheduled.key) {
                write(secret);
                secret.metadata.resource_version = Some(version);
            }
        }
    }
}

#[async_trait::async_trait]
impl SecretStore for MockSecretStore {
    async fn get(&self, key: &ObjectKey) -> Result<Secret, StoreError> {
        let nth = self.record(Operation::Get);
        if let Some(err) = self.injected(Operation::Get) {
            return Err(err);
        }

        let result = self
            .secrets
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("secrets \"{}\" not found", key.name)));

        self.run_scheduled_writes(nth);
        result
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.record(Operation::Create);
        if let Some(err) = self.injected(Operation::Create) {
            return Err(err);
        }

        let key = ObjectKey::of(secret);
        if self.secrets.lock().unwrap().contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "secrets \"{}\" already exists",
                key.name
            )));
        }

        let mut created = secret.clone();
        created.metadata.resource_version = Some(self.next_version());
        self.secrets.lock().unwrap().insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.record(Operation::Update);
        if let Some(err) = self.injected(Operation::Update) {
            return Err(err);
        }

        let key = ObjectKey::of(secret);
        let stored_version = self
            .secrets
            .lock()
            .unwrap()
            .get(&key)
            .map(|s| s.metadata.resource_version.clone())
            .ok_or_else(|| StoreError::NotFound(format!("secrets \"{}\" not found", key.name)))?;

        // An update without a resource version is unconditional, as on the API server.
        if secret.metadata.resource_version.is_some() && secret.metadata.resource_version != stored_version {
            return Err(StoreError::Conflict(format!(
                "Operation cannot be fulfilled on secrets \"{}\": the object has been modified",
                key.name
            )));
        }

        let mut updated = secret.clone();
        updated.metadata.resource_version = Some(self.next_version());
        self.secrets.lock().unwrap().insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.record(Operation::Delete);
        if let Some(err) = self.injected(Operation::Delete) {
            return Err(err);
        }

        self.secrets
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("secrets \"{}\" not found", key.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MockSecretStore::new();
        let created = store.create(&secret("a")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let fetched = store.get(&ObjectKey::new("a", "default")).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_create_existing_is_already_exists() {
        let store = MockSecretStore::new();
        store.insert(secret("a"));
        let err = store.create(&secret("a")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MockSecretStore::new();
        store.insert(secret("a"));
        let key = ObjectKey::new("a", "default");

        let first = store.get(&key).await.unwrap();
        store.update(&first).await.unwrap();

        // `first` still carries the old version
        let err = store.update(&first).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_write_after_get_bumps_version() {
        let store = MockSecretStore::new();
        store.insert(secret("a"));
        let key = ObjectKey::new("a", "default");
        store.write_after_get(1, key.clone(), |s| {
            s.metadata.labels = Some([("touched".to_string(), "yes".to_string())].into());
        });

        let read = store.get(&key).await.unwrap();
        assert!(read.metadata.labels.is_none());

        let stored = store.stored(&key).unwrap();
        assert_ne!(stored.metadata.resource_version, read.metadata.resource_version);
        assert!(store.update(&read).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MockSecretStore::new();
        store.fail_next(Operation::Get, StoreError::Transport("boom".into()), 1);
        let key = ObjectKey::new("a", "default");

        assert_eq!(
            store.get(&key).await.unwrap_err(),
            StoreError::Transport("boom".into())
        );
        assert!(store.get(&key).await.unwrap_err().is_not_found());
        assert_eq!(store.calls(Operation::Get), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MockSecretStore::new();
        let err = store.delete(&ObjectKey::new("a", "default")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
