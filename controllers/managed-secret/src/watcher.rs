//! Kubernetes resource watchers.
//!
//! Watches ManagedSecret resources with `kube_runtime::Controller`, which
//! handles reconnection, debouncing and bounded concurrency. Failed objects
//! are requeued with a per-object Fibonacci backoff that resets on success.

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::ManagedSecret;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info};

/// Per-object error backoff state
pub struct ErrorBackoffs {
    min_secs: u64,
    max_secs: u64,
    entries: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl ErrorBackoffs {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            max_secs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, FibonacciBackoff>> {
        // The map stays consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Next requeue delay for an object that just failed
    pub fn next(&self, key: &str) -> Duration {
        self.entries()
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min_secs, self.max_secs))
            .next_backoff()
    }

    /// Forget the failure history of an object
    pub fn reset(&self, key: &str) {
        if let Some(backoff) = self.entries().get_mut(key) {
            backoff.reset();
        }
    }

    /// Drop the entry for an object that no longer exists
    pub fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// Shared state handed to every reconciliation
pub struct Context {
    reconciler: Reconciler,
    backoffs: ErrorBackoffs,
}

impl Context {
    pub fn new(reconciler: Reconciler, backoffs: ErrorBackoffs) -> Self {
        Self { reconciler, backoffs }
    }
}

fn object_key(ms: &ManagedSecret) -> String {
    format!("{}/{}", ms.namespace().unwrap_or_default(), ms.name_any())
}

async fn reconcile(ms: Arc<ManagedSecret>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = object_key(&ms);
    let deleting = ms.metadata.deletion_timestamp.is_some();
    debug!("Reconciling ManagedSecret {}", key);

    let action = ctx.reconciler.reconcile_managed_secret(ms).await?;

    if deleting {
        ctx.backoffs.remove(&key);
    } else {
        ctx.backoffs.reset(&key);
    }
    Ok(action)
}

fn error_policy(ms: Arc<ManagedSecret>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = object_key(&ms);
    let delay = ctx.backoffs.next(&key);
    error!(
        "Reconciliation error for ManagedSecret {}: {} (retrying in {}s)",
        key,
        error,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// Watches ManagedSecret resources for changes.
pub struct Watcher {
    api: Api<ManagedSecret>,
    context: Arc<Context>,
    runtime_config: RuntimeConfig,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(api: Api<ManagedSecret>, context: Arc<Context>, config: &ControllerConfig) -> Self {
        // Debounce batches bursts of events (including our own status
        // patches) into one reconciliation
        let runtime_config = RuntimeConfig::default()
            .debounce(config.debounce)
            .concurrency(config.concurrency);
        Self {
            api,
            context,
            runtime_config,
        }
    }

    /// Starts watching ManagedSecret resources; runs until the stream ends.
    pub async fn watch_managed_secrets(self) -> Result<(), ControllerError> {
        info!("Starting ManagedSecret watcher");

        Controller::new(self.api, watcher::Config::default())
            .with_config(self.runtime_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled ManagedSecret {}", obj.name),
                    Err(e) => error!("Controller error for ManagedSecret: {}", e),
                }
            })
            .await;

        info!("ManagedSecret watcher stopped");
        Ok(())
    }
}
