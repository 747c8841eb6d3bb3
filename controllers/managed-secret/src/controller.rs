//! Main controller implementation.
//!
//! Wires the Kubernetes client, secret store, reconciler and watcher
//! together and runs the watch loop.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::{Reconciler, SecretSync};
use crate::watcher::{Context, ErrorBackoffs, Watcher};
use crds::ManagedSecret;
use kube::{Api, Client};
use secret_store::KubeSecretStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for ManagedSecret resources.
pub struct Controller {
    managed_secret_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing ManagedSecret Controller");

        let client = Client::try_default().await?;

        let api: Api<ManagedSecret> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };

        let store = Arc::new(KubeSecretStore::new(client.clone()));
        let sync = SecretSync::new(store, config.retry.clone());
        let reconciler = Reconciler::new(client, sync, config.requeue_interval);
        let backoffs = ErrorBackoffs::new(config.error_backoff_min_secs, config.error_backoff_max_secs);
        let context = Arc::new(Context::new(reconciler, backoffs));

        let watcher = Watcher::new(api, context, &config);
        let managed_secret_watcher = tokio::spawn(watcher.watch_managed_secrets());

        Ok(Self { managed_secret_watcher })
    }

    /// Runs until the watcher stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("ManagedSecret Controller running");

        match self.managed_secret_watcher.await {
            Ok(result) => result,
            Err(e) => {
                error!("ManagedSecret watcher task failed: {}", e);
                Err(ControllerError::Watch(format!("watcher task failed: {}", e)))
            }
        }
    }
}
