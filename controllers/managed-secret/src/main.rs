//! ManagedSecret Controller
//!
//! Keeps Kubernetes Secrets in sync with `ManagedSecret` resources:
//! - creates the Secret when it is missing
//! - updates it, conflict-safely, when its data (and optionally its
//!   annotations) drift from the declared content
//! - restarts the listed Deployments when the Secret's data changes
//! - deletes the Secret when the ManagedSecret is deleted

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting ManagedSecret Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!(
        "  Sync retries: {} (initial delay {:?}, max delay {:?})",
        config.retry.max_attempts, config.retry.initial_delay, config.retry.max_delay
    );
    info!("  Requeue interval: {:?}", config.requeue_interval);
    info!(
        "  Error backoff: {}s..{}s",
        config.error_backoff_min_secs, config.error_backoff_max_secs
    );
    info!("  Concurrency: {}, debounce: {:?}", config.concurrency, config.debounce);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
