//! Controller-specific error types.
//!
//! Errors from the reconciliation core and the Kubernetes client are wrapped
//! here so that the watch loop deals with a single type.

use kube::Error as KubeError;
use kube_runtime::finalizer;
use reconcile_core::ReconcileError;
use thiserror::Error;

/// Errors that can occur in the ManagedSecret Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Secret reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// ManagedSecret spec cannot be turned into a Secret
    #[error("Invalid ManagedSecret: {0}")]
    InvalidSpec(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Finalizer add/remove or cleanup failed
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<finalizer::Error<ControllerError>>),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl From<finalizer::Error<ControllerError>> for ControllerError {
    fn from(error: finalizer::Error<ControllerError>) -> Self {
        match error {
            // Unwrap our own errors so the error policy sees what actually failed
            finalizer::Error::ApplyFailed(e) | finalizer::Error::CleanupFailed(e) => e,
            other => Self::Finalizer(Box::new(other)),
        }
    }
}
