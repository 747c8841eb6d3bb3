//! Reconciliation errors
//!
//! Every store failure is wrapped with the key of the object being
//! reconciled so that callers can log it without extra context.

use secret_store::{ObjectKey, StoreError};
use thiserror::Error;

/// Errors surfaced by the secret reconciler.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Fetching the secret failed
    #[error("failed to get secret {key}: {source}")]
    Get { key: ObjectKey, source: StoreError },

    /// Creating the secret failed (not retried)
    #[error("failed to create secret {key}: {source}")]
    Create { key: ObjectKey, source: StoreError },

    /// Updating the secret failed with a non-conflict error
    #[error("failed to update secret {key}: {source}")]
    Update { key: ObjectKey, source: StoreError },

    /// Deleting the secret failed
    #[error("failed to delete secret {key}: {source}")]
    Delete { key: ObjectKey, source: StoreError },

    /// Every update attempt hit a stale resource version
    #[error("failed to update secret {key}: still conflicting after {attempts} attempts")]
    ConflictExhausted { key: ObjectKey, attempts: u32 },
}

impl ReconcileError {
    /// Key of the object the error is about
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Get { key, .. }
            | Self::Create { key, .. }
            | Self::Update { key, .. }
            | Self::Delete { key, .. }
            | Self::ConflictExhausted { key, .. } => key,
        }
    }

    /// Underlying store error, if there is one
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Get { source, .. }
            | Self::Create { source, .. }
            | Self::Update { source, .. }
            | Self::Delete { source, .. } => Some(source),
            Self::ConflictExhausted { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_not_found)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictExhausted { .. })
            || self.store_error().is_some_and(StoreError::is_conflict)
    }
}
