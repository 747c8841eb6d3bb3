//! Secret store errors

use thiserror::Error;

/// Errors that can occur when talking to the secret store.
///
/// The reconciliation core only ever needs to tell apart the first three
/// variants; everything else collapses into `Transport`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists (create)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stale resource version (update)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other failure reported by the store or the transport
    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Update carried a stale resource version
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message.clone()),
            other => Self::Transport(other.to_string()),
        }
    }
}
