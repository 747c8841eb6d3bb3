//! Object keys

use k8s_openapi::api::core::v1::Secret;
use std::fmt;

/// Identifies a namespaced object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
}

impl ObjectKey {
    /// Key from its parts
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Key of a secret, taken from its metadata.
    ///
    /// Missing name or namespace map to the empty string; the store will
    /// reject such a key rather than the caller panicking here.
    pub fn of(secret: &Secret) -> Self {
        Self {
            name: secret.metadata.name.clone().unwrap_or_default(),
            namespace: secret.metadata.namespace.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
