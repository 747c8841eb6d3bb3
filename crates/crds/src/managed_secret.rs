//! ManagedSecret Custom Resource Definition
//!
//! Declares the desired content of a Kubernetes Secret. The controller keeps
//! the Secret in sync and reports the data fingerprint in the status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ManagedSecretSpec defines the desired state of a Secret
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "secrets.microscaler.io",
    version = "v1alpha1",
    kind = "ManagedSecret",
    namespaced,
    status = "ManagedSecretStatus",
    shortname = "msec",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".spec.secretName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretSpec {
    /// Name of the Secret to manage (defaults to the ManagedSecret's name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Base64-encoded values, as in a Secret's `data`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,

    /// Plain-text values; take precedence over `data` for the same key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,

    /// Annotations for the Secret (only enforced with `AnnotationsAndData`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Labels set when the Secret is created
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Which fields are compared and overwritten on update
    #[serde(default)]
    pub strategy: MergeStrategy,

    /// Deployments (same namespace) restarted when the Secret's data changes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollout_deployments: Vec<String>,
}

/// Fields a ManagedSecret owns on its Secret
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Only `data`; annotations written by others are left alone
    #[default]
    Data,
    /// `metadata.annotations` and `data`
    AnnotationsAndData,
}

/// Sync state of a ManagedSecret
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// ManagedSecretStatus defines the observed state of a ManagedSecret
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretStatus {
    /// Current state
    pub state: SyncState,

    /// Fingerprint of the Secret's data after the last sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Generation of the spec that was last synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// What the last sync did (Created, Unchanged, Updated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,

    /// Error message if the last sync failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last time the Secret was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<chrono::DateTime<chrono::Utc>>,
}

impl ManagedSecret {
    /// Name of the Secret this resource manages
    pub fn target_secret_name(&self) -> Option<&str> {
        self.spec
            .secret_name
            .as_deref()
            .or(self.metadata.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_defaults() {
        let spec: ManagedSecretSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec, ManagedSecretSpec::default());
        assert_eq!(spec.strategy, MergeStrategy::Data);
    }

    #[test]
    fn test_spec_camel_case() {
        let spec: ManagedSecretSpec = serde_json::from_value(serde_json::json!({
            "secretName": "es-certs",
            "stringData": {"user": "admin"},
            "strategy": "AnnotationsAndData",
            "rolloutDeployments": ["kibana"]
        }))
        .unwrap();
        assert_eq!(spec.secret_name.as_deref(), Some("es-certs"));
        assert_eq!(spec.string_data.get("user").map(String::as_str), Some("admin"));
        assert_eq!(spec.strategy, MergeStrategy::AnnotationsAndData);
        assert_eq!(spec.rollout_deployments, vec!["kibana".to_string()]);
    }

    #[test]
    fn test_target_secret_name_falls_back_to_resource_name() {
        let mut ms = ManagedSecret::new("es-certs", ManagedSecretSpec::default());
        assert_eq!(ms.target_secret_name(), Some("es-certs"));

        ms.spec.secret_name = Some("other".to_string());
        assert_eq!(ms.target_secret_name(), Some("other"));
    }

    #[test]
    fn test_status_serializes_pascal_case_state() {
        let status = ManagedSecretStatus {
            state: SyncState::Synced,
            fingerprint: Some("abc".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "Synced");
        assert_eq!(value["fingerprint"], "abc");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = ManagedSecret::crd();
        assert_eq!(crd.spec.group, "secrets.microscaler.io");
        assert_eq!(crd.spec.names.kind, "ManagedSecret");
        assert_eq!(crd.spec.names.short_names, Some(vec!["msec".to_string()]));
    }
}
