//! Data fingerprints
//!
//! A fingerprint is the SHA-256 of every value, hex encoded and concatenated
//! in sorted key order. It changes whenever a value changes or a key is added
//! or removed, and does not depend on map iteration order. Callers stamp it on
//! dependent workloads so that a change in secret content triggers a rollout.

use k8s_openapi::api::core::v1::Secret;
use sha2::{Digest, Sha256};

/// Fingerprint of an empty (or unavailable) data set.
pub const EMPTY_FINGERPRINT: &str = "";

/// Fingerprint a set of named byte blobs.
pub fn fingerprint<I, K, V>(entries: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut digests: Vec<(K, String)> = entries
        .into_iter()
        .map(|(key, value)| {
            let digest = hex::encode(Sha256::digest(value.as_ref()));
            (key, digest)
        })
        .collect();

    digests.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    digests.into_iter().map(|(_, digest)| digest).collect()
}

/// Fingerprint of a secret's `data`
pub fn secret_fingerprint(secret: &Secret) -> String {
    match &secret.data {
        Some(data) => fingerprint(data.iter().map(|(k, v)| (k, &v.0))),
        None => EMPTY_FINGERPRINT.to_string(),
    }
}
