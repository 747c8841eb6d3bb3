//! Reconciliation core
//!
//! The parts of a controller that carry actual logic, kept free of any
//! watch loop so they can be tested against an in-memory store:
//!
//! - [`secret`]: conflict-safe create-or-update of secrets with pluggable
//!   equality and merge rules, plus idempotent create/delete helpers
//! - [`resources`]: three-tier (workload, cluster, default) resolution of
//!   CPU and memory requests and limits
//! - [`fingerprint`]: order-independent digest over secret data, used to
//!   decide when dependent workloads must be rolled
//! - [`retry`]: the bounded retry combinator the reconciler uses on conflict
//!
//! # Example
//!
//! ```no_run
//! use reconcile_core::secret::{new_secret, synchronize, SecretStrategy};
//! use reconcile_core::retry::RetryPolicy;
//! use secret_store::SecretStore;
//! use std::collections::BTreeMap;
//!
//! # async fn example(store: &dyn SecretStore) -> Result<(), Box<dyn std::error::Error>> {
//! let desired = new_secret(
//!     "es-certs",
//!     "logging",
//!     BTreeMap::from([("admin-ca".to_string(), b"...".to_vec())]),
//! );
//!
//! let outcome = synchronize(store, &desired, &SecretStrategy::DataOnly, &RetryPolicy::default()).await?;
//! println!("secret {}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fingerprint;
pub mod quantity;
pub mod resources;
pub mod retry;
pub mod secret;

pub use error::ReconcileError;
pub use fingerprint::{fingerprint, secret_fingerprint, EMPTY_FINGERPRINT};
pub use resources::{resolve, DefaultResources, QuantityPair};
pub use retry::RetryPolicy;
pub use secret::{synchronize, SecretStrategy, SyncOutcome, SyncStrategy};
