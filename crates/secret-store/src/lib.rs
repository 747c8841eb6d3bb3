//! Secret Store
//!
//! The narrow contract the reconciliation core needs from the place secrets
//! live: get, create, update (guarded by resource version) and delete, each
//! failing with a distinguishable [`StoreError`].
//!
//! # Example
//!
//! ```no_run
//! use secret_store::{KubeSecretStore, ObjectKey, SecretStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeSecretStore::new(client);
//!
//! match store.get(&ObjectKey::new("es-certs", "logging")).await {
//!     Ok(secret) => println!("found {:?}", secret.metadata.name),
//!     Err(e) if e.is_not_found() => println!("not there yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `test-util`: enables [`MockSecretStore`], an in-memory store with
//!   failure injection and scripted concurrent writers

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeSecretStore;
pub use error::StoreError;
pub use key::ObjectKey;
pub use store_trait::SecretStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockSecretStore, Operation};
