//! Managed Secret CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the managed secret controller.

pub mod managed_secret;

pub use managed_secret::*;
