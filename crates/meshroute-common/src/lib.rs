//! Common types for meshroute: Istio resources, errors, and kube utilities

#![deny(missing_docs)]

pub mod error;
pub mod istio;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;
pub use kube_utils::{HasApiResource, ObjectMeta, UnmanagedFields};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";
