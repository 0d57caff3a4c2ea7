//! Error types for meshroute
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource kind and name (or the configuration
//! field) involved, so a failed run can be traced to the exact remote write.

use thiserror::Error;

/// Main error type for meshroute operations
#[derive(Debug, Error)]
pub enum Error {
    /// Remote store failure while reading or writing a resource
    #[error("store error for {kind} {name}: {message}")]
    Store {
        /// Resource kind (DestinationRule, VirtualService, Gateway)
        kind: String,
        /// Resource name
        name: String,
        /// Description of what failed
        message: String,
        /// The API error behind the failure, when the store is the cluster
        #[source]
        source: Option<kube::Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Invalid configuration or policy descriptor
    #[error("validation error: {message}")]
    Validation {
        /// The invalid field path (e.g., "fault.percentage")
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },

    /// An existing resource cannot be merged with the desired state
    #[error("reconcile error for {kind} {name}: {message}")]
    Reconcile {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Description of the conflicting shape
        message: String,
    },

    /// Deadline exceeded
    #[error("timeout [{context}] after {seconds}s")]
    Timeout {
        /// What was running when the deadline passed
        context: String,
        /// The deadline in seconds
        seconds: u64,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "bootstrap")
        context: String,
    },
}

impl Error {
    /// Create a store error for a resource
    pub fn store(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Store {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
            source: None,
        }
    }

    /// Create a store error from a failed Kubernetes API call
    ///
    /// `action` is the verb that failed (get, create, update).
    pub fn store_api(
        kind: impl Into<String>,
        name: impl Into<String>,
        action: &str,
        source: kube::Error,
    ) -> Self {
        Self::Store {
            kind: kind.into(),
            name: name.into(),
            message: format!("{action} failed: {source}"),
            source: Some(source),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error pointing at a descriptor field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create a reconcile error for a resource whose shape prevents the merge
    pub fn reconcile(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Reconcile {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            context: context.into(),
            seconds,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// The reconciler itself never retries; this tells the host whether a
    /// second run has a chance of succeeding without a configuration change.
    pub fn is_retryable(&self) -> bool {
        match self {
            // 4xx other than 429 needs a change before a rerun can succeed
            Error::Store { source, .. } => !matches!(
                source,
                Some(kube::Error::Api(ae)) if (400..500).contains(&ae.code) && ae.code != 429
            ),
            Error::Serialization { .. } => false,
            Error::Validation { .. } => false,
            Error::Reconcile { .. } => false,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the resource kind if this error is associated with one
    pub fn kind(&self) -> Option<&str> {
        match self {
            Error::Store { kind, .. } | Error::Reconcile { kind, .. } => Some(kind),
            Error::Serialization { kind, .. } => kind.as_deref(),
            _ => None,
        }
    }
}
