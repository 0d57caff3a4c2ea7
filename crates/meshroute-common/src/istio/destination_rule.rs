//! Istio DestinationRule types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::impl_api_defaults;
use crate::kube_utils::{HasApiResource, ObjectMeta, UnmanagedFields};

/// Istio DestinationRule: per-service subsets and resilience policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRule {
    /// API version
    #[serde(default = "DestinationRule::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "DestinationRule::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DestinationRuleSpec,
    /// Fields not modelled here (e.g. `status`)
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl HasApiResource for DestinationRule {
    const GROUP: &'static str = super::NETWORKING_GROUP;
    const VERSION: &'static str = super::NETWORKING_VERSION;
    const KIND: &'static str = "DestinationRule";
    const PLURAL: &'static str = "destinationrules";
}

impl_api_defaults!(DestinationRule);

impl DestinationRule {
    /// Create a new DestinationRule
    pub fn new(metadata: ObjectMeta, spec: DestinationRuleSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
            unmanaged: UnmanagedFields::new(),
        }
    }
}

/// DestinationRule spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// Target service host
    pub host: String,
    /// Named subsets, unique by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,
    /// Traffic policy applied to all subsets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
    /// `exportTo`, `workloadSelector`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl DestinationRuleSpec {
    /// Whether a subset with this name exists
    pub fn has_subset(&self, name: &str) -> bool {
        self.subsets.iter().any(|s| s.name == name)
    }

    /// Add a subset unless one with the same name exists.
    ///
    /// Returns `true` if the subset was added.
    pub fn add_subset(&mut self, subset: Subset) -> bool {
        if self.has_subset(&subset.name) {
            return false;
        }
        self.subsets.push(subset);
        true
    }
}

/// A named partition of a service's instances, selected by labels
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Subset {
    /// Subset name (typically the version)
    pub name: String,
    /// Pod labels selecting the subset
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Per-subset `trafficPolicy`, `annotations`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Traffic policy: connection pool and outlier detection
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicy {
    /// Connection pool settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_pool: Option<ConnectionPoolSettings>,
    /// Circuit breaking via endpoint ejection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier_detection: Option<OutlierDetection>,
    /// `loadBalancer`, `tls`, `portLevelSettings`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Connection pool settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionPoolSettings {
    /// HTTP connection pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConnectionPool>,
    /// `tcp`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// HTTP connection pool limits; all unset means mesh defaults
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpConnectionPool {
    /// Max pending HTTP/1.1 requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http1_max_pending_requests: Option<u32>,
    /// Max concurrent HTTP/2 requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_max_requests: Option<u32>,
    /// Max requests per connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests_per_connection: Option<u32>,
    /// Max outstanding retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// `idleTimeout`, `h2UpgradePolicy`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Outlier detection (circuit breaker)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetection {
    /// Consecutive 5xx errors before an endpoint is ejected
    #[serde(
        rename = "consecutive5xxErrors",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub consecutive_errors: Option<u32>,
    /// Minimum ejection duration (e.g. "30s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ejection_time: Option<String>,
    /// Max percentage of endpoints that can be ejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ejection_percent: Option<u32>,
    /// `interval`, `minHealthPercent`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}
