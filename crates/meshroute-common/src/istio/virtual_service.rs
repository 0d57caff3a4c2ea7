//! Istio VirtualService types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::impl_api_defaults;
use crate::kube_utils::{HasApiResource, ObjectMeta, UnmanagedFields};

/// Istio VirtualService: request matching and weighted routing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    /// API version
    #[serde(default = "VirtualService::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "VirtualService::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: VirtualServiceSpec,
    /// Fields not modelled here (e.g. `status`)
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl HasApiResource for VirtualService {
    const GROUP: &'static str = super::NETWORKING_GROUP;
    const VERSION: &'static str = super::NETWORKING_VERSION;
    const KIND: &'static str = "VirtualService";
    const PLURAL: &'static str = "virtualservices";
}

impl_api_defaults!(VirtualService);

impl VirtualService {
    /// Create a new VirtualService
    pub fn new(metadata: ObjectMeta, spec: VirtualServiceSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
            unmanaged: UnmanagedFields::new(),
        }
    }
}

/// VirtualService spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Hosts this routing applies to
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Gateways the routes are bound to (empty = mesh only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Ordered HTTP routing rules
    #[serde(default)]
    pub http: Vec<HttpRoute>,
    /// `tcp`, `tls`, `exportTo`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl VirtualServiceSpec {
    /// Index of the first rule whose first route targets `subset`
    pub fn find_rule_for_subset(&self, subset: &str) -> Option<usize> {
        self.http
            .iter()
            .position(|rule| rule.first_subset() == Some(subset))
    }
}

/// One HTTP routing rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Match conditions (OR'd)
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,
    /// Weighted destinations
    #[serde(default)]
    pub route: Vec<HttpRouteDestination>,
    /// Request timeout (e.g. "10s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Retry policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<HttpRetry>,
    /// Fault injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<HttpFaultInjection>,
    /// `name`, `rewrite`, `mirror`, `corsPolicy`, `headers`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl HttpRoute {
    /// Subset of the first route destination, if any
    pub fn first_subset(&self) -> Option<&str> {
        self.route
            .first()
            .and_then(|r| r.destination.subset.as_deref())
    }
}

/// A destination with an optional weight
///
/// A rule with several destinations needs explicit weights; a single
/// destination may omit it (implicit 100).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpRouteDestination {
    /// Target service and subset
    pub destination: Destination,
    /// Share of traffic in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// `headers`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Target service host and optional subset
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    /// Service host
    pub host: String,
    /// Subset name from the DestinationRule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    /// `port`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// String match expression
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StringMatch {
    /// Exact string match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// RE2 regular expression match
    Regex(String),
}

/// HTTP request match conditions (AND'd)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    /// Request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,
    /// Request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, StringMatch>,
    /// HTTP method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<StringMatch>,
    /// Gateway names the request must come through
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Labels of the calling workload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_labels: BTreeMap<String, String>,
    /// Case-insensitive matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_uri_case: Option<bool>,
    /// `authority`, `queryParams`, `port`, `withoutHeaders`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Retry policy
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRetry {
    /// Number of retries (unset means the mesh default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// Retry conditions (e.g. "5xx")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on: Option<String>,
    /// Timeout per attempt (e.g. "3s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_try_timeout: Option<String>,
    /// `retryRemoteLocalities`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Fault injection: delay, abort, or both
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpFaultInjection {
    /// Delay injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<FaultDelay>,
    /// Abort injection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<FaultAbort>,
}

/// Fixed delay injected before forwarding
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultDelay {
    /// Share of requests delayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Percent>,
    /// Delay duration (e.g. "5s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay: Option<String>,
    /// `exponentialDelay`, legacy `percent`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Request aborted with an HTTP status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultAbort {
    /// Share of requests aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Percent>,
    /// Status code returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u32>,
    /// `grpcStatus`, `http2Error`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// Percentage in the range 0.0-100.0
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Percent {
    /// Value
    pub value: f64,
}
