//! Istio Gateway types
//!
//! This is the Istio `networking.istio.io` Gateway (selector + servers), not
//! the Kubernetes Gateway API resource of the same name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::impl_api_defaults;
use crate::kube_utils::{HasApiResource, ObjectMeta, UnmanagedFields};

/// Istio Gateway: an ingress entry point exposing hostnames into the mesh
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: GatewaySpec,
    /// Fields not modelled here (e.g. `status`)
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl HasApiResource for Gateway {
    const GROUP: &'static str = super::NETWORKING_GROUP;
    const VERSION: &'static str = super::NETWORKING_VERSION;
    const KIND: &'static str = "Gateway";
    const PLURAL: &'static str = "gateways";
}

impl_api_defaults!(Gateway);

impl Gateway {
    /// Create a new Gateway
    pub fn new(metadata: ObjectMeta, spec: GatewaySpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
            unmanaged: UnmanagedFields::new(),
        }
    }
}

/// Gateway spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewaySpec {
    /// Labels selecting the gateway workload (e.g. istio=ingressgateway)
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Exposed servers
    #[serde(default)]
    pub servers: Vec<GatewayServer>,
    /// Anything else set on the spec
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

/// A listening port and the hosts it exposes
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayServer {
    /// Listening port
    pub port: GatewayPort,
    /// Exposed hostnames, without duplicates
    #[serde(default)]
    pub hosts: Vec<String>,
    /// `tls`, `bind`, `name`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl GatewayServer {
    /// Add a host unless already present. Returns `true` if added.
    pub fn add_host(&mut self, host: impl Into<String>) -> bool {
        let host = host.into();
        if self.hosts.contains(&host) {
            return false;
        }
        self.hosts.push(host);
        true
    }
}

/// Gateway port
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GatewayPort {
    /// Port number
    pub number: u32,
    /// Protocol (HTTP, HTTPS, GRPC, TCP, ...)
    pub protocol: String,
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `targetPort`
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}
