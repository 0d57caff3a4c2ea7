//! Deterministic resource names derived from the service's logical name

use meshroute_common::DEFAULT_NAMESPACE;

/// Service name used when the host configuration sets none
pub const DEFAULT_SERVICE_NAME: &str = "default";

/// Naming policy for the managed resources of one service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamingPolicy {
    service_name: String,
    namespace: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME, DEFAULT_NAMESPACE)
    }
}

impl NamingPolicy {
    /// Create a naming policy. An empty service name falls back to `"default"`.
    pub fn new(service_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let service_name = service_name.into();
        let service_name = if service_name.is_empty() {
            DEFAULT_SERVICE_NAME.to_string()
        } else {
            service_name
        };
        Self {
            service_name,
            namespace: namespace.into(),
        }
    }

    /// Logical service name (also the mesh host)
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Namespace the resources live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<service>-destination`
    pub fn destination_rule_name(&self) -> String {
        format!("{}-destination", self.service_name)
    }

    /// `<service>-route`
    pub fn virtual_service_name(&self) -> String {
        format!("{}-route", self.service_name)
    }

    /// The bare service name
    pub fn gateway_name(&self) -> String {
        self.service_name.clone()
    }

    /// `<service>.<domain>`
    pub fn external_host(&self, domain: &str) -> String {
        format!("{}.{}", self.service_name, domain)
    }
}
