//! Istio traffic-management resource types
//!
//! Typed `networking.istio.io/v1beta1` resources that meshroute reads and writes:
//! - **DestinationRule**: subsets (versions) and traffic policy (circuit breaking)
//! - **VirtualService**: HTTP matching, weighted routing, timeout/retry/fault
//! - **Gateway**: ingress servers and exposed hostnames
//!
//! All resource types implement `HasApiResource` for consistent API version handling.

/// Implements `default_api_version()` and `default_kind()` serde defaults for
/// types implementing `HasApiResource`.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as $crate::kube_utils::HasApiResource>::api_version()
            }
            fn default_kind() -> String {
                <Self as $crate::kube_utils::HasApiResource>::KIND.to_string()
            }
        }
    };
}

pub(crate) use impl_api_defaults;

mod destination_rule;
mod gateway;
mod virtual_service;

pub use destination_rule::{
    ConnectionPoolSettings, DestinationRule, DestinationRuleSpec, HttpConnectionPool,
    OutlierDetection, Subset, TrafficPolicy,
};
pub use gateway::{Gateway, GatewayPort, GatewayServer, GatewaySpec};
pub use virtual_service::{
    Destination, FaultAbort, FaultDelay, HttpFaultInjection, HttpMatchRequest, HttpRetry,
    HttpRoute, HttpRouteDestination, Percent, StringMatch, VirtualService, VirtualServiceSpec,
};

/// API group shared by all managed resources
pub const NETWORKING_GROUP: &str = "networking.istio.io";
/// API version of the managed resources
pub const NETWORKING_VERSION: &str = "v1beta1";

/// Render a whole number of seconds as an Istio duration (e.g. `"30s"`)
pub fn seconds(secs: u64) -> String {
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_format() {
        assert_eq!(seconds(30), "30s");
        assert_eq!(seconds(0), "0s");
    }
}
