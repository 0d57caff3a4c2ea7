//! Resource builders: pure translation of a [`PolicyDescriptor`] into
//! DestinationRule, VirtualService and Gateway fragments.
//!
//! Nothing here talks to the cluster. The reconciler decides which fragments
//! go into a new resource and which are merged into an existing one.

use std::collections::BTreeMap;

use meshroute_common::istio::{
    self, ConnectionPoolSettings, Destination, DestinationRule, DestinationRuleSpec, FaultAbort,
    FaultDelay, Gateway, GatewayPort, GatewayServer, GatewaySpec, HttpConnectionPool,
    HttpFaultInjection, HttpMatchRequest, HttpRetry, HttpRoute, HttpRouteDestination,
    OutlierDetection, Percent, StringMatch, Subset, TrafficPolicy, VirtualService,
    VirtualServiceSpec,
};
use meshroute_common::ObjectMeta;

use crate::descriptor::{FaultKind, MatchMode, MatchRule, MatchTarget, PolicyDescriptor};
use crate::naming::NamingPolicy;

/// Retry conditions for generated retry policies
pub const RETRY_ON: &str = "5xx";
/// How long an ejected endpoint stays out
pub const BASE_EJECTION_SECONDS: u64 = 30;
/// Every endpoint may be ejected
pub const MAX_EJECTION_PERCENT: u32 = 100;
/// Label carrying the version on pods
pub const VERSION_LABEL: &str = "version";
/// Selector of the shared ingress gateway workload
pub const INGRESS_SELECTOR: (&str, &str) = ("istio", "ingressgateway");

// =============================================================================
// DestinationRule fragments
// =============================================================================

/// Subset named after the version, selecting pods by `version` label.
///
/// Callers guard against an empty version.
pub fn build_subset(descriptor: &PolicyDescriptor) -> Subset {
    Subset {
        name: descriptor.version.clone(),
        labels: BTreeMap::from([(VERSION_LABEL.to_string(), descriptor.version.clone())]),
        ..Default::default()
    }
}

/// Empty HTTP connection pool, plus outlier detection when circuit breaking is on
pub fn build_traffic_policy(descriptor: &PolicyDescriptor) -> TrafficPolicy {
    let outlier_detection = (descriptor.circuit_breaker_errors > 0).then(|| OutlierDetection {
        consecutive_errors: Some(descriptor.circuit_breaker_errors),
        base_ejection_time: Some(istio::seconds(BASE_EJECTION_SECONDS)),
        max_ejection_percent: Some(MAX_EJECTION_PERCENT),
        ..Default::default()
    });

    TrafficPolicy {
        connection_pool: Some(ConnectionPoolSettings {
            http: Some(HttpConnectionPool::default()),
            ..Default::default()
        }),
        outlier_detection,
        ..Default::default()
    }
}

/// Full DestinationRule for first-time creation
pub fn build_destination_rule(
    descriptor: &PolicyDescriptor,
    naming: &NamingPolicy,
) -> DestinationRule {
    DestinationRule::new(
        ObjectMeta::new(naming.destination_rule_name(), naming.namespace()),
        DestinationRuleSpec {
            host: naming.service_name().to_string(),
            subsets: vec![build_subset(descriptor)],
            traffic_policy: Some(build_traffic_policy(descriptor)),
            ..Default::default()
        },
    )
}

// =============================================================================
// VirtualService fragments
// =============================================================================

/// Request timeout, or `None` when no timeout is configured
pub fn build_timeout(descriptor: &PolicyDescriptor) -> Option<String> {
    (descriptor.timeout_seconds > 0).then(|| istio::seconds(descriptor.timeout_seconds))
}

/// Retry policy splitting the timeout evenly across attempts.
///
/// The per-try timeout is `round(timeout / retries)` seconds, rounding half up.
pub fn build_retry(descriptor: &PolicyDescriptor) -> Option<HttpRetry> {
    if descriptor.number_of_retries == 0 {
        return None;
    }

    let per_try_timeout = (descriptor.timeout_seconds > 0).then(|| {
        let ratio = descriptor.timeout_seconds as f64 / descriptor.number_of_retries as f64;
        istio::seconds(ratio.round() as u64)
    });

    Some(HttpRetry {
        attempts: Some(descriptor.number_of_retries),
        retry_on: Some(RETRY_ON.to_string()),
        per_try_timeout,
        ..Default::default()
    })
}

/// Destination for this service and version; no subset when unversioned
pub fn build_destination(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> Destination {
    Destination {
        host: naming.service_name().to_string(),
        subset: descriptor.has_version().then(|| descriptor.version.clone()),
        ..Default::default()
    }
}

/// Destination carrying the descriptor weight; weight 0 is left implicit
pub fn build_route_destination(
    descriptor: &PolicyDescriptor,
    naming: &NamingPolicy,
) -> HttpRouteDestination {
    HttpRouteDestination {
        destination: build_destination(descriptor, naming),
        weight: route_weight(descriptor),
        ..Default::default()
    }
}

/// Weight to write on a route: `None` for 0 (implicit share)
pub fn route_weight(descriptor: &PolicyDescriptor) -> Option<u32> {
    (descriptor.weight > 0).then_some(descriptor.weight)
}

fn string_match(mode: MatchMode, value: &str) -> StringMatch {
    match mode {
        MatchMode::Exact => StringMatch::Exact(value.to_string()),
        MatchMode::Prefix => StringMatch::Prefix(value.to_string()),
        MatchMode::Regex => StringMatch::Regex(value.to_string()),
    }
}

/// Typed match request for one rule
pub fn build_match_request(rule: &MatchRule) -> HttpMatchRequest {
    let mut request = HttpMatchRequest {
        ignore_uri_case: Some(rule.ignore_case),
        ..Default::default()
    };

    match rule.target {
        MatchTarget::Uri => request.uri = Some(string_match(rule.mode, &rule.value)),
        MatchTarget::Header => {
            request
                .headers
                .insert(rule.key.clone(), string_match(rule.mode, &rule.value));
        }
        MatchTarget::Method => request.method = Some(string_match(rule.mode, &rule.value)),
        MatchTarget::Gateway => request.gateways = vec![rule.value.clone()],
        MatchTarget::SourceLabel => {
            request
                .source_labels
                .insert(rule.key.clone(), rule.value.clone());
        }
    }

    request
}

/// Abort or delay injection, or `None` when no fault is active
pub fn build_fault(descriptor: &PolicyDescriptor) -> Option<HttpFaultInjection> {
    let fault = descriptor.active_fault()?;
    let percentage = Some(Percent {
        value: f64::from(fault.percentage),
    });

    Some(match fault.kind {
        FaultKind::Abort => HttpFaultInjection {
            abort: Some(FaultAbort {
                percentage,
                http_status: Some(fault.http_status),
                ..Default::default()
            }),
            delay: None,
        },
        FaultKind::Delay => HttpFaultInjection {
            abort: None,
            delay: Some(FaultDelay {
                percentage,
                fixed_delay: Some(istio::seconds(fault.delay_seconds)),
                ..Default::default()
            }),
        },
    })
}

fn http_route_with(descriptor: &PolicyDescriptor, route: HttpRouteDestination) -> HttpRoute {
    HttpRoute {
        matches: descriptor.matches.iter().map(build_match_request).collect(),
        route: vec![route],
        timeout: build_timeout(descriptor),
        retries: build_retry(descriptor),
        fault: build_fault(descriptor),
        ..Default::default()
    }
}

/// The single HTTP rule of a newly created VirtualService
pub fn build_http_route(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> HttpRoute {
    http_route_with(
        descriptor,
        HttpRouteDestination {
            destination: build_destination(descriptor, naming),
            weight: None,
            ..Default::default()
        },
    )
}

/// HTTP rule dedicated to a version that takes all matched traffic
pub fn build_takeover_route(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> HttpRoute {
    http_route_with(descriptor, build_route_destination(descriptor, naming))
}

/// `[service]`, plus `service.domain` when the gateway is enabled
pub fn build_hosts(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> Vec<String> {
    let mut hosts = vec![naming.service_name().to_string()];
    if descriptor.enable_gateway {
        hosts.push(naming.external_host(&descriptor.domain));
    }
    hosts
}

/// `[gateway name]` when the gateway is enabled, else empty
pub fn build_gateways(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> Vec<String> {
    if descriptor.enable_gateway {
        vec![naming.gateway_name()]
    } else {
        Vec::new()
    }
}

/// Full VirtualService for first-time creation
pub fn build_virtual_service(
    descriptor: &PolicyDescriptor,
    naming: &NamingPolicy,
) -> VirtualService {
    VirtualService::new(
        ObjectMeta::new(naming.virtual_service_name(), naming.namespace()),
        VirtualServiceSpec {
            hosts: build_hosts(descriptor, naming),
            gateways: build_gateways(descriptor, naming),
            http: vec![build_http_route(descriptor, naming)],
            ..Default::default()
        },
    )
}

// =============================================================================
// Gateway
// =============================================================================

/// Port 80 HTTP server exposing `host`
pub fn build_gateway_server(host: String) -> GatewayServer {
    GatewayServer {
        port: GatewayPort {
            number: 80,
            protocol: "HTTP".to_string(),
            name: Some("http".to_string()),
            ..Default::default()
        },
        hosts: vec![host],
        ..Default::default()
    }
}

/// Full Gateway for first-time creation
pub fn build_gateway(descriptor: &PolicyDescriptor, naming: &NamingPolicy) -> Gateway {
    let (key, value) = INGRESS_SELECTOR;
    Gateway::new(
        ObjectMeta::new(naming.gateway_name(), naming.namespace()),
        GatewaySpec {
            selector: BTreeMap::from([(key.to_string(), value.to_string())]),
            servers: vec![build_gateway_server(
                naming.external_host(&descriptor.domain),
            )],
            ..Default::default()
        },
    )
}
