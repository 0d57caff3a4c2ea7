//! Reconciler: fetch, then create or merge, for each managed resource
//!
//! One run reconciles the DestinationRule, then the VirtualService, then (when
//! requested) the Gateway. Each step is independent and nothing is rolled back:
//! if a later write fails, earlier writes stay in place and the error is
//! returned to the caller.
//!
//! The VirtualService merge treats the first HTTP rule as the traffic-split
//! rule. A version found as the first destination of some rule gets its weight
//! updated; an unknown version either takes over with its own rule (weight 100)
//! or joins the split in the first rule.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use meshroute_common::istio::{
    DestinationRuleSpec, GatewaySpec, HttpRoute, TrafficPolicy, VirtualService, VirtualServiceSpec,
};
use meshroute_common::{Error, HasApiResource, Result};

use crate::builders;
use crate::descriptor::{PolicyDescriptor, FULL_WEIGHT};
use crate::naming::NamingPolicy;
use crate::store::ResourceStore;

/// What a reconciliation step did to one resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The resource did not exist and was created
    Created,
    /// The resource existed and was replaced with the merged state
    Updated,
    /// The resource existed and already matched; nothing was written
    Unchanged,
    /// Nothing to create (no version for a new DestinationRule, gateway disabled)
    Skipped,
}

impl Outcome {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::Skipped => "skipped",
        }
    }

    /// Whether the step wrote to the store
    pub fn wrote(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource outcome of one reconciliation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// DestinationRule step
    pub destination_rule: Outcome,
    /// VirtualService step
    pub virtual_service: Outcome,
    /// Gateway step
    pub gateway: Outcome,
}

impl ReconcileReport {
    /// Number of resources written
    pub fn writes(&self) -> usize {
        [self.destination_rule, self.virtual_service, self.gateway]
            .iter()
            .filter(|o| o.wrote())
            .count()
    }
}

/// Reconciles the mesh resources of one service against a [`ResourceStore`]
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    naming: NamingPolicy,
}

impl Reconciler {
    /// Create a reconciler for the service described by `naming`
    pub fn new(store: Arc<dyn ResourceStore>, naming: NamingPolicy) -> Self {
        Self { store, naming }
    }

    /// Reconcile all managed resources with the descriptor
    #[instrument(skip(self, descriptor), fields(service = %self.naming.service_name()))]
    pub async fn reconcile(&self, descriptor: &PolicyDescriptor) -> Result<ReconcileReport> {
        info!(
            version = %descriptor.version,
            weight = descriptor.weight,
            gateway = descriptor.enable_gateway,
            "reconciling mesh traffic policy"
        );
        for warning in descriptor.degenerate_combinations() {
            warn!("{warning}");
        }

        let destination_rule = self.reconcile_destination_rule(descriptor).await?;
        let virtual_service = self.reconcile_virtual_service(descriptor).await?;
        let gateway = if descriptor.enable_gateway {
            self.reconcile_gateway(descriptor).await?
        } else {
            Outcome::Skipped
        };

        let report = ReconcileReport {
            destination_rule,
            virtual_service,
            gateway,
        };
        info!(
            destination_rule = %report.destination_rule,
            virtual_service = %report.virtual_service,
            gateway = %report.gateway,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Create the DestinationRule, or add the subset and replace the traffic policy
    pub async fn reconcile_destination_rule(
        &self,
        descriptor: &PolicyDescriptor,
    ) -> Result<Outcome> {
        let name = self.naming.destination_rule_name();

        let Some(existing) = self.store.get_destination_rule(&name).await? else {
            if !descriptor.has_version() {
                debug!(name = %name, "no version set, not creating DestinationRule");
                return Ok(Outcome::Skipped);
            }
            let rule = builders::build_destination_rule(descriptor, &self.naming);
            let created = self.store.create_destination_rule(&rule).await?;
            log_applied(&name, Outcome::Created, &created);
            return Ok(Outcome::Created);
        };

        debug!(name = %name, subsets = existing.spec.subsets.len(), "found DestinationRule");
        if !descriptor.has_version() {
            return Ok(Outcome::Unchanged);
        }

        let mut desired = existing.clone();
        merge_destination_rule(&mut desired.spec, descriptor);
        if desired == existing {
            return Ok(Outcome::Unchanged);
        }
        let updated = self.store.update_destination_rule(&desired).await?;
        log_applied(&name, Outcome::Updated, &updated);
        Ok(Outcome::Updated)
    }

    /// Create the VirtualService, or merge routing for the descriptor's version
    pub async fn reconcile_virtual_service(
        &self,
        descriptor: &PolicyDescriptor,
    ) -> Result<Outcome> {
        let name = self.naming.virtual_service_name();

        let Some(existing) = self.store.get_virtual_service(&name).await? else {
            let vs = builders::build_virtual_service(descriptor, &self.naming);
            let created = self.store.create_virtual_service(&vs).await?;
            log_applied(&name, Outcome::Created, &created);
            return Ok(Outcome::Created);
        };

        debug!(name = %name, rules = existing.spec.http.len(), "found VirtualService");
        let mut desired = existing.clone();
        merge_virtual_service(&name, &mut desired.spec, descriptor, &self.naming)?;
        if desired == existing {
            return Ok(Outcome::Unchanged);
        }
        let updated = self.store.update_virtual_service(&desired).await?;
        log_applied(&name, Outcome::Updated, &updated);
        Ok(Outcome::Updated)
    }

    /// Create the Gateway, or add the service host to its first server
    pub async fn reconcile_gateway(&self, descriptor: &PolicyDescriptor) -> Result<Outcome> {
        let name = self.naming.gateway_name();

        let Some(existing) = self.store.get_gateway(&name).await? else {
            let gateway = builders::build_gateway(descriptor, &self.naming);
            let created = self.store.create_gateway(&gateway).await?;
            log_applied(&name, Outcome::Created, &created);
            return Ok(Outcome::Created);
        };

        debug!(name = %name, servers = existing.spec.servers.len(), "found Gateway");
        let mut desired = existing.clone();
        merge_gateway(&mut desired.spec, descriptor, &self.naming);
        if desired == existing {
            return Ok(Outcome::Unchanged);
        }
        let updated = self.store.update_gateway(&desired).await?;
        log_applied(&name, Outcome::Updated, &updated);
        Ok(Outcome::Updated)
    }
}

// =============================================================================
// Merge rules
// =============================================================================

/// Add the version's subset if missing and replace the traffic policy.
///
/// Circuit breaker settings are not merged field by field; the last run wins.
/// Policy fields meshroute does not generate (`loadBalancer`, `tls`) stay.
/// The caller guards against an empty version.
pub fn merge_destination_rule(spec: &mut DestinationRuleSpec, descriptor: &PolicyDescriptor) {
    if spec.add_subset(builders::build_subset(descriptor)) {
        debug!(subset = %descriptor.version, "adding subset");
    }
    let unmanaged = spec
        .traffic_policy
        .take()
        .map(|policy| policy.unmanaged)
        .unwrap_or_default();
    spec.traffic_policy = Some(TrafficPolicy {
        unmanaged,
        ..builders::build_traffic_policy(descriptor)
    });
}

/// Merge the descriptor into an existing VirtualService spec.
///
/// Without a version the first rule's timeout, retry, fault and first
/// destination are overwritten. With a version, weights and rules are merged
/// as described in the module docs.
pub fn merge_virtual_service(
    name: &str,
    spec: &mut VirtualServiceSpec,
    descriptor: &PolicyDescriptor,
    naming: &NamingPolicy,
) -> Result<()> {
    spec.hosts = builders::build_hosts(descriptor, naming);
    if descriptor.enable_gateway {
        spec.gateways = builders::build_gateways(descriptor, naming);
    }

    if !descriptor.has_version() {
        let rule = spec
            .http
            .first_mut()
            .ok_or_else(|| shape_error(name, "no http rules to update"))?;
        rule.timeout = builders::build_timeout(descriptor);
        rule.retries = builders::build_retry(descriptor);
        rule.fault = builders::build_fault(descriptor);
        let route = rule
            .route
            .first_mut()
            .ok_or_else(|| shape_error(name, "first http rule has no route"))?;
        let destination = builders::build_destination(descriptor, naming);
        route.destination.host = destination.host;
        route.destination.subset = destination.subset;
        return Ok(());
    }

    match spec.find_rule_for_subset(&descriptor.version) {
        Some(index) => {
            debug!(subset = %descriptor.version, rule = index, "updating weight of existing route");
            if let Some(route) = spec.http[index].route.first_mut() {
                route.weight = builders::route_weight(descriptor);
            }
        }
        None if descriptor.weight == FULL_WEIGHT => {
            debug!(subset = %descriptor.version, "adding takeover rule");
            spec.http.push(builders::build_takeover_route(descriptor, naming));
        }
        None => {
            debug!(subset = %descriptor.version, weight = descriptor.weight, "joining traffic split");
            let rule = spec
                .http
                .first_mut()
                .ok_or_else(|| shape_error(name, "no http rule to split traffic in"))?;
            rule.route.push(builders::build_route_destination(descriptor, naming));
            if joined_without_weight(rule) {
                warn!(
                    subset = %descriptor.version,
                    "traffic split has a destination without weight"
                );
            }
        }
    }
    Ok(())
}

/// Whether the destination just appended to a split carries no weight
pub fn joined_without_weight(rule: &HttpRoute) -> bool {
    rule.route.len() > 1 && rule.route.last().is_some_and(|r| r.weight.is_none())
}

/// Add `<service>.<domain>` to the first server's hosts; nothing else changes
pub fn merge_gateway(spec: &mut GatewaySpec, descriptor: &PolicyDescriptor, naming: &NamingPolicy) {
    match spec.servers.first_mut() {
        Some(server) => {
            let host = naming.external_host(&descriptor.domain);
            if server.add_host(host.clone()) {
                debug!(host = %host, "adding gateway host");
            }
        }
        None => warn!("gateway has no servers; host not added"),
    }
}

fn shape_error(name: &str, message: &str) -> Error {
    Error::reconcile(VirtualService::KIND, name, message)
}

fn log_applied<R>(name: &str, outcome: Outcome, resource: &R)
where
    R: HasApiResource + Serialize,
{
    info!(kind = R::KIND, name = %name, %outcome, "applied resource");
    match serde_yaml::to_string(resource) {
        Ok(yaml) => debug!(kind = R::KIND, name = %name, "{yaml}"),
        Err(e) => debug!(kind = R::KIND, name = %name, error = %e, "could not render resource"),
    }
}
