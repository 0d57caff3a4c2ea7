//! End-to-end reconciliation against a live cluster
//!
//! Requires a cluster with the Istio networking CRDs installed. Ignored by
//! default; run with:
//!
//! ```bash
//! cargo test --test cluster -- --ignored
//! ```
//!
//! Each test uses its own service name so runs do not interfere, and deletes
//! what it created.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use kube::api::{Api, DeleteParams, DynamicObject};
use kube::Client;

use meshroute_common::istio::{DestinationRule, Gateway, VirtualService};
use meshroute_common::kube_utils::create_client;
use meshroute_common::HasApiResource;
use meshroute_reconciler::{
    KubeResourceStore, NamingPolicy, Outcome, PolicyDescriptor, ReconcileReport, Reconciler,
    ResourceStore,
};

const NAMESPACE: &str = "default";

// =============================================================================
// Helpers
// =============================================================================

fn unique_service(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("{prefix}-{nanos}")
}

async fn delete<R: HasApiResource>(client: &Client, name: &str) {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), NAMESPACE, &R::api_resource());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

async fn cleanup(client: &Client, naming: &NamingPolicy) {
    delete::<DestinationRule>(client, &naming.destination_rule_name()).await;
    delete::<VirtualService>(client, &naming.virtual_service_name()).await;
    delete::<Gateway>(client, &naming.gateway_name()).await;
}

fn versioned(version: &str, weight: u32) -> PolicyDescriptor {
    PolicyDescriptor {
        version: version.to_string(),
        weight,
        timeout_seconds: 10,
        number_of_retries: 3,
        ..Default::default()
    }
}

// =============================================================================
// Stories
// =============================================================================

/// Story: a service ships v1, then canaries v2 at 20%, then v3 takes over.
///
/// Every step must keep the routes of earlier versions in place.
#[tokio::test]
#[ignore = "requires a cluster with Istio CRDs"]
async fn story_canary_rollout() {
    let client = create_client(None).await.unwrap();
    let naming = NamingPolicy::new(unique_service("canary"), NAMESPACE);
    let store = Arc::new(KubeResourceStore::new(client.clone(), NAMESPACE));
    let reconciler = Reconciler::new(store.clone(), naming.clone());

    let result = async {
        let report = reconciler.reconcile(&versioned("v1", 0)).await?;
        assert_eq!(
            report,
            ReconcileReport {
                destination_rule: Outcome::Created,
                virtual_service: Outcome::Created,
                gateway: Outcome::Skipped,
            }
        );

        reconciler.reconcile(&versioned("v2", 20)).await?;
        reconciler.reconcile(&versioned("v3", 100)).await?;

        let vs = store
            .get_virtual_service(&naming.virtual_service_name())
            .await?
            .expect("virtual service exists");
        assert_eq!(vs.spec.http.len(), 2);
        assert_eq!(vs.spec.http[0].route.len(), 2);
        assert_eq!(vs.spec.http[1].first_subset(), Some("v3"));

        let rule = store
            .get_destination_rule(&naming.destination_rule_name())
            .await?
            .expect("destination rule exists");
        assert_eq!(rule.spec.subsets.len(), 3);

        // Nothing left to change
        let report = reconciler.reconcile(&versioned("v3", 100)).await?;
        assert_eq!(report.writes(), 0);
        Ok::<_, meshroute_common::Error>(())
    }
    .await;

    cleanup(&client, &naming).await;
    result.unwrap();
}

/// Story: a service is exposed through its own ingress gateway.
#[tokio::test]
#[ignore = "requires a cluster with Istio CRDs"]
async fn story_gateway_exposure() {
    let client = create_client(None).await.unwrap();
    let naming = NamingPolicy::new(unique_service("edge"), NAMESPACE);
    let store = Arc::new(KubeResourceStore::new(client.clone(), NAMESPACE));
    let reconciler = Reconciler::new(store.clone(), naming.clone());

    let descriptor = PolicyDescriptor {
        enable_gateway: true,
        domain: "example.com".to_string(),
        ..versioned("v1", 0)
    };

    let result = async {
        let report = reconciler.reconcile(&descriptor).await?;
        assert_eq!(report.gateway, Outcome::Created);

        let gw = store
            .get_gateway(&naming.gateway_name())
            .await?
            .expect("gateway exists");
        assert_eq!(
            gw.spec.servers[0].hosts,
            vec![naming.external_host("example.com")]
        );

        let report = reconciler.reconcile(&descriptor).await?;
        assert_eq!(report.gateway, Outcome::Unchanged);
        Ok::<_, meshroute_common::Error>(())
    }
    .await;

    cleanup(&client, &naming).await;
    result.unwrap();
}
