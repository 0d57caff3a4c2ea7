//! meshroute - Istio traffic-management reconciliation for a single service
//!
//! The binary loads a [`PolicyDescriptor`](meshroute_reconciler::PolicyDescriptor),
//! connects to the cluster and runs one reconciliation of the service's
//! DestinationRule, VirtualService and Gateway.

pub mod config;

use std::sync::Arc;

use tracing::info;

use meshroute_common::kube_utils::create_client;
use meshroute_common::{Error, Result};
use meshroute_reconciler::{KubeResourceStore, ReconcileReport, Reconciler};

pub use config::{load_descriptor, Config};

/// Load the policy and reconcile once against the configured cluster.
///
/// The reconciliation runs under the configured deadline; on expiry any
/// writes already made stay in place.
pub async fn run(config: &Config) -> Result<ReconcileReport> {
    let descriptor = load_descriptor(&config.policy).await?;
    let client = create_client(config.kubeconfig.as_deref()).await?;
    let store = Arc::new(KubeResourceStore::new(client, &config.namespace));
    let reconciler = Reconciler::new(store, config.naming());

    info!(
        service = %config.service_name,
        namespace = %config.namespace,
        timeout_secs = config.timeout_secs,
        "starting reconciliation"
    );
    tokio::time::timeout(config.timeout(), reconciler.reconcile(&descriptor))
        .await
        .map_err(|_| Error::timeout("reconcile", config.timeout_secs))?
}
