//! Shared Kubernetes utilities using kube-rs
//!
//! Metadata for the Istio resources meshroute manages, compile-time
//! `ApiResource` derivation, and client construction with bounded timeouts.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::debug;

use crate::Error;

/// Label carrying the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label identifying the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Value of [`LABEL_MANAGED_BY`] for resources created by meshroute
pub const LABEL_MANAGED_BY_MESHROUTE: &str = "meshroute";

/// Fields of a fetched object that meshroute does not model.
///
/// Flattened into every typed struct so a fetch, merge, replace cycle sends
/// them back exactly as read.
pub type UnmanagedFields = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// ObjectMeta
// =============================================================================

/// Kubernetes ObjectMeta for the managed Istio resources.
///
/// Resources created by meshroute get the standard name and managed-by labels.
/// Resources fetched from the cluster keep whatever labels they already had,
/// plus their `resourceVersion` so an update is an optimistic replace.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optimistic concurrency version, set on fetched resources only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// `uid`, `finalizers`, `ownerReferences`, `managedFields`, ...
    #[serde(flatten)]
    pub unmanaged: UnmanagedFields,
}

impl ObjectMeta {
    /// Create new metadata with standard meshroute labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let labels = BTreeMap::from([
            (LABEL_NAME.to_string(), name.clone()),
            (
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_MESHROUTE.to_string(),
            ),
        ]);
        Self {
            name,
            namespace: namespace.into(),
            labels,
            ..Default::default()
        }
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types with a known API group, version, kind and plural.
///
/// The `ApiResource` used for API calls and the `apiVersion` written into
/// bodies both derive from these constants, so they cannot drift apart.
pub trait HasApiResource {
    /// API group (e.g. "networking.istio.io")
    const GROUP: &'static str;
    /// API version within the group (e.g. "v1beta1")
    const VERSION: &'static str;
    /// Resource kind (e.g. "VirtualService")
    const KIND: &'static str;
    /// Lowercase plural used in request paths (e.g. "virtualservices")
    const PLURAL: &'static str;

    /// Full `apiVersion` as written in resource bodies
    fn api_version() -> String {
        format!("{}/{}", Self::GROUP, Self::VERSION)
    }

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(Self::GROUP, Self::VERSION, Self::KIND),
            Self::PLURAL,
        )
    }
}

// =============================================================================
// Client construction
// =============================================================================

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Without a path the config is inferred (in-cluster service account, then
/// the default kubeconfig).
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_meta_adds_standard_labels() {
        let meta = ObjectMeta::new("reviews-route", "bookinfo");
        assert_eq!(meta.namespace, "bookinfo");
        assert_eq!(
            meta.labels.get(LABEL_NAME).map(String::as_str),
            Some("reviews-route")
        );
        assert_eq!(
            meta.labels.get(LABEL_MANAGED_BY).map(String::as_str),
            Some(LABEL_MANAGED_BY_MESHROUTE)
        );
        assert!(meta.resource_version.is_none());
    }

    #[test]
    fn test_resource_version_is_omitted_until_fetched() {
        let json = serde_json::to_value(ObjectMeta::new("a", "b")).unwrap();
        assert!(json.get("resourceVersion").is_none());

        let fetched: ObjectMeta = serde_json::from_value(serde_json::json!({
            "name": "a",
            "namespace": "b",
            "resourceVersion": "42"
        }))
        .unwrap();
        assert_eq!(fetched.resource_version.as_deref(), Some("42"));
        assert!(fetched.labels.is_empty());
    }

    #[test]
    fn test_metadata_set_by_the_cluster_is_kept() {
        let fetched = serde_json::json!({
            "name": "reviews",
            "namespace": "bookinfo",
            "uid": "0b8c",
            "resourceVersion": "42",
            "finalizers": ["example.com/protect"],
            "ownerReferences": [{ "apiVersion": "v1", "kind": "ConfigMap", "name": "owner", "uid": "1" }]
        });
        let meta: ObjectMeta = serde_json::from_value(fetched.clone()).unwrap();
        assert_eq!(meta.unmanaged["uid"], "0b8c");
        assert_eq!(serde_json::to_value(&meta).unwrap(), fetched);
    }

    struct Sample;

    impl HasApiResource for Sample {
        const GROUP: &'static str = "networking.istio.io";
        const VERSION: &'static str = "v1beta1";
        const KIND: &'static str = "DestinationRule";
        const PLURAL: &'static str = "destinationrules";
    }

    #[test]
    fn test_api_resource_from_constants() {
        let ar = Sample::api_resource();
        assert_eq!(ar.group, "networking.istio.io");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.api_version, "networking.istio.io/v1beta1");
        assert_eq!(ar.kind, "DestinationRule");
        assert_eq!(ar.plural, "destinationrules");
        assert_eq!(Sample::api_version(), ar.api_version);
    }
}
