//! Remote resource store: get/create/update of the managed Istio resources
//!
//! The reconciler only sees the [`ResourceStore`] trait. [`KubeResourceStore`]
//! implements it against the Kubernetes API through `Api<DynamicObject>`, with
//! the typed resources converted via serde_json at the boundary.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use meshroute_common::istio::{DestinationRule, Gateway, VirtualService};
use meshroute_common::{Error, HasApiResource, Result};

/// Field manager recorded on objects written by meshroute
pub const FIELD_MANAGER: &str = "meshroute";

/// Trait abstracting the remote store for the three managed resource kinds
///
/// `get_*` returns `Ok(None)` when the resource does not exist. Writes fail
/// with a store error on transport, authorization or conflict failures; the
/// reconciler never retries them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a DestinationRule by name
    async fn get_destination_rule(&self, name: &str) -> Result<Option<DestinationRule>>;
    /// Create a DestinationRule
    async fn create_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule>;
    /// Replace an existing DestinationRule
    async fn update_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule>;

    /// Fetch a VirtualService by name
    async fn get_virtual_service(&self, name: &str) -> Result<Option<VirtualService>>;
    /// Create a VirtualService
    async fn create_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService>;
    /// Replace an existing VirtualService
    async fn update_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService>;

    /// Fetch a Gateway by name
    async fn get_gateway(&self, name: &str) -> Result<Option<Gateway>>;
    /// Create a Gateway
    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway>;
    /// Replace an existing Gateway
    async fn update_gateway(&self, gateway: &Gateway) -> Result<Gateway>;
}

/// Kubernetes-backed store scoped to one namespace
pub struct KubeResourceStore {
    client: Client,
    namespace: String,
}

impl KubeResourceStore {
    /// Create a store for resources in `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<R: HasApiResource>(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &R::api_resource())
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    async fn get<R>(&self, name: &str) -> Result<Option<R>>
    where
        R: HasApiResource + DeserializeOwned,
    {
        let found = self
            .api::<R>()
            .get_opt(name)
            .await
            .map_err(|e| Error::store_api(R::KIND, name, "get", e))?;
        trace!(kind = R::KIND, name = %name, found = found.is_some(), "fetched resource");
        found.map(from_dynamic::<R>).transpose()
    }

    async fn create<R>(&self, resource: &R, name: &str) -> Result<R>
    where
        R: HasApiResource + Serialize + DeserializeOwned + Sync,
    {
        let obj = to_dynamic(resource)?;
        let created = self
            .api::<R>()
            .create(&Self::post_params(), &obj)
            .await
            .map_err(|e| Error::store_api(R::KIND, name, "create", e))?;
        from_dynamic(created)
    }

    async fn update<R>(&self, resource: &R, name: &str) -> Result<R>
    where
        R: HasApiResource + Serialize + DeserializeOwned + Sync,
    {
        let obj = to_dynamic(resource)?;
        let updated = self
            .api::<R>()
            .replace(name, &Self::post_params(), &obj)
            .await
            .map_err(|e| Error::store_api(R::KIND, name, "update", e))?;
        from_dynamic(updated)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_destination_rule(&self, name: &str) -> Result<Option<DestinationRule>> {
        self.get(name).await
    }

    async fn create_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule> {
        self.create(rule, &rule.metadata.name).await
    }

    async fn update_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule> {
        self.update(rule, &rule.metadata.name).await
    }

    async fn get_virtual_service(&self, name: &str) -> Result<Option<VirtualService>> {
        self.get(name).await
    }

    async fn create_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService> {
        self.create(vs, &vs.metadata.name).await
    }

    async fn update_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService> {
        self.update(vs, &vs.metadata.name).await
    }

    async fn get_gateway(&self, name: &str) -> Result<Option<Gateway>> {
        self.get(name).await
    }

    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway> {
        self.create(gateway, &gateway.metadata.name).await
    }

    async fn update_gateway(&self, gateway: &Gateway) -> Result<Gateway> {
        self.update(gateway, &gateway.metadata.name).await
    }
}

/// Convert a typed resource into a DynamicObject for the API call
pub fn to_dynamic<R: HasApiResource + Serialize>(resource: &R) -> Result<DynamicObject> {
    let json = serde_json::to_value(resource)
        .map_err(|e| Error::serialization_for_kind(R::KIND, format!("serialize: {e}")))?;
    serde_json::from_value(json)
        .map_err(|e| Error::serialization_for_kind(R::KIND, format!("to dynamic object: {e}")))
}

/// Convert an API response back into the typed resource
pub fn from_dynamic<R: HasApiResource + DeserializeOwned>(obj: DynamicObject) -> Result<R> {
    let json = serde_json::to_value(&obj)
        .map_err(|e| Error::serialization_for_kind(R::KIND, format!("serialize: {e}")))?;
    serde_json::from_value(json)
        .map_err(|e| Error::serialization_for_kind(R::KIND, format!("decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{build_destination_rule, build_gateway, build_virtual_service};
    use crate::descriptor::PolicyDescriptor;
    use crate::naming::NamingPolicy;

    fn descriptor() -> PolicyDescriptor {
        PolicyDescriptor {
            version: "v1".to_string(),
            timeout_seconds: 10,
            number_of_retries: 3,
            circuit_breaker_errors: 5,
            enable_gateway: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_dynamic_object_keeps_type_and_metadata() {
        let naming = NamingPolicy::new("reviews", "bookinfo");
        let vs = build_virtual_service(&descriptor(), &naming);
        let obj = to_dynamic(&vs).unwrap();

        let types = obj.types.as_ref().unwrap();
        assert_eq!(types.api_version, "networking.istio.io/v1beta1");
        assert_eq!(types.kind, "VirtualService");
        assert_eq!(obj.metadata.name.as_deref(), Some("reviews-route"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("bookinfo"));
        assert_eq!(obj.data["spec"]["hosts"][0], "reviews");
    }

    #[test]
    fn test_dynamic_conversion_preserves_resources() {
        let naming = NamingPolicy::new("reviews", "bookinfo");
        let d = descriptor();

        let rule = build_destination_rule(&d, &naming);
        let back: DestinationRule = from_dynamic(to_dynamic(&rule).unwrap()).unwrap();
        assert_eq!(back, rule);

        let gw = build_gateway(&d, &naming);
        let back: Gateway = from_dynamic(to_dynamic(&gw).unwrap()).unwrap();
        assert_eq!(back, gw);
    }

    #[test]
    fn test_server_fields_are_tolerated() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "networking.istio.io/v1beta1",
            "kind": "Gateway",
            "metadata": {
                "name": "reviews",
                "namespace": "bookinfo",
                "uid": "0b8c",
                "resourceVersion": "1234",
                "generation": 3
            },
            "spec": {
                "selector": { "istio": "ingressgateway" },
                "servers": [{
                    "port": { "number": 80, "protocol": "HTTP", "name": "http" },
                    "hosts": ["reviews.ext"]
                }]
            },
            "status": {}
        }))
        .unwrap();

        let gw: Gateway = from_dynamic(obj).unwrap();
        assert_eq!(gw.metadata.resource_version.as_deref(), Some("1234"));
        assert_eq!(gw.spec.servers[0].hosts, vec!["reviews.ext"]);
    }

    #[test]
    fn test_unmodelled_fields_survive_the_api_boundary() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "networking.istio.io/v1beta1",
            "kind": "VirtualService",
            "metadata": {
                "name": "reviews-route",
                "namespace": "bookinfo",
                "uid": "0b8c",
                "finalizers": ["example.com/keep"]
            },
            "spec": {
                "hosts": ["reviews"],
                "http": [{
                    "retries": { "retryOn": "connect-failure" },
                    "route": [{ "destination": { "host": "reviews" } }]
                }],
                "tls": [{ "match": [{ "sniHosts": ["reviews.ext"] }] }]
            },
            "status": { "observedGeneration": 2 }
        }))
        .unwrap();

        let vs: VirtualService = from_dynamic(obj).unwrap();
        let back = to_dynamic(&vs).unwrap();
        assert_eq!(back.metadata.uid.as_deref(), Some("0b8c"));
        assert_eq!(back.metadata.finalizers, Some(vec!["example.com/keep".to_string()]));
        assert_eq!(back.data["spec"]["tls"][0]["match"][0]["sniHosts"][0], "reviews.ext");
        assert_eq!(back.data["status"]["observedGeneration"], 2);
        assert!(back.data["spec"]["http"][0]["retries"].get("attempts").is_none());
    }

    #[test]
    fn test_malformed_response_is_a_serialization_error() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "networking.istio.io/v1beta1",
            "kind": "Gateway",
            "metadata": { "name": "reviews" },
            "spec": { "servers": [{ "hosts": ["a"] }] }
        }))
        .unwrap();

        let err = from_dynamic::<Gateway>(obj).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
        assert_eq!(err.kind(), Some("Gateway"));
    }
}
