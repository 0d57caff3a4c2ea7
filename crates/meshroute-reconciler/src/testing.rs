//! In-memory [`ResourceStore`] for reconciler tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use meshroute_common::istio::{DestinationRule, Gateway, VirtualService};
use meshroute_common::{Error, HasApiResource, ObjectMeta, Result};

use crate::store::ResourceStore;

/// Behaves like the API server for get/create/replace: create fails on an
/// existing name, replace fails on a missing one, and every write bumps
/// `resourceVersion`.
#[derive(Default)]
pub struct InMemoryStore {
    destination_rules: Mutex<BTreeMap<String, DestinationRule>>,
    virtual_services: Mutex<BTreeMap<String, VirtualService>>,
    gateways: Mutex<BTreeMap<String, Gateway>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn destination_rule(&self, name: &str) -> Option<DestinationRule> {
        self.destination_rules.lock().unwrap().get(name).cloned()
    }

    pub fn virtual_service(&self, name: &str) -> Option<VirtualService> {
        self.virtual_services.lock().unwrap().get(name).cloned()
    }

    pub fn gateway(&self, name: &str) -> Option<Gateway> {
        self.gateways.lock().unwrap().get(name).cloned()
    }

    /// Number of successful creates and replaces
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn put<R: HasApiResource + Clone>(
        &self,
        map: &Mutex<BTreeMap<String, R>>,
        resource: &R,
        metadata: impl Fn(&mut R) -> &mut ObjectMeta,
        replace: bool,
    ) -> Result<R> {
        let mut map = map.lock().unwrap();
        let mut stored = resource.clone();
        let meta = metadata(&mut stored);
        let name = meta.name.clone();
        match (replace, map.contains_key(&name)) {
            (false, true) => {
                return Err(Error::store_api(R::KIND, &name, "create", api_error(409, "AlreadyExists")))
            }
            (true, false) => {
                return Err(Error::store_api(R::KIND, &name, "update", api_error(404, "NotFound")))
            }
            _ => {}
        }
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        meta.resource_version = Some(n.to_string());
        map.insert(name, stored.clone());
        Ok(stored)
    }
}

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_lowercase(),
        reason: reason.to_string(),
        code,
    })
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_destination_rule(&self, name: &str) -> Result<Option<DestinationRule>> {
        Ok(self.destination_rule(name))
    }

    async fn create_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule> {
        self.put(&self.destination_rules, rule, |r| &mut r.metadata, false)
    }

    async fn update_destination_rule(&self, rule: &DestinationRule) -> Result<DestinationRule> {
        self.put(&self.destination_rules, rule, |r| &mut r.metadata, true)
    }

    async fn get_virtual_service(&self, name: &str) -> Result<Option<VirtualService>> {
        Ok(self.virtual_service(name))
    }

    async fn create_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService> {
        self.put(&self.virtual_services, vs, |r| &mut r.metadata, false)
    }

    async fn update_virtual_service(&self, vs: &VirtualService) -> Result<VirtualService> {
        self.put(&self.virtual_services, vs, |r| &mut r.metadata, true)
    }

    async fn get_gateway(&self, name: &str) -> Result<Option<Gateway>> {
        Ok(self.gateway(name))
    }

    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway> {
        self.put(&self.gateways, gateway, |r| &mut r.metadata, false)
    }

    async fn update_gateway(&self, gateway: &Gateway) -> Result<Gateway> {
        self.put(&self.gateways, gateway, |r| &mut r.metadata, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::build_gateway;
    use crate::descriptor::PolicyDescriptor;
    use crate::naming::NamingPolicy;

    #[tokio::test]
    async fn test_create_and_replace_follow_api_semantics() {
        let store = InMemoryStore::default();
        let gw = build_gateway(&PolicyDescriptor::default(), &NamingPolicy::new("a", "ns"));

        let missing = store.update_gateway(&gw).await.unwrap_err();
        assert!(!missing.is_retryable());
        let created = store.create_gateway(&gw).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        let conflict = store.create_gateway(&gw).await.unwrap_err();
        assert!(conflict.to_string().contains("create failed"));

        let updated = store.update_gateway(&created).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(store.writes(), 2);
    }
}
