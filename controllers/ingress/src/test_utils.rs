//! Test utilities for unit testing the reconciler
//!
//! Builders for Kubernetes objects and an in-memory [`KubeStore`] that
//! records what the reconciler writes.

use crate::config::{Config, EquipmentConfig, InstanceConfig, INGRESS_CLASS_ANNOTATION};
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::{EventKind, KubeStore};
use crate::watcher::{ObjectKey, ServiceIndex};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use networkapi_client::MockNetworkApiClient;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const TEST_NAMESPACE: &str = "default";

/// Event recorded by [`FakeKubeStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: ObjectKey,
    pub kind: EventKind,
    pub reason: String,
    pub note: String,
}

/// In-memory [`KubeStore`]
#[derive(Clone, Default)]
pub struct FakeKubeStore {
    ingresses: Arc<Mutex<HashMap<ObjectKey, Ingress>>>,
    services: Arc<Mutex<HashMap<ObjectKey, Service>>>,
    endpoints: Arc<Mutex<HashMap<ObjectKey, Endpoints>>>,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeKubeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ingress(&self, ingress: Ingress) -> ObjectKey {
        let key = ObjectKey::of(&ingress);
        lock(&self.ingresses).insert(key.clone(), ingress);
        key
    }

    pub fn add_service(&self, service: Service) {
        lock(&self.services).insert(ObjectKey::of(&service), service);
    }

    pub fn add_endpoints(&self, endpoints: Endpoints) {
        lock(&self.endpoints).insert(ObjectKey::of(&endpoints), endpoints);
    }

    pub fn remove_ingress(&self, key: &ObjectKey) {
        lock(&self.ingresses).remove(key);
    }

    /// Current copy of a stored Ingress
    pub fn ingress(&self, key: &ObjectKey) -> Option<Ingress> {
        lock(&self.ingresses).get(key).cloned()
    }

    /// Address published on the Ingress status, if any
    pub fn status_ip(&self, key: &ObjectKey) -> Option<String> {
        self.ingress(key)
            .and_then(|ingress| ingress.status)
            .and_then(|status| status.load_balancer)
            .and_then(|lb| lb.ingress)
            .and_then(|ingress| ingress.into_iter().next())
            .and_then(|ingress| ingress.ip)
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }

    pub fn event_reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.reason).collect()
    }
}

#[async_trait]
impl KubeStore for FakeKubeStore {
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError> {
        Ok(self.ingress(&ObjectKey::new(namespace, name)))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ControllerError> {
        Ok(lock(&self.services).get(&ObjectKey::new(namespace, name)).cloned())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ControllerError> {
        Ok(lock(&self.endpoints).get(&ObjectKey::new(namespace, name)).cloned())
    }

    async fn set_finalizers(&self, ingress: &Ingress, finalizers: Vec<String>) -> Result<(), ControllerError> {
        if let Some(stored) = lock(&self.ingresses).get_mut(&ObjectKey::of(ingress)) {
            stored.metadata.finalizers = Some(finalizers);
        }
        Ok(())
    }

    async fn set_status_ip(&self, ingress: &Ingress, ip: &str) -> Result<(), ControllerError> {
        if let Some(stored) = lock(&self.ingresses).get_mut(&ObjectKey::of(ingress)) {
            stored.status = Some(
                serde_json::from_value(json!({"loadBalancer": {"ingress": [{"ip": ip}]}}))
                    .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?,
            );
        }
        Ok(())
    }

    async fn publish_event(&self, ingress: &Ingress, kind: EventKind, reason: &str, note: String) {
        lock(&self.events).push(RecordedEvent {
            object: ObjectKey::of(ingress),
            kind,
            reason: reason.to_string(),
            note,
        });
    }
}

/// Valid configuration: empty cluster name, pod network 10, LB network 11,
/// instance ids 1 to 9 and equipment ids 20 to 23.
pub fn create_test_config() -> Config {
    Config {
        cluster_name: String::new(),
        ingress_class_name: "globo-networkapi".to_string(),
        pod_network_id: 10,
        lb_network_id: 11,
        network_api_url: "http://networkapi.test".to_string(),
        network_api_username: "user".to_string(),
        network_api_password: "secret".to_string(),
        reconcile_interval_seconds: 300,
        debug_crash_after_reconcile: false,
        equipment: EquipmentConfig {
            equipment_type: 20,
            model: 21,
            group: 22,
            environment: 23,
        },
        instance: InstanceConfig {
            vip_environment_id: 1,
            pool_environment_id: 2,
            l4_protocol_id: 3,
            l7_protocol_id: 4,
            l7_rule_id: 5,
            cache_group_id: 6,
            persistence_id: 7,
            timeout_id: 8,
            traffic_return_id: 9,
        },
    }
}

fn test_metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(TEST_NAMESPACE.to_string()),
        ..Default::default()
    }
}

/// Ingress in the default namespace. The test ingress class is set unless
/// the spec or an annotation already names one.
pub fn create_test_ingress(name: &str, spec: Value) -> Ingress {
    let mut ingress = Ingress {
        metadata: test_metadata(name),
        spec: Some(serde_json::from_value(spec).unwrap()),
        status: None,
    };
    let has_class = ingress
        .spec
        .as_ref()
        .is_some_and(|spec| spec.ingress_class_name.is_some());
    if !has_class && !ingress.annotations().contains_key(INGRESS_CLASS_ANNOTATION) {
        if let Some(spec) = ingress.spec.as_mut() {
            spec.ingress_class_name = Some("globo-networkapi".to_string());
        }
    }
    ingress
}

/// Ingress routing everything to `service` through its default backend
pub fn create_default_backend_ingress(name: &str, service: &str, port: u16) -> Ingress {
    create_test_ingress(
        name,
        json!({"defaultBackend": {"service": {"name": service, "port": {"number": port}}}}),
    )
}

pub fn create_test_service(name: &str, service_type: &str, ports: Value) -> Service {
    Service {
        metadata: test_metadata(name),
        spec: Some(serde_json::from_value(json!({"type": service_type, "ports": ports})).unwrap()),
        status: None,
    }
}

/// LoadBalancer Service with one port and, when given, an assigned address
pub fn create_lb_service(name: &str, port: u16, lb_ip: Option<&str>) -> Service {
    let mut service = create_test_service(name, "LoadBalancer", json!([{"name": "http", "port": port}]));
    if let Some(ip) = lb_ip {
        service.status = Some(serde_json::from_value(json!({"loadBalancer": {"ingress": [{"ip": ip}]}})).unwrap());
    }
    service
}

pub fn create_test_endpoints(name: &str, subsets: Value) -> Endpoints {
    Endpoints {
        metadata: test_metadata(name),
        subsets: Some(serde_json::from_value(subsets).unwrap()),
    }
}

/// Reconciler wired to the given fakes
pub fn create_test_reconciler(client: &MockNetworkApiClient, store: &FakeKubeStore) -> Reconciler {
    create_test_reconciler_with_config(client, store, create_test_config())
}

pub fn create_test_reconciler_with_config(
    client: &MockNetworkApiClient,
    store: &FakeKubeStore,
    config: Config,
) -> Reconciler {
    Reconciler::new(
        Box::new(client.clone()),
        Box::new(store.clone()),
        config,
        Arc::new(ServiceIndex::new()),
    )
}
