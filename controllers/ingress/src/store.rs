//! Kubernetes access for the reconciler.
//!
//! The reconciler only reads and writes Kubernetes through [`KubeStore`], so
//! unit tests can swap the API server for an in-memory fake.

use crate::config::CONTROLLER_NAME;
use crate::error::ControllerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};
use serde_json::json;
use tracing::warn;

/// Kind of a Kubernetes event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

#[async_trait]
pub trait KubeStore: Send + Sync {
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ControllerError>;
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ControllerError>;

    /// Replace the finalizer list of the Ingress.
    async fn set_finalizers(&self, ingress: &Ingress, finalizers: Vec<String>) -> Result<(), ControllerError>;

    /// Publish `ip` as the Ingress load balancer address.
    async fn set_status_ip(&self, ingress: &Ingress, ip: &str) -> Result<(), ControllerError>;

    /// Attach an event to the Ingress. Failures are logged, never returned.
    async fn publish_event(&self, ingress: &Ingress, kind: EventKind, reason: &str, note: String);
}

fn object_name(ingress: &Ingress) -> Result<&str, ControllerError> {
    ingress
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidConfig("Ingress has no name".to_string()))
}

/// [`KubeStore`] backed by the API server
pub struct KubeApiStore {
    client: Client,
    reporter: Reporter,
}

impl KubeApiStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }

    fn ingresses(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KubeStore for KubeApiStore {
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError> {
        Ok(self.ingresses(namespace).get_opt(name).await?)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ControllerError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>, ControllerError> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn set_finalizers(&self, ingress: &Ingress, finalizers: Vec<String>) -> Result<(), ControllerError> {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or("default");
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.ingresses(namespace)
            .patch(object_name(ingress)?, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_status_ip(&self, ingress: &Ingress, ip: &str) -> Result<(), ControllerError> {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or("default");
        let patch = json!({ "status": { "loadBalancer": { "ingress": [{ "ip": ip }] } } });
        self.ingresses(namespace)
            .patch_status(object_name(ingress)?, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn publish_event(&self, ingress: &Ingress, kind: EventKind, reason: &str, note: String) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let type_ = match kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        let event = KubeEvent {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(&event, &ingress.object_ref(&())).await {
            warn!(%e, "failed to publish event");
        }
    }
}
