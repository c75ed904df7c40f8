//! Main controller implementation.
//!
//! Wires the Kubernetes and NetworkAPI clients into a [`Reconciler`] and runs
//! the Ingress watcher in a background task.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::store::KubeApiStore;
use crate::watcher::{ServiceIndex, watch_ingresses};
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use networkapi_client::NetworkApiClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Namespace-scoped or cluster-wide API handle
fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Running Ingress controller
pub struct Controller {
    ingress_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Connect to Kubernetes and NetworkAPI and start watching Ingresses.
    pub async fn new(config: Config, namespace: Option<String>) -> Result<Self, ControllerError> {
        info!("Initializing NetworkAPI Ingress Controller");

        let kube_client = Client::try_default().await?;

        let networkapi_client = NetworkApiClient::new(
            config.network_api_url.clone(),
            config.network_api_username.clone(),
            config.network_api_password.clone(),
        )?;

        let namespace = namespace.as_deref();
        let ingresses: Api<Ingress> = api(&kube_client, namespace);
        let services: Api<Service> = api(&kube_client, namespace);
        let endpoints: Api<Endpoints> = api(&kube_client, namespace);

        let reconciler = Arc::new(Reconciler::new(
            Box::new(networkapi_client),
            Box::new(KubeApiStore::new(kube_client)),
            config,
            Arc::new(ServiceIndex::new()),
        ));

        let ingress_watcher =
            tokio::spawn(async move { watch_ingresses(ingresses, services, endpoints, reconciler).await });

        Ok(Self { ingress_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("NetworkAPI Ingress Controller running");

        self.ingress_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Ingress watcher panicked: {}", e)))?
    }
}
