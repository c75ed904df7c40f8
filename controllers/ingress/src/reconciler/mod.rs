//! Ingress reconciliation.
//!
//! One pass per Ingress key:
//! - missing Ingress: best-effort cleanup by derived names, no requeue
//! - deletion requested: cleanup, then drop the finalizer
//! - otherwise: make sure the finalizer is set, then converge NetworkAPI
//!
//! Submodules:
//! - `validation`: accepted Ingress shapes
//! - `targets`: Service/Endpoints to backend addresses
//! - `desired`: pure builders for NetworkAPI objects
//! - `napi`: create/update against NetworkAPI, take-over
//! - `cleanup`: NetworkAPI teardown

pub mod cleanup;
pub mod desired;
pub mod napi;
pub mod targets;
pub mod validation;
#[cfg(test)]
mod reconcile_test;

use crate::backoff::FibonacciBackoff;
use crate::config::{Config, FINALIZER, TAKE_OVER_ANNOTATION};
use crate::error::ControllerError;
use crate::store::{EventKind, KubeStore};
use crate::watcher::{ObjectKey, ServiceIndex};
use k8s_openapi::api::networking::v1::Ingress;
use kube_runtime::controller::Action;
use networkapi_client::NetworkApiClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use targets::{backend_service_name, is_load_balancer, matching_ports, resolve_targets};
use tracing::{debug, info, warn};
use validation::validate_ingress;

/// Name of the VIP an Ingress adopts, when it carries the take-over annotation
pub fn take_over_vip(ingress: &Ingress) -> Option<&str> {
    ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(TAKE_OVER_ANNOTATION))
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
}

fn has_finalizer(ingress: &Ingress) -> bool {
    ingress
        .metadata
        .finalizers
        .iter()
        .flatten()
        .any(|finalizer| finalizer == FINALIZER)
}

/// Reconciles Ingresses into NetworkAPI VIPs and pools.
pub struct Reconciler {
    pub(crate) networkapi_client: Box<dyn NetworkApiClientTrait + Send + Sync>,
    pub(crate) store: Box<dyn KubeStore>,
    config: Config,
    index: Arc<ServiceIndex>,
    /// Retry schedule per Ingress (namespace/name -> backoff)
    backoff_states: Arc<Mutex<HashMap<ObjectKey, FibonacciBackoff>>>,
}

impl Reconciler {
    pub fn new(
        networkapi_client: Box<dyn NetworkApiClientTrait + Send + Sync>,
        store: Box<dyn KubeStore>,
        config: Config,
        index: Arc<ServiceIndex>,
    ) -> Self {
        Self {
            networkapi_client,
            store,
            config,
            index,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> Arc<ServiceIndex> {
        self.index.clone()
    }

    /// Delay before retrying a failed Ingress; grows with consecutive failures.
    pub fn next_backoff(&self, key: &ObjectKey) -> Duration {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.entry(key.clone()).or_default().next_delay()
    }

    pub fn reset_backoff(&self, key: &ObjectKey) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backoff) = states.get_mut(key) {
            backoff.reset();
        }
    }

    /// Run one reconciliation pass for the Ingress `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ControllerError> {
        let Some(ingress) = self.store.get_ingress(&key.namespace, &key.name).await? else {
            warn!("Ingress {} not found, cleaning up NetworkAPI objects by name", key);
            if let Err(e) = self.cleanup(key, false).await {
                warn!("Cleanup of missing Ingress {} failed: {}", key, e);
            }
            self.index.remove(key);
            self.forget_backoff(key);
            return Ok(Action::await_change());
        };

        if ingress.metadata.deletion_timestamp.is_some() {
            return self.finalize(key, &ingress).await;
        }

        info!("Reconciling Ingress {}", key);
        let ingress = self.ensure_finalizer(ingress).await?;

        self.store
            .publish_event(&ingress, EventKind::Normal, "Reconciling", "reconciling".to_string())
            .await;

        match self.reconcile_active(key, &ingress).await {
            Ok(()) => {
                self.store
                    .publish_event(&ingress, EventKind::Normal, "Reconciled", "reconciled".to_string())
                    .await;
                info!("Reconciled Ingress {}", key);
                Ok(Action::requeue(self.config.reconcile_interval()))
            }
            Err(e) => {
                self.store
                    .publish_event(&ingress, EventKind::Warning, "ReconcileFailed", format!("failed to reconcile: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    fn forget_backoff(&self, key: &ObjectKey) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }

    /// Persist the finalizer before anything is created in NetworkAPI.
    async fn ensure_finalizer(&self, mut ingress: Ingress) -> Result<Ingress, ControllerError> {
        if has_finalizer(&ingress) {
            return Ok(ingress);
        }

        let mut finalizers = ingress.metadata.finalizers.clone().unwrap_or_default();
        finalizers.push(FINALIZER.to_string());
        self.store.set_finalizers(&ingress, finalizers.clone()).await?;
        debug!("Added finalizer to Ingress {}", ObjectKey::of(&ingress));

        ingress.metadata.finalizers = Some(finalizers);
        Ok(ingress)
    }

    async fn finalize(&self, key: &ObjectKey, ingress: &Ingress) -> Result<Action, ControllerError> {
        if has_finalizer(ingress) {
            info!("Ingress {} is being deleted, cleaning up", key);
            if let Err(e) = self.cleanup(key, take_over_vip(ingress).is_some()).await {
                self.store
                    .publish_event(ingress, EventKind::Warning, "CleanupFailed", format!("failed to clean up: {}", e))
                    .await;
                return Err(e);
            }

            let finalizers: Vec<String> = ingress
                .metadata
                .finalizers
                .iter()
                .flatten()
                .filter(|finalizer| *finalizer != FINALIZER)
                .cloned()
                .collect();
            self.store.set_finalizers(ingress, finalizers).await?;
            info!("Removed finalizer from Ingress {}", key);
        }

        self.index.remove(key);
        self.forget_backoff(key);
        Ok(Action::await_change())
    }

    async fn reconcile_active(&self, key: &ObjectKey, ingress: &Ingress) -> Result<(), ControllerError> {
        validate_ingress(ingress, &self.config.ingress_class_name)?;

        let instance = match ingress.metadata.annotations.as_ref() {
            Some(annotations) => self.config.instance.with_overrides(annotations)?,
            None => self.config.instance.clone(),
        };

        let service_key = ObjectKey::new(key.namespace.clone(), backend_service_name(ingress)?);
        let service = self
            .store
            .get_service(&service_key.namespace, &service_key.name)
            .await?
            .ok_or_else(|| ControllerError::InvalidBackend(format!("backend service {} not found", service_key)))?;
        let ports = matching_ports(ingress, &service)?;

        self.index.set(key.clone(), service_key.clone());

        let endpoints = if is_load_balancer(&service) {
            None
        } else {
            self.store.get_endpoints(&service_key.namespace, &service_key.name).await?
        };
        let targets = resolve_targets(&self.config, &service, &ports, endpoints.as_ref())?;
        debug!("Ingress {} resolved {} targets", key, targets.len());

        self.reconcile_networkapi(key, ingress, &instance, &targets).await
    }
}
