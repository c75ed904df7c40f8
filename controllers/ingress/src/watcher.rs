//! Kubernetes watches.
//!
//! Ingresses are reconciled by a `kube_runtime::Controller`. Services and
//! Endpoints are watched too: a change to one of them re-queues every
//! Ingress the [`ServiceIndex`] says depends on it.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::reconciler::validation::has_class;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Resource};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, controller::{Action, Config as ControllerConfig}, watcher};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};

/// Namespaced name of a Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self::new(obj.meta().namespace.clone().unwrap_or_default(), obj.meta().name.clone().unwrap_or_default())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Default)]
struct IndexMaps {
    service_by_ingress: HashMap<ObjectKey, ObjectKey>,
    ingresses_by_service: HashMap<ObjectKey, HashSet<ObjectKey>>,
}

/// Which Service each Ingress currently routes to.
///
/// Written by reconciliations, read by the Service/Endpoints watch mappers.
#[derive(Debug, Default)]
pub struct ServiceIndex {
    maps: RwLock<IndexMaps>,
}

impl ServiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `ingress` depends on `service`, replacing any earlier service.
    pub fn set(&self, ingress: ObjectKey, service: ObjectKey) {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = maps.service_by_ingress.insert(ingress.clone(), service.clone()) {
            if previous == service {
                return;
            }
            Self::unlink(&mut maps, &previous, &ingress);
        }
        maps.ingresses_by_service.entry(service).or_default().insert(ingress);
    }

    pub fn remove(&self, ingress: &ObjectKey) {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(service) = maps.service_by_ingress.remove(ingress) {
            Self::unlink(&mut maps, &service, ingress);
        }
    }

    /// Ingresses depending on `service`, sorted
    pub fn ingresses_for(&self, service: &ObjectKey) -> Vec<ObjectKey> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        let mut ingresses: Vec<ObjectKey> = maps
            .ingresses_by_service
            .get(service)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ingresses.sort();
        ingresses
    }

    pub fn service_for(&self, ingress: &ObjectKey) -> Option<ObjectKey> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.service_by_ingress.get(ingress).cloned()
    }

    fn unlink(maps: &mut IndexMaps, service: &ObjectKey, ingress: &ObjectKey) {
        if let Some(set) = maps.ingresses_by_service.get_mut(service) {
            set.remove(ingress);
            if set.is_empty() {
                maps.ingresses_by_service.remove(service);
            }
        }
    }
}

fn requests_for(index: &ServiceIndex, service: ObjectKey) -> Vec<ObjectRef<Ingress>> {
    index
        .ingresses_for(&service)
        .into_iter()
        .map(|ingress| ObjectRef::new(&ingress.name).within(&ingress.namespace))
        .collect()
}

/// Run the Ingress controller until a termination signal is received.
pub async fn watch_ingresses(
    ingresses: Api<Ingress>,
    services: Api<Service>,
    endpoints: Api<Endpoints>,
    reconciler: Arc<Reconciler>,
) -> Result<(), ControllerError> {
    info!("Starting Ingress watcher");

    let service_index = reconciler.index();
    let endpoints_index = reconciler.index();

    let reconcile = |ingress: Arc<Ingress>, ctx: Arc<Reconciler>| async move {
        let key = ObjectKey::of(ingress.as_ref());
        if !has_class(&ingress, &ctx.config().ingress_class_name) {
            debug!("Ignoring Ingress {} of another class", key);
            return Ok(Action::await_change());
        }

        let result = ctx.reconcile(&key).await;
        match &result {
            Ok(_) => ctx.reset_backoff(&key),
            Err(e) => error!("Reconciliation failed for Ingress {}: {}", key, e),
        }

        if ctx.config().debug_crash_after_reconcile {
            error!("debugCrashAfterReconcile is set, exiting after reconciling {}", key);
            std::process::exit(1);
        }
        result
    };

    let error_policy = |ingress: Arc<Ingress>, _error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = ObjectKey::of(ingress.as_ref());
        let delay = ctx.next_backoff(&key);
        debug!("Retrying Ingress {} in {:?}", key, delay);
        Action::requeue(delay)
    };

    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(4);

    Controller::new(ingresses, watcher::Config::default())
        .with_config(controller_config)
        .watches(services, watcher::Config::default(), move |service: Service| {
            requests_for(&service_index, ObjectKey::of(&service))
        })
        .watches(endpoints, watcher::Config::default(), move |endpoints: Endpoints| {
            requests_for(&endpoints_index, ObjectKey::of(&endpoints))
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled Ingress {}", obj),
                Err(e) => debug!("Ingress controller error: {}", e),
            }
        })
        .await;

    info!("Ingress watcher stopped");
    Ok(())
}
