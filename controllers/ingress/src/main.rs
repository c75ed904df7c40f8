//! NetworkAPI Ingress Controller
//!
//! Programs GloboNetworkAPI for Kubernetes Ingresses of its class:
//! - one VIP per Ingress, or an existing VIP taken over by annotation
//! - one server pool per listener (http, https) holding the backend addresses
//! - the VIP address published on the Ingress status
//!
//! NetworkAPI objects are removed again when the Ingress is deleted.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;

use anyhow::Result;
use config::Config;
use controller::Controller;
use std::env;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting NetworkAPI Ingress Controller");

    // kube and reqwest both use rustls; pick the provider once for the process
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    let config = Config::load()?;
    let namespace = env::var("WATCH_NAMESPACE").ok().filter(|ns| !ns.is_empty());

    info!("Configuration:");
    info!("  Cluster: {}", config.cluster_name);
    info!("  Ingress class: {}", config.ingress_class_name);
    info!("  NetworkAPI URL: {}", config.network_api_url);
    info!("  Pod network: {}, LB network: {}", config.pod_network_id, config.lb_network_id);
    info!("  Reconcile interval: {:?}", config.reconcile_interval());
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));

    let controller = Controller::new(config, namespace).await?;
    controller.run().await?;

    Ok(())
}
