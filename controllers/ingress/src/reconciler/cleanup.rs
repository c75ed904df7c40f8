//! NetworkAPI teardown for a deleted Ingress.

use super::Reconciler;
use super::desired::{Scheme, pool_name, vip_name};
use crate::error::ControllerError;
use crate::watcher::ObjectKey;
use networkapi_client::NetworkApiError;
use tracing::{info, warn};

/// Succeed on not-found, so a half-finished cleanup can be resumed
fn tolerate_missing(what: &str, result: Result<(), NetworkApiError>) -> Result<(), ControllerError> {
    match result {
        Err(e) if e.is_not_found() => {
            warn!("{} already gone", what);
            Ok(())
        }
        other => Ok(other?),
    }
}

impl Reconciler {
    /// Delete the VIP, its address and the pools derived from `key`.
    ///
    /// A taken-over VIP belongs to someone else and is left untouched,
    /// together with the pools it points at.
    pub(crate) async fn cleanup(&self, key: &ObjectKey, take_over: bool) -> Result<(), ControllerError> {
        if take_over {
            info!("Ingress {} took over an existing VIP, leaving NetworkAPI untouched", key);
            return Ok(());
        }

        let client = &self.networkapi_client;
        let cluster = self.config().cluster_name.as_str();
        let name = vip_name(cluster, &key.namespace, &key.name);

        match client.get_vip(&name).await {
            Ok(vip) => {
                info!("Deleting VIP {}", name);
                tolerate_missing(&format!("VIP {}", name), client.delete_vip(&vip).await)?;
            }
            Err(e) if e.is_not_found() => warn!("VIP {} already gone", name),
            Err(e) => return Err(e.into()),
        }

        match client.get_ip_by_name(&name).await {
            Ok(ip) => {
                if let Some(id) = ip.id {
                    info!("Deleting VIP address {} (ID: {})", ip.to_ipv4(), id);
                    tolerate_missing(&format!("IP {}", id), client.delete_ip(id).await)?;
                }
            }
            Err(e) if e.is_not_found() => warn!("VIP address for {} already gone", name),
            Err(e) => return Err(e.into()),
        }

        for scheme in Scheme::ALL {
            let identifier = pool_name(cluster, &key.namespace, &key.name, scheme);
            match client.get_pool(&identifier).await {
                Ok(pool) => {
                    info!("Deleting pool {}", identifier);
                    tolerate_missing(&format!("pool {}", identifier), client.delete_pool(&pool).await)?;
                }
                Err(e) if e.is_not_found() => warn!("Pool {} already gone", identifier),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
