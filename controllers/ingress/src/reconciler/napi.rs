//! Converging NetworkAPI.
//!
//! Every object is looked up by its derived name first; a not-found answer
//! means create, anything else is compared with the desired state (after
//! merging server-assigned ids) and only updated when it differs.

use super::Reconciler;
use super::desired::{
    Scheme, VipSpec, fill_pool_update, fill_vip_update, new_equipment, new_pool, new_pool_member, new_real_ip,
    new_vip, pool_name, sort_members, sort_ports, target_name, vip_name,
};
use super::take_over_vip;
use super::targets::Target;
use crate::config::InstanceConfig;
use crate::error::ControllerError;
use crate::watcher::ObjectKey;
use k8s_openapi::api::networking::v1::Ingress;
use networkapi_client::{Equipment, Ip, NetworkApiError, Pool, Vip};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Turn a not-found answer into `None`
fn found<T>(result: Result<T, NetworkApiError>) -> Result<Option<T>, ControllerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn require_id(kind: &str, name: &str, id: Option<u64>) -> Result<u64, ControllerError> {
    id.ok_or_else(|| ControllerError::InconsistentState(format!("{} {} has no id", kind, name)))
}

fn has_tls(ingress: &Ingress) -> bool {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.tls.as_ref())
        .is_some_and(|tls| !tls.is_empty())
}

fn status_ip(ingress: &Ingress) -> Option<&str> {
    ingress
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|ingress| ingress.ip.as_deref())
}

impl Reconciler {
    pub(crate) async fn reconcile_networkapi(
        &self,
        key: &ObjectKey,
        ingress: &Ingress,
        instance: &InstanceConfig,
        targets: &[Target],
    ) -> Result<(), ControllerError> {
        let cluster = self.config().cluster_name.as_str();
        let tls = has_tls(ingress);

        let mut http_members = Vec::new();
        let mut https_members = Vec::new();
        for target in targets {
            let ip = self.ensure_real(target).await?;
            let ip_id = require_id("IP", &target.ip.to_string(), ip.id)?;
            let member = new_pool_member(ip_id, target);
            if tls && target.tls {
                https_members.push(member);
            } else {
                http_members.push(member);
            }
        }

        let mut wanted = Vec::new();
        if !tls || !http_members.is_empty() {
            wanted.push((Scheme::Http, http_members));
        }
        if tls {
            wanted.push((Scheme::Https, https_members));
        }

        let mut pools: Vec<(Scheme, Pool)> = Vec::new();
        for (scheme, members) in wanted {
            let mut pool = new_pool(&pool_name(cluster, &key.namespace, &key.name, scheme), scheme, instance);
            pool.server_pool_members = members;
            sort_members(&mut pool);
            pools.push((scheme, self.ensure_pool(pool).await?));
        }
        let pool_refs: Vec<(Scheme, &Pool)> = pools.iter().map(|(scheme, pool)| (*scheme, pool)).collect();

        let service = key.to_string();
        let address = match take_over_vip(ingress) {
            Some(external) => {
                let spec = VipSpec {
                    name: external,
                    service,
                    business: cluster,
                    ip_id: None,
                    instance,
                };
                self.take_over(&spec, &pool_refs).await?
            }
            None => {
                let name = vip_name(cluster, &key.namespace, &key.name);
                let spec = VipSpec {
                    name: &name,
                    service,
                    business: cluster,
                    ip_id: None,
                    instance,
                };
                self.ensure_vip(spec, &pool_refs).await?
            }
        };

        let address = address.to_string();
        if status_ip(ingress) == Some(address.as_str()) {
            debug!("Ingress {} status already points at {}", key, address);
        } else {
            info!("Setting Ingress {} address to {}", key, address);
            self.store.set_status_ip(ingress, &address).await?;
        }
        Ok(())
    }

    /// Equipment and IP record for a backend address
    async fn ensure_real(&self, target: &Target) -> Result<Ip, ControllerError> {
        let client = &self.networkapi_client;
        let name = target_name(&self.config().cluster_name, target.ip);

        let equipment: Equipment = match found(client.get_equipment(&name).await)? {
            Some(equipment) => equipment,
            None => {
                info!("Creating equipment {}", name);
                client
                    .create_equipment(&new_equipment(&name, &self.config().equipment))
                    .await?
            }
        };

        match found(client.get_ip_by_net_ip(target.ip, target.network_id).await)? {
            Some(ip) => Ok(ip),
            None => {
                info!("Creating IP {} in network {}", target.ip, target.network_id);
                Ok(client.create_ip(&new_real_ip(target, &name, equipment.id)).await?)
            }
        }
    }

    async fn ensure_pool(&self, mut desired: Pool) -> Result<Pool, ControllerError> {
        let client = &self.networkapi_client;
        let Some(mut existing) = found(client.get_pool(&desired.identifier).await)? else {
            info!("Creating pool {}", desired.identifier);
            return Ok(client.create_pool(&desired).await?);
        };

        sort_members(&mut existing);
        fill_pool_update(&mut desired, &existing);
        if desired == existing {
            debug!("Pool {} is up to date", desired.identifier);
            return Ok(existing);
        }

        info!("Updating pool {}", desired.identifier);
        Ok(client.update_pool(&desired).await?)
    }

    /// VIP owned by this controller; returns its address
    async fn ensure_vip(&self, mut spec: VipSpec<'_>, pools: &[(Scheme, &Pool)]) -> Result<Ipv4Addr, ControllerError> {
        let client = &self.networkapi_client;

        let vip_ip = match found(client.get_ip_by_name(spec.name).await)? {
            Some(ip) => ip,
            None => {
                info!("Allocating VIP address for {}", spec.name);
                client
                    .create_vip_ipv4(spec.name, spec.instance.vip_environment_id)
                    .await?
            }
        };
        spec.ip_id = Some(require_id("VIP address", spec.name, vip_ip.id)?);

        let mut desired = new_vip(&spec, pools);
        let vip = match found(client.get_vip(spec.name).await)? {
            None => {
                info!("Creating VIP {}", spec.name);
                client.create_vip(&desired).await?
            }
            Some(mut existing) => {
                sort_ports(&mut existing);
                fill_vip_update(&mut desired, &existing, false);
                self.update_vip_if_changed(desired, existing).await?
            }
        };
        self.deploy_if_needed(&vip).await?;

        Ok(vip_ip.to_ipv4())
    }

    /// Point an externally created VIP at the controller's pools; returns its address
    async fn take_over(&self, spec: &VipSpec<'_>, pools: &[(Scheme, &Pool)]) -> Result<Ipv4Addr, ControllerError> {
        let client = &self.networkapi_client;

        let mut existing = client.get_vip(spec.name).await?;
        sort_ports(&mut existing);
        let ipv4 = existing.ipv4.ok_or_else(|| {
            ControllerError::InconsistentState(format!("VIP {} to take over has no IPv4 address", spec.name))
        })?;

        let mut desired = new_vip(spec, pools);
        fill_vip_update(&mut desired, &existing, true);
        let vip = self.update_vip_if_changed(desired, existing).await?;
        self.deploy_if_needed(&vip).await?;

        Ok(client.get_ip_by_id(ipv4.0).await?.to_ipv4())
    }

    async fn update_vip_if_changed(&self, desired: Vip, existing: Vip) -> Result<Vip, ControllerError> {
        if desired == existing {
            debug!("VIP {} is up to date", desired.name);
            return Ok(existing);
        }
        info!("Updating VIP {}", desired.name);
        Ok(self.networkapi_client.update_vip(&desired).await?)
    }

    async fn deploy_if_needed(&self, vip: &Vip) -> Result<(), ControllerError> {
        if vip.created {
            return Ok(());
        }
        let id = require_id("VIP", &vip.name, vip.id)?;
        info!("Deploying VIP {} (ID: {})", vip.name, id);
        self.networkapi_client.deploy_vip(id).await?;
        Ok(())
    }
}
