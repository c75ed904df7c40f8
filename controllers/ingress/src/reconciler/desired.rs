//! Desired NetworkAPI state.
//!
//! Pure builders for the equipment, pools and VIP an Ingress maps to, plus
//! the merge helpers that carry NetworkAPI-assigned ids from the current
//! objects into the desired ones before they are compared.

use crate::config::{CONTROLLER_NAME, EquipmentConfig, InstanceConfig};
use crate::reconciler::targets::{HTTPS_PORT, Target};
use networkapi_client::{
    Equipment, EquipmentEnvironment, HealthCheck, IdOnly, IdRef, Ip, Pool, PoolMember, PoolMemberIp,
    ServiceDownAction, Vip, VipOptions, VipPool, VipPort, VipPortOptions,
};
use std::fmt;
use std::net::Ipv4Addr;

const HTTP_PORT: u16 = 80;
const MEMBER_STATUS_ENABLED: u32 = 7;

/// Listener a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Http, Scheme::Https];

    pub fn port(self) -> u16 {
        match self {
            Scheme::Http => HTTP_PORT,
            Scheme::Https => HTTPS_PORT,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// VIP name, also the description of the VIP address.
pub fn vip_name(cluster: &str, namespace: &str, name: &str) -> String {
    format!("{}_{}_{}_{}", CONTROLLER_NAME, cluster, namespace, name)
}

pub fn pool_name(cluster: &str, namespace: &str, name: &str, scheme: Scheme) -> String {
    format!("{}_{}", vip_name(cluster, namespace, name), scheme)
}

/// Equipment name, also the description of the real address.
pub fn target_name(cluster: &str, ip: Ipv4Addr) -> String {
    format!("{}_{}_{}", CONTROLLER_NAME, cluster, ip)
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn new_equipment(name: &str, equipment: &EquipmentConfig) -> Equipment {
    Equipment {
        id: None,
        name: name.to_string(),
        equipment_type: IdRef(equipment.equipment_type),
        model: IdRef(equipment.model),
        environments: vec![EquipmentEnvironment {
            environment: IdRef(equipment.environment),
            is_router: false,
            is_controller: false,
        }],
        groups: vec![IdOnly { id: equipment.group }],
    }
}

/// Real address record for a target, attached to its equipment
pub fn new_real_ip(target: &Target, description: &str, equipment_id: Option<u64>) -> Ip {
    Ip {
        networkipv4: IdRef(target.network_id),
        description: description.to_string(),
        equipments: equipment_id.map(|id| IdOnly { id }).into_iter().collect(),
        ..Ip::from_ipv4(target.ip)
    }
}

pub fn new_pool(identifier: &str, scheme: Scheme, instance: &InstanceConfig) -> Pool {
    Pool {
        id: None,
        identifier: identifier.to_string(),
        default_port: scheme.port(),
        environment: IdRef(instance.pool_environment_id),
        servicedownaction: ServiceDownAction {
            name: "none".to_string(),
        },
        lb_method: "round-robin".to_string(),
        healthcheck: HealthCheck {
            identifier: String::new(),
            healthcheck_type: "TCP".to_string(),
            healthcheck_request: String::new(),
            healthcheck_expect: String::new(),
            destination: "*:*".to_string(),
        },
        default_limit: 0,
        server_pool_members: Vec::new(),
        pool_created: false,
    }
}

pub fn new_pool_member(ip_id: u64, target: &Target) -> PoolMember {
    PoolMember {
        id: None,
        identifier: target.ip.to_string(),
        ip: Some(PoolMemberIp {
            id: ip_id,
            ip_formated: target.ip.to_string(),
        }),
        ipv6: None,
        priority: 0,
        weight: 0,
        limit: 0,
        port_real: target.port,
        member_status: MEMBER_STATUS_ENABLED,
    }
}

/// Order members by (address, port) so pools compare stably.
pub fn sort_members(pool: &mut Pool) {
    pool.server_pool_members.sort_by_key(|member| {
        let addr = member
            .ip
            .as_ref()
            .and_then(|ip| ip.ip_formated.parse::<Ipv4Addr>().ok());
        (addr, member.port_real)
    });
}

/// Order VIP ports by number and each port's pools by (order, pool id).
pub fn sort_ports(vip: &mut Vip) {
    vip.ports.sort_by_key(|port| port.port);
    for port in &mut vip.ports {
        port.pools.sort_by_key(|pool| (pool.order, pool.server_pool.0));
    }
}

/// Everything a VIP is built from besides the pools
#[derive(Debug, Clone)]
pub struct VipSpec<'a> {
    pub name: &'a str,
    pub service: String,
    pub business: &'a str,
    pub ip_id: Option<u64>,
    pub instance: &'a InstanceConfig,
}

/// Build the VIP with one port per existing pool: 80 for http, 443 for https.
pub fn new_vip(spec: &VipSpec<'_>, pools: &[(Scheme, &Pool)]) -> Vip {
    let instance = spec.instance;
    let ports = pools
        .iter()
        .filter_map(|(scheme, pool)| {
            let pool_id = pool.id?;
            Some(VipPort {
                id: None,
                port: scheme.port(),
                options: VipPortOptions {
                    l4_protocol: IdRef(instance.l4_protocol_id),
                    l7_protocol: IdRef(instance.l7_protocol_id),
                },
                pools: vec![VipPool {
                    id: None,
                    server_pool: IdRef(pool_id),
                    l7_rule: IdRef(instance.l7_rule_id),
                    order: None,
                }],
            })
        })
        .collect();

    Vip {
        id: None,
        name: spec.name.to_string(),
        service: spec.service.clone(),
        business: spec.business.to_string(),
        environmentvip: IdRef(instance.vip_environment_id),
        ipv4: spec.ip_id.map(IdRef),
        ipv6: None,
        ports,
        options: VipOptions {
            cache_group: IdRef(instance.cache_group_id),
            traffic_return: IdRef(instance.traffic_return_id),
            timeout: IdRef(instance.timeout_id),
            persistence: IdRef(instance.persistence_id),
        },
        created: false,
    }
}

// ---------------------------------------------------------------------------
// Merging server-assigned ids
// ---------------------------------------------------------------------------

/// Carry the pool id, deploy flag and member ids of `existing` into `desired`.
///
/// Members are matched on the id of their IP record; NetworkAPI duplicates
/// members whose id is not echoed back.
pub fn fill_pool_update(desired: &mut Pool, existing: &Pool) {
    desired.id = existing.id;
    desired.pool_created = existing.pool_created;

    for member in &mut desired.server_pool_members {
        let Some(ip_id) = member.ip.as_ref().map(|ip| ip.id) else {
            continue;
        };
        if let Some(current) = existing
            .server_pool_members
            .iter()
            .find(|current| current.ip.as_ref().is_some_and(|ip| ip.id == ip_id))
        {
            member.id = current.id;
        }
    }
}

/// Carry the VIP id, deploy flag, port ids and port-pool ids of `existing`
/// into `desired`. An adopted VIP also keeps its address, environment,
/// service, business and options; only its ports are rewritten.
///
/// Port pools are matched by position, so `existing` must go through
/// [`sort_ports`] first.
pub fn fill_vip_update(desired: &mut Vip, existing: &Vip, take_over: bool) {
    desired.id = existing.id;
    desired.created = existing.created;

    if take_over {
        desired.ipv4 = existing.ipv4;
        desired.environmentvip = existing.environmentvip;
        desired.service = existing.service.clone();
        desired.business = existing.business.clone();
        desired.options = existing.options.clone();
    }

    for port in &mut desired.ports {
        let Some(current) = existing.ports.iter().find(|current| current.port == port.port) else {
            continue;
        };
        port.id = current.id;
        for (pool, current_pool) in port.pools.iter_mut().zip(&current.pools) {
            pool.id = current_pool.id;
        }
    }
}
