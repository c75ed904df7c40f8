//! Mock NetworkApiClient for unit testing
//!
//! In-memory implementation of `NetworkApiClientTrait` so the ingress
//! reconciler can be exercised without a running NetworkAPI. Every mutating
//! call is recorded in [`MockCalls`] so tests can assert on exactly what was
//! sent.

use crate::error::NetworkApiError;
use crate::models::*;
use crate::networkapi_trait::NetworkApiClientTrait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mutating calls received by the mock, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// VIP names
    pub vip_creates: Vec<String>,
    /// VIP ids
    pub vip_updates: Vec<u64>,
    pub vip_deploys: Vec<u64>,
    pub vip_deletes: Vec<u64>,
    /// Pool identifiers
    pub pool_creates: Vec<String>,
    /// Pool ids
    pub pool_updates: Vec<u64>,
    pub pool_deletes: Vec<u64>,
    /// Addresses registered through `create_ip` or `create_vip_ipv4`
    pub ip_creates: Vec<Ipv4Addr>,
    pub ip_deletes: Vec<u64>,
    /// Equipment names
    pub equipment_creates: Vec<String>,
}

/// Addresses handed out by `create_vip_ipv4` for one VIP environment
#[derive(Debug, Clone)]
struct VipAddressPool {
    network_id: u64,
    addresses: Vec<Ipv4Addr>,
}

/// Mock NetworkApiClient for testing
#[derive(Clone)]
pub struct MockNetworkApiClient {
    vips: Arc<Mutex<HashMap<String, Vip>>>,
    pools: Arc<Mutex<HashMap<String, Pool>>>,
    equipments: Arc<Mutex<HashMap<String, Equipment>>>,
    ips: Arc<Mutex<HashMap<u64, Ip>>>,
    vip_addresses: Arc<Mutex<HashMap<u64, VipAddressPool>>>,
    calls: Arc<Mutex<MockCalls>>,
    next_id: Arc<Mutex<u64>>,
}

impl Default for MockNetworkApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockNetworkApiClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self {
            vips: Arc::new(Mutex::new(HashMap::new())),
            pools: Arc::new(Mutex::new(HashMap::new())),
            equipments: Arc::new(Mutex::new(HashMap::new())),
            ips: Arc::new(Mutex::new(HashMap::new())),
            vip_addresses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(MockCalls::default())),
            next_id: Arc::new(Mutex::new(1000)),
        }
    }

    /// Add a VIP to the mock store (for test setup). An id is assigned when missing.
    pub fn add_vip(&self, mut vip: Vip) -> Vip {
        if vip.id.is_none() {
            vip.id = Some(self.next_id());
        }
        lock(&self.vips).insert(vip.name.clone(), vip.clone());
        vip
    }

    /// Add a pool to the mock store (for test setup). An id is assigned when missing.
    pub fn add_pool(&self, mut pool: Pool) -> Pool {
        if pool.id.is_none() {
            pool.id = Some(self.next_id());
        }
        lock(&self.pools).insert(pool.identifier.clone(), pool.clone());
        pool
    }

    /// Add an IP to the mock store (for test setup). An id is assigned when missing.
    pub fn add_ip(&self, mut ip: Ip) -> Ip {
        let id = *ip.id.get_or_insert_with(|| self.next_id());
        lock(&self.ips).insert(id, ip.clone());
        ip
    }

    /// Add an equipment to the mock store (for test setup)
    pub fn add_equipment(&self, mut equipment: Equipment) -> Equipment {
        if equipment.id.is_none() {
            equipment.id = Some(self.next_id());
        }
        lock(&self.equipments).insert(equipment.name.clone(), equipment.clone());
        equipment
    }

    /// Addresses `create_vip_ipv4` hands out for a VIP environment, in order
    pub fn set_vip_addresses(&self, vip_environment_id: u64, network_id: u64, addresses: Vec<Ipv4Addr>) {
        lock(&self.vip_addresses).insert(vip_environment_id, VipAddressPool { network_id, addresses });
    }

    /// Snapshot of the recorded calls
    pub fn calls(&self) -> MockCalls {
        lock(&self.calls).clone()
    }

    /// Forget the recorded calls, keeping the stored objects
    pub fn reset_calls(&self) {
        *lock(&self.calls) = MockCalls::default();
    }

    pub fn vip(&self, name: &str) -> Option<Vip> {
        lock(&self.vips).get(name).cloned()
    }

    pub fn pool(&self, identifier: &str) -> Option<Pool> {
        lock(&self.pools).get(identifier).cloned()
    }

    pub fn ip(&self, id: u64) -> Option<Ip> {
        lock(&self.ips).get(&id).cloned()
    }

    pub fn ip_count(&self) -> usize {
        lock(&self.ips).len()
    }

    pub fn equipment(&self, name: &str) -> Option<Equipment> {
        lock(&self.equipments).get(name).cloned()
    }

    fn next_id(&self) -> u64 {
        let mut id = lock(&self.next_id);
        let current = *id;
        *id += 1;
        current
    }

    /// Assign ids to ports and port pools that do not have one yet
    fn assign_vip_ids(&self, vip: &mut Vip) {
        for port in &mut vip.ports {
            if port.id.is_none() {
                port.id = Some(self.next_id());
            }
            for pool in &mut port.pools {
                if pool.id.is_none() {
                    pool.id = Some(self.next_id());
                }
            }
        }
    }

    fn assign_member_ids(&self, pool: &mut Pool) {
        for member in &mut pool.server_pool_members {
            if member.id.is_none() {
                member.id = Some(self.next_id());
            }
        }
    }

    fn vip_by_id(&self, id: u64) -> Option<Vip> {
        lock(&self.vips).values().find(|vip| vip.id == Some(id)).cloned()
    }

    fn pool_by_id(&self, id: u64) -> Option<Pool> {
        lock(&self.pools).values().find(|pool| pool.id == Some(id)).cloned()
    }
}

#[async_trait::async_trait]
impl NetworkApiClientTrait for MockNetworkApiClient {
    async fn get_vip(&self, name: &str) -> Result<Vip, NetworkApiError> {
        self.vip(name)
            .ok_or_else(|| NetworkApiError::NotFound(format!("VIP {}", name)))
    }

    async fn create_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError> {
        let mut stored = vip.clone();
        stored.id = Some(self.next_id());
        stored.created = false;
        self.assign_vip_ids(&mut stored);
        lock(&self.vips).insert(stored.name.clone(), stored.clone());
        lock(&self.calls).vip_creates.push(stored.name.clone());
        Ok(stored)
    }

    async fn update_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError> {
        let id = vip
            .id
            .ok_or_else(|| NetworkApiError::InvalidRequest(format!("VIP {} has no id", vip.name)))?;
        let existing = self
            .vip_by_id(id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("VIP {}", id)))?;

        let mut stored = vip.clone();
        stored.created = existing.created;
        self.assign_vip_ids(&mut stored);
        {
            let mut vips = lock(&self.vips);
            vips.remove(&existing.name);
            vips.insert(stored.name.clone(), stored.clone());
        }
        lock(&self.calls).vip_updates.push(id);
        Ok(stored)
    }

    async fn deploy_vip(&self, vip_id: u64) -> Result<(), NetworkApiError> {
        let mut vips = lock(&self.vips);
        let vip = vips
            .values_mut()
            .find(|vip| vip.id == Some(vip_id))
            .ok_or_else(|| NetworkApiError::NotFound(format!("VIP {}", vip_id)))?;
        vip.created = true;
        drop(vips);
        lock(&self.calls).vip_deploys.push(vip_id);
        Ok(())
    }

    async fn delete_vip(&self, vip: &Vip) -> Result<(), NetworkApiError> {
        let id = vip
            .id
            .ok_or_else(|| NetworkApiError::InvalidRequest(format!("VIP {} has no id", vip.name)))?;
        let existing = self
            .vip_by_id(id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("VIP {}", id)))?;
        lock(&self.vips).remove(&existing.name);
        lock(&self.calls).vip_deletes.push(id);
        Ok(())
    }

    async fn get_pool(&self, identifier: &str) -> Result<Pool, NetworkApiError> {
        self.pool(identifier)
            .ok_or_else(|| NetworkApiError::NotFound(format!("pool {}", identifier)))
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError> {
        let mut stored = pool.clone();
        stored.id = Some(self.next_id());
        stored.pool_created = true;
        self.assign_member_ids(&mut stored);
        lock(&self.pools).insert(stored.identifier.clone(), stored.clone());
        lock(&self.calls).pool_creates.push(stored.identifier.clone());
        Ok(stored)
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError> {
        let id = pool
            .id
            .ok_or_else(|| NetworkApiError::InvalidRequest(format!("pool {} has no id", pool.identifier)))?;
        let existing = self
            .pool_by_id(id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("pool {}", id)))?;

        let mut stored = pool.clone();
        stored.pool_created = existing.pool_created;
        self.assign_member_ids(&mut stored);
        {
            let mut pools = lock(&self.pools);
            pools.remove(&existing.identifier);
            pools.insert(stored.identifier.clone(), stored.clone());
        }
        lock(&self.calls).pool_updates.push(id);
        Ok(stored)
    }

    async fn delete_pool(&self, pool: &Pool) -> Result<(), NetworkApiError> {
        let id = pool
            .id
            .ok_or_else(|| NetworkApiError::InvalidRequest(format!("pool {} has no id", pool.identifier)))?;
        let existing = self
            .pool_by_id(id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("pool {}", id)))?;
        lock(&self.pools).remove(&existing.identifier);
        lock(&self.calls).pool_deletes.push(id);
        Ok(())
    }

    async fn get_equipment(&self, name: &str) -> Result<Equipment, NetworkApiError> {
        self.equipment(name)
            .ok_or_else(|| NetworkApiError::NotFound(format!("equipment {}", name)))
    }

    async fn create_equipment(&self, equipment: &Equipment) -> Result<Equipment, NetworkApiError> {
        let mut stored = equipment.clone();
        stored.id = Some(self.next_id());
        lock(&self.equipments).insert(stored.name.clone(), stored.clone());
        lock(&self.calls).equipment_creates.push(stored.name.clone());
        Ok(stored)
    }

    async fn get_ip_by_name(&self, description: &str) -> Result<Ip, NetworkApiError> {
        lock(&self.ips)
            .values()
            .find(|ip| ip.description == description)
            .cloned()
            .ok_or_else(|| NetworkApiError::NotFound(format!("IP {}", description)))
    }

    async fn get_ip_by_net_ip(&self, addr: Ipv4Addr, network_id: u64) -> Result<Ip, NetworkApiError> {
        lock(&self.ips)
            .values()
            .find(|ip| ip.to_ipv4() == addr && ip.networkipv4 == IdRef(network_id))
            .cloned()
            .ok_or_else(|| NetworkApiError::NotFound(format!("IP {} in network {}", addr, network_id)))
    }

    async fn get_ip_by_id(&self, id: u64) -> Result<Ip, NetworkApiError> {
        self.ip(id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("IP {}", id)))
    }

    async fn create_ip(&self, ip: &Ip) -> Result<Ip, NetworkApiError> {
        let mut stored = ip.clone();
        stored.id = Some(self.next_id());
        let addr = stored.to_ipv4();
        self.add_ip(stored.clone());
        lock(&self.calls).ip_creates.push(addr);
        Ok(stored)
    }

    async fn delete_ip(&self, id: u64) -> Result<(), NetworkApiError> {
        lock(&self.ips)
            .remove(&id)
            .ok_or_else(|| NetworkApiError::NotFound(format!("IP {}", id)))?;
        lock(&self.calls).ip_deletes.push(id);
        Ok(())
    }

    async fn create_vip_ipv4(&self, name: &str, vip_environment_id: u64) -> Result<Ip, NetworkApiError> {
        let pool = lock(&self.vip_addresses)
            .get(&vip_environment_id)
            .cloned()
            .ok_or_else(|| NetworkApiError::Api(format!("no addresses in VIP environment {}", vip_environment_id)))?;

        let in_use: Vec<Ipv4Addr> = lock(&self.ips).values().map(Ip::to_ipv4).collect();
        let addr = pool
            .addresses
            .into_iter()
            .find(|addr| !in_use.contains(addr))
            .ok_or_else(|| NetworkApiError::Api(format!("VIP environment {} is exhausted", vip_environment_id)))?;

        let ip = self.add_ip(Ip {
            networkipv4: IdRef(pool.network_id),
            description: name.to_string(),
            ..Ip::from_ipv4(addr)
        });
        lock(&self.calls).ip_creates.push(addr);
        Ok(ip)
    }
}
