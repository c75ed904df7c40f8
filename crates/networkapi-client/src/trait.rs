//! NetworkApiClient trait for mocking
//!
//! This trait abstracts the NetworkApiClient so the reconciler can run against
//! the in-memory mock in unit tests.

use crate::error::NetworkApiError;
use crate::models::*;
use std::net::Ipv4Addr;

/// Trait for NetworkAPI operations used by the ingress controller
///
/// Every `get_*` method returns `NetworkApiError::NotFound` when the object
/// does not exist. All async methods must be `Send` to work with Tokio's
/// work-stealing runtime.
#[async_trait::async_trait]
pub trait NetworkApiClientTrait: Send + Sync {
    // VIP requests
    async fn get_vip(&self, name: &str) -> Result<Vip, NetworkApiError>;
    async fn create_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError>;
    /// Update a VIP in place; deployed VIPs are updated on the appliance too.
    async fn update_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError>;
    async fn deploy_vip(&self, vip_id: u64) -> Result<(), NetworkApiError>;
    /// Undeploy (when deployed) and delete a VIP.
    async fn delete_vip(&self, vip: &Vip) -> Result<(), NetworkApiError>;

    // Server pools
    async fn get_pool(&self, identifier: &str) -> Result<Pool, NetworkApiError>;
    async fn create_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError>;
    async fn update_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError>;
    async fn delete_pool(&self, pool: &Pool) -> Result<(), NetworkApiError>;

    // Equipment
    async fn get_equipment(&self, name: &str) -> Result<Equipment, NetworkApiError>;
    async fn create_equipment(&self, equipment: &Equipment) -> Result<Equipment, NetworkApiError>;

    // IPv4
    async fn get_ip_by_name(&self, description: &str) -> Result<Ip, NetworkApiError>;
    async fn get_ip_by_net_ip(&self, addr: Ipv4Addr, network_id: u64) -> Result<Ip, NetworkApiError>;
    async fn get_ip_by_id(&self, id: u64) -> Result<Ip, NetworkApiError>;
    async fn create_ip(&self, ip: &Ip) -> Result<Ip, NetworkApiError>;
    async fn delete_ip(&self, id: u64) -> Result<(), NetworkApiError>;
    /// Allocate the next free address of a VIP environment.
    async fn create_vip_ipv4(&self, name: &str, vip_environment_id: u64) -> Result<Ip, NetworkApiError>;
}
