//! NetworkAPI client
//!
//! Implements the GloboNetworkAPI v3 REST API for VIP requests, server
//! pools, equipment and IPv4 addresses, plus the legacy XML endpoint used to
//! allocate VIP addresses.

use crate::common::{self, HttpClient, xml};
use crate::error::NetworkApiError;
use crate::models::*;
use crate::networkapi_trait::NetworkApiClientTrait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

const VIP_PATH: &str = "api/v3/vip-request/";
const POOL_PATH: &str = "api/v3/pool/";
const EQUIPMENT_PATH: &str = "api/v3/equipment/";
const IPV4_PATH: &str = "api/v3/ipv4/";

/// NetworkAPI client
pub struct NetworkApiClient {
    http: HttpClient,
}

impl NetworkApiClient {
    /// Create a new NetworkAPI client
    ///
    /// # Arguments
    /// * `base_url` - NetworkAPI base URL (e.g., "http://networkapi.example.com")
    /// * `username` / `password` - credentials for HTTP basic authentication
    pub fn new(base_url: String, username: String, password: String) -> Result<Self, NetworkApiError> {
        // Only the connection is bounded; request lifetime follows the caller's future.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, username, password),
        })
    }

    /// First object of a list endpoint, or `NotFound` naming `what`
    async fn get_first<T: DeserializeOwned>(&self, path: &str, field: &str, what: String) -> Result<T, NetworkApiError> {
        let body: serde_json::Value = self.http.get(path).await?;
        common::extract_field::<T>(body, field)?
            .into_iter()
            .next()
            .ok_or(NetworkApiError::NotFound(what))
    }

    async fn get_vip_by_id(&self, id: u64) -> Result<Vip, NetworkApiError> {
        self.get_first(&format!("{}{}/", VIP_PATH, id), "vips", format!("VIP {}", id)).await
    }

    async fn get_pool_by_id(&self, id: u64) -> Result<Pool, NetworkApiError> {
        self.get_first(&format!("{}{}/", POOL_PATH, id), "server_pools", format!("pool {}", id)).await
    }

    async fn get_equipment_by_id(&self, id: u64) -> Result<Equipment, NetworkApiError> {
        self.get_first(&format!("{}{}/", EQUIPMENT_PATH, id), "equipments", format!("equipment {}", id)).await
    }
}

fn require_id(kind: &str, name: &str, id: Option<u64>) -> Result<u64, NetworkApiError> {
    id.ok_or_else(|| NetworkApiError::InvalidRequest(format!("{} {} has no id", kind, name)))
}

#[async_trait::async_trait]
impl NetworkApiClientTrait for NetworkApiClient {
    async fn get_vip(&self, name: &str) -> Result<Vip, NetworkApiError> {
        let path = common::search_query(VIP_PATH, serde_json::json!({ "name": name }));
        self.get_first(&path, "vips", format!("VIP {}", name)).await
    }

    async fn create_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError> {
        debug!("Creating VIP {}", vip.name);
        let body = self.http.post(VIP_PATH, &common::envelope("vips", vip)?).await?;
        let id = common::single_created_id("vips", body)?;
        self.get_vip_by_id(id).await
    }

    async fn update_vip(&self, vip: &Vip) -> Result<Vip, NetworkApiError> {
        let id = require_id("VIP", &vip.name, vip.id)?;
        let path = if vip.created {
            format!("{}deploy/{}/", VIP_PATH, id)
        } else {
            format!("{}{}/", VIP_PATH, id)
        };
        debug!("Updating VIP {} (ID: {})", vip.name, id);
        self.http.put(&path, &common::envelope("vips", vip)?).await?;
        self.get_vip_by_id(id).await
    }

    async fn deploy_vip(&self, vip_id: u64) -> Result<(), NetworkApiError> {
        debug!("Deploying VIP {}", vip_id);
        self.http.post_empty(&format!("{}deploy/{}/", VIP_PATH, vip_id)).await
    }

    async fn delete_vip(&self, vip: &Vip) -> Result<(), NetworkApiError> {
        let id = require_id("VIP", &vip.name, vip.id)?;
        if vip.created {
            debug!("Undeploying VIP {} (ID: {})", vip.name, id);
            self.http.delete(&format!("{}deploy/{}/", VIP_PATH, id)).await?;
        }
        // The VIP address is released separately.
        self.http.delete(&format!("{}{}/?keepip=1", VIP_PATH, id)).await
    }

    async fn get_pool(&self, identifier: &str) -> Result<Pool, NetworkApiError> {
        let path = common::search_query(POOL_PATH, serde_json::json!({ "identifier": identifier }));
        self.get_first(&path, "server_pools", format!("pool {}", identifier)).await
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError> {
        debug!("Creating pool {}", pool.identifier);
        let body = self.http.post(POOL_PATH, &common::envelope("server_pools", pool)?).await?;
        let id = common::single_created_id("server_pools", body)?;
        self.get_pool_by_id(id).await
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, NetworkApiError> {
        let id = require_id("pool", &pool.identifier, pool.id)?;
        let path = if pool.pool_created {
            format!("{}deploy/{}/", POOL_PATH, id)
        } else {
            format!("{}{}/", POOL_PATH, id)
        };
        debug!("Updating pool {} (ID: {})", pool.identifier, id);
        self.http.put(&path, &common::envelope("server_pools", pool)?).await?;
        self.get_pool_by_id(id).await
    }

    async fn delete_pool(&self, pool: &Pool) -> Result<(), NetworkApiError> {
        let id = require_id("pool", &pool.identifier, pool.id)?;
        if pool.pool_created {
            debug!("Undeploying pool {} (ID: {})", pool.identifier, id);
            self.http.delete(&format!("{}deploy/{}/", POOL_PATH, id)).await?;
        }
        self.http.delete(&format!("{}{}/", POOL_PATH, id)).await
    }

    async fn get_equipment(&self, name: &str) -> Result<Equipment, NetworkApiError> {
        let path = format!("{}?name={}", EQUIPMENT_PATH, urlencoding::encode(name));
        self.get_first(&path, "equipments", format!("equipment {}", name)).await
    }

    async fn create_equipment(&self, equipment: &Equipment) -> Result<Equipment, NetworkApiError> {
        debug!("Creating equipment {}", equipment.name);
        let body = self.http.post(EQUIPMENT_PATH, &common::envelope("equipments", equipment)?).await?;
        let id = common::single_created_id("equipments", body)?;
        self.get_equipment_by_id(id).await
    }

    async fn get_ip_by_name(&self, description: &str) -> Result<Ip, NetworkApiError> {
        let path = common::search_query(IPV4_PATH, serde_json::json!({ "description": description }));
        self.get_first(&path, "ips", format!("IP {}", description)).await
    }

    async fn get_ip_by_net_ip(&self, addr: Ipv4Addr, network_id: u64) -> Result<Ip, NetworkApiError> {
        let [oct1, oct2, oct3, oct4] = addr.octets();
        let path = common::search_query(
            IPV4_PATH,
            serde_json::json!({
                "oct1": oct1,
                "oct2": oct2,
                "oct3": oct3,
                "oct4": oct4,
                "networkipv4": network_id,
            }),
        );
        self.get_first(&path, "ips", format!("IP {} in network {}", addr, network_id)).await
    }

    async fn get_ip_by_id(&self, id: u64) -> Result<Ip, NetworkApiError> {
        self.get_first(&format!("{}{}/", IPV4_PATH, id), "ips", format!("IP {}", id)).await
    }

    async fn create_ip(&self, ip: &Ip) -> Result<Ip, NetworkApiError> {
        debug!("Creating IP {} ({})", ip.to_ipv4(), ip.description);
        let body = self.http.post(IPV4_PATH, &common::envelope("ips", ip)?).await?;
        let id = common::single_created_id("ips", body)?;
        self.get_ip_by_id(id).await
    }

    async fn delete_ip(&self, id: u64) -> Result<(), NetworkApiError> {
        self.http.delete(&format!("{}{}/", IPV4_PATH, id)).await
    }

    async fn create_vip_ipv4(&self, name: &str, vip_environment_id: u64) -> Result<Ip, NetworkApiError> {
        debug!("Allocating VIP address {} from VIP environment {}", name, vip_environment_id);
        let body = xml::allocate_vip_ip_body(name, vip_environment_id)?;
        let answer = self
            .http
            .post_xml(&format!("ip/availableip4/vip/{}/", vip_environment_id), body)
            .await?;
        xml::parse_allocated_ip(&answer)
    }
}
