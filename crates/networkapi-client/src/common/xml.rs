//! Legacy XML payloads
//!
//! VIP address allocation is only exposed by the pre-v3 API, which speaks
//! XML wrapped in a `<networkapi versao="1.0">` root element.

use crate::error::NetworkApiError;
use crate::models::{IdRef, Ip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename = "networkapi")]
struct AllocateVipIpRequest<'a> {
    #[serde(rename = "@versao")]
    versao: &'a str,
    ip_map: IpMap<'a>,
}

#[derive(Debug, Serialize)]
struct IpMap<'a> {
    id_evip: u64,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct AllocateVipIpResponse {
    ip: AllocatedIp,
}

#[derive(Debug, Deserialize)]
struct AllocatedIp {
    id: u64,
    oct1: u8,
    oct2: u8,
    oct3: u8,
    oct4: u8,
    networkipv4: u64,
    #[serde(default)]
    descricao: Option<String>,
}

/// Render the body for `POST /ip/availableip4/vip/{id}/`
pub fn allocate_vip_ip_body(name: &str, vip_environment_id: u64) -> Result<String, NetworkApiError> {
    let request = AllocateVipIpRequest {
        versao: "1.0",
        ip_map: IpMap {
            id_evip: vip_environment_id,
            name,
        },
    };
    quick_xml::se::to_string(&request).map_err(|e| NetworkApiError::Xml(e.to_string()))
}

/// Decode the allocated address from the legacy answer
pub fn parse_allocated_ip(body: &str) -> Result<Ip, NetworkApiError> {
    let response: AllocateVipIpResponse = quick_xml::de::from_str(body)
        .map_err(|e| NetworkApiError::Xml(format!("{} - body: {}", e, body)))?;
    let ip = response.ip;
    Ok(Ip {
        id: Some(ip.id),
        oct1: ip.oct1,
        oct2: ip.oct2,
        oct3: ip.oct3,
        oct4: ip.oct4,
        networkipv4: IdRef(ip.networkipv4),
        description: ip.descricao.unwrap_or_default(),
        equipments: Vec::new(),
    })
}
