//! NetworkAPI models
//!
//! These models match the GloboNetworkAPI v3 serializers for VIP requests,
//! server pools, IPv4 addresses and equipment. Only the fields the ingress
//! controller reads or writes are modelled; everything else the API returns
//! is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::Ipv4Addr;

/// Numeric reference to another NetworkAPI object.
///
/// Depending on the `kind`/`include` query parameters NetworkAPI renders
/// foreign keys either as a bare integer or as a nested object carrying an
/// `id`. Both shapes deserialize to the same value; serialization always
/// emits the bare integer, which is what write endpoints expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IdRef(pub u64);

impl Serialize for IdRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for IdRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Id(u64),
            Object { id: u64 },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Id(id) | Repr::Object { id } => IdRef(id),
        })
    }
}

impl From<u64> for IdRef {
    fn from(id: u64) -> Self {
        IdRef(id)
    }
}

/// `{"id": N}` as used in equipment and group lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdOnly {
    pub id: u64,
}

/// NetworkAPI renders unset strings as `null`; treat them as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// IPv4
// ---------------------------------------------------------------------------

/// IPv4 address record (`/api/v3/ipv4/`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ip {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub oct1: u8,
    pub oct2: u8,
    pub oct3: u8,
    pub oct4: u8,
    pub networkipv4: IdRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub equipments: Vec<IdOnly>,
}

impl Ip {
    /// Build an IP record from an address, leaving network and description unset.
    pub fn from_ipv4(addr: Ipv4Addr) -> Self {
        let [oct1, oct2, oct3, oct4] = addr.octets();
        Self {
            oct1,
            oct2,
            oct3,
            oct4,
            ..Default::default()
        }
    }

    /// The address stored in the four octets.
    pub fn to_ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.oct1, self.oct2, self.oct3, self.oct4)
    }
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// Equipment record (`/api/v3/equipment/`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Equipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub equipment_type: IdRef,
    pub model: IdRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub environments: Vec<EquipmentEnvironment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<IdOnly>,
}

/// Environment membership of an equipment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EquipmentEnvironment {
    pub environment: IdRef,
    #[serde(default)]
    pub is_router: bool,
    #[serde(default)]
    pub is_controller: bool,
}

// ---------------------------------------------------------------------------
// Server pools
// ---------------------------------------------------------------------------

/// Server pool (`/api/v3/pool/`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pool {
    #[serde(default)]
    pub id: Option<u64>,
    pub identifier: String,
    pub default_port: u16,
    pub environment: IdRef,
    pub servicedownaction: ServiceDownAction,
    pub lb_method: String,
    pub healthcheck: HealthCheck,
    #[serde(default)]
    pub default_limit: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_pool_members: Vec<PoolMember>,
    /// Set by NetworkAPI once the pool has been deployed to the appliance.
    #[serde(default)]
    pub pool_created: bool,
}

/// Action taken by the appliance when every member is down
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceDownAction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifier: String,
    pub healthcheck_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub healthcheck_request: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub healthcheck_expect: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub destination: String,
}

/// Real server attached to a pool
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolMember {
    /// Assigned by NetworkAPI; must be echoed back on update or the member is duplicated.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifier: String,
    pub ip: Option<PoolMemberIp>,
    #[serde(default)]
    pub ipv6: Option<PoolMemberIp>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub limit: u32,
    pub port_real: u16,
    #[serde(default)]
    pub member_status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolMemberIp {
    pub id: u64,
    pub ip_formated: String,
}

// ---------------------------------------------------------------------------
// VIP requests
// ---------------------------------------------------------------------------

/// VIP request (`/api/v3/vip-request/`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vip {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub business: String,
    pub environmentvip: IdRef,
    #[serde(default)]
    pub ipv4: Option<IdRef>,
    #[serde(default)]
    pub ipv6: Option<IdRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<VipPort>,
    #[serde(default)]
    pub options: VipOptions,
    /// Set by NetworkAPI once the VIP has been deployed to the appliance.
    #[serde(default)]
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VipOptions {
    pub cache_group: IdRef,
    pub traffic_return: IdRef,
    pub timeout: IdRef,
    pub persistence: IdRef,
}

/// Listening port of a VIP
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VipPort {
    #[serde(default)]
    pub id: Option<u64>,
    pub port: u16,
    pub options: VipPortOptions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pools: Vec<VipPool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VipPortOptions {
    pub l4_protocol: IdRef,
    pub l7_protocol: IdRef,
}

/// Pool bound to a VIP port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VipPool {
    #[serde(default)]
    pub id: Option<u64>,
    pub server_pool: IdRef,
    pub l7_rule: IdRef,
    #[serde(default)]
    pub order: Option<u32>,
}
