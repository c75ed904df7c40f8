//! Controller configuration.
//!
//! The static configuration is a YAML document loaded once at startup. Every
//! Ingress then resolves its own [`InstanceConfig`]: the cluster-wide
//! NetworkAPI ids from the file, overridden by typed annotations.

use crate::error::ControllerError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::debug;

/// Prefix of every name this controller gives to NetworkAPI objects.
pub const CONTROLLER_NAME: &str = "kube-napi-ingress";

/// Prefix of the annotations read by this controller.
pub const ANNOTATION_PREFIX: &str = "kube-napi-ingress.microscaler.io/";

/// Finalizer guarding NetworkAPI cleanup.
pub const FINALIZER: &str = "kube-napi-ingress.microscaler.io/cleanup";

/// Names an existing NetworkAPI VIP to adopt instead of creating one.
pub const TAKE_OVER_ANNOTATION: &str = "kube-napi-ingress.microscaler.io/takeOverVIP";

/// Legacy ingress class annotation.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const DEFAULT_CONFIG_PATH: &str = "/etc/napi-ingress/config.yaml";
const DEFAULT_INGRESS_CLASS: &str = "globo-networkapi";
const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 300;
const MIN_RECONCILE_INTERVAL_SECONDS: u64 = 60;

fn default_ingress_class() -> String {
    DEFAULT_INGRESS_CLASS.to_string()
}

fn default_reconcile_interval() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECONDS
}

/// Equipment registered in NetworkAPI for each backend address
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EquipmentConfig {
    #[serde(rename = "type")]
    pub equipment_type: u64,
    pub model: u64,
    pub group: u64,
    pub environment: u64,
}

/// NetworkAPI ids used when programming one Ingress
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstanceConfig {
    #[serde(rename = "vipEnvironmentID")]
    pub vip_environment_id: u64,
    #[serde(rename = "poolEnvironmentID")]
    pub pool_environment_id: u64,
    #[serde(rename = "l4ProtocolID")]
    pub l4_protocol_id: u64,
    #[serde(rename = "l7ProtocolID")]
    pub l7_protocol_id: u64,
    #[serde(rename = "l7RuleID")]
    pub l7_rule_id: u64,
    #[serde(rename = "cacheGroupID")]
    pub cache_group_id: u64,
    #[serde(rename = "persistenceID")]
    pub persistence_id: u64,
    #[serde(rename = "timeoutID")]
    pub timeout_id: u64,
    #[serde(rename = "trafficReturnID")]
    pub traffic_return_id: u64,
}

type FieldAccessor = fn(&mut InstanceConfig) -> &mut u64;

/// Annotation suffixes that override an [`InstanceConfig`] field.
const INSTANCE_OVERRIDES: &[(&str, FieldAccessor)] = &[
    ("vipEnvironmentID", |c| &mut c.vip_environment_id),
    ("poolEnvironmentID", |c| &mut c.pool_environment_id),
    ("l4ProtocolID", |c| &mut c.l4_protocol_id),
    ("l7ProtocolID", |c| &mut c.l7_protocol_id),
    ("l7RuleID", |c| &mut c.l7_rule_id),
    ("cacheGroupID", |c| &mut c.cache_group_id),
    ("persistenceID", |c| &mut c.persistence_id),
    ("timeoutID", |c| &mut c.timeout_id),
    ("trafficReturnID", |c| &mut c.traffic_return_id),
];

impl InstanceConfig {
    /// Apply the Ingress annotations on top of these defaults.
    ///
    /// Keys are matched case-insensitively. Unknown suffixes are ignored; a
    /// value that is not an unsigned integer fails the whole resolution.
    pub fn with_overrides(&self, annotations: &BTreeMap<String, String>) -> Result<Self, ControllerError> {
        let mut resolved = self.clone();

        for (key, value) in annotations {
            let Some(suffix) = strip_prefix_ignore_case(key, ANNOTATION_PREFIX) else {
                continue;
            };
            let Some((field, accessor)) = INSTANCE_OVERRIDES
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(suffix))
            else {
                continue;
            };

            let parsed = value.trim().parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!(
                    "annotation {}: invalid value {:?} for {}: {}",
                    key, value, field, e
                ))
            })?;
            debug!("Annotation {} overrides {} with {}", key, field, parsed);
            *accessor(&mut resolved) = parsed;
        }

        Ok(resolved)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        let ids = [
            ("vipEnvironmentID", self.vip_environment_id),
            ("poolEnvironmentID", self.pool_environment_id),
            ("l4ProtocolID", self.l4_protocol_id),
            ("l7ProtocolID", self.l7_protocol_id),
            ("l7RuleID", self.l7_rule_id),
            ("cacheGroupID", self.cache_group_id),
            ("persistenceID", self.persistence_id),
            ("timeoutID", self.timeout_id),
            ("trafficReturnID", self.traffic_return_id),
        ];
        require_ids(&ids)
    }
}

fn strip_prefix_ignore_case<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let head = key.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &key[prefix.len()..])
}

fn require_ids(ids: &[(&str, u64)]) -> Result<(), ControllerError> {
    match ids.iter().find(|(_, id)| *id == 0) {
        Some((field, _)) => Err(ControllerError::InvalidConfig(format!("{} is required", field))),
        None => Ok(()),
    }
}

/// Static controller configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "clusterName", default)]
    pub cluster_name: String,
    #[serde(rename = "ingressClassName", default = "default_ingress_class")]
    pub ingress_class_name: String,
    #[serde(rename = "podNetworkID", default)]
    pub pod_network_id: u64,
    #[serde(rename = "lbNetworkID", default)]
    pub lb_network_id: u64,
    #[serde(rename = "networkAPIURL", default)]
    pub network_api_url: String,
    #[serde(rename = "networkAPIUsername", default)]
    pub network_api_username: String,
    #[serde(rename = "networkAPIPassword", default)]
    pub network_api_password: String,
    #[serde(rename = "reconcileIntervalSeconds", default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    #[serde(rename = "debugCrashAfterReconcile", default)]
    pub debug_crash_after_reconcile: bool,
    #[serde(default)]
    pub equipment: EquipmentConfig,
    /// Cluster-wide defaults for the per-Ingress ids
    #[serde(flatten)]
    pub instance: InstanceConfig,
}

impl Config {
    /// Load the configuration file named by `INGRESS_CONFIG`, apply the
    /// credential environment overrides and validate the result.
    pub fn load() -> Result<Self, ControllerError> {
        let path = env::var("INGRESS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ControllerError::InvalidConfig(format!("unable to read {}: {}", path, e)))?;

        let mut config = Self::from_yaml(&raw)?;
        config.apply_credentials(
            env::var("NETWORKAPI_USERNAME").ok(),
            env::var("NETWORKAPI_PASSWORD").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without validating it
    pub fn from_yaml(raw: &str) -> Result<Self, ControllerError> {
        serde_yaml::from_str(raw)
            .map_err(|e| ControllerError::InvalidConfig(format!("unable to parse config: {}", e)))
    }

    /// Replace the credentials with the ones given, when set
    pub fn apply_credentials(&mut self, username: Option<String>, password: Option<String>) {
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.network_api_username = username;
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.network_api_password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        let required = [
            ("clusterName", &self.cluster_name),
            ("ingressClassName", &self.ingress_class_name),
            ("networkAPIURL", &self.network_api_url),
            ("networkAPIUsername", &self.network_api_username),
            ("networkAPIPassword", &self.network_api_password),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ControllerError::InvalidConfig(format!("{} is required", field)));
        }

        require_ids(&[
            ("podNetworkID", self.pod_network_id),
            ("lbNetworkID", self.lb_network_id),
            ("equipment.type", self.equipment.equipment_type),
            ("equipment.model", self.equipment.model),
            ("equipment.group", self.equipment.group),
            ("equipment.environment", self.equipment.environment),
        ])?;
        self.instance.validate()?;

        if self.reconcile_interval_seconds < MIN_RECONCILE_INTERVAL_SECONDS {
            return Err(ControllerError::InvalidConfig(format!(
                "reconcileIntervalSeconds must be at least {}, got {}",
                MIN_RECONCILE_INTERVAL_SECONDS, self.reconcile_interval_seconds
            )));
        }

        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_seconds)
    }
}
