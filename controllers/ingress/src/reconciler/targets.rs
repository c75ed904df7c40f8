//! Backend resolution.
//!
//! Turns the Ingress backend reference into the Service ports it selects, and
//! those ports into the concrete addresses NetworkAPI pool members point at.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::validation::service_backends;
use k8s_openapi::api::core::v1::{Endpoints, Service, ServicePort};
use k8s_openapi::api::networking::v1::{Ingress, ServiceBackendPort};
use std::net::Ipv4Addr;
use tracing::debug;

pub const HTTPS_PORT: u16 = 443;

/// A backend address a pool member is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub network_id: u64,
    pub tls: bool,
}

/// Name of the single Service behind a validated Ingress
pub fn backend_service_name(ingress: &Ingress) -> Result<&str, ControllerError> {
    service_backends(ingress)
        .first()
        .map(|backend| backend.name.as_str())
        .ok_or_else(|| ControllerError::InvalidBackend("ingress has no backends".to_string()))
}

fn port_matches(reference: &ServiceBackendPort, port: &ServicePort) -> bool {
    match (reference.name.as_deref(), reference.number) {
        (Some(name), _) if !name.is_empty() => port.name.as_deref() == Some(name),
        (_, Some(number)) if number != 0 => port.port == number,
        _ => false,
    }
}

/// Service ports selected by every backend reference of the Ingress.
///
/// A reference matches by port name first, then by number. A reference
/// without either selects the only port of a single-port Service.
pub fn matching_ports(ingress: &Ingress, service: &Service) -> Result<Vec<ServicePort>, ControllerError> {
    let service_name = format!(
        "{}/{}",
        service.metadata.namespace.as_deref().unwrap_or_default(),
        service.metadata.name.as_deref().unwrap_or_default()
    );
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_deref())
        .unwrap_or_default();
    if ports.is_empty() {
        return Err(ControllerError::InvalidBackend(format!(
            "backend service {} has no ports",
            service_name
        )));
    }

    let mut matched: Vec<ServicePort> = Vec::new();
    for backend in service_backends(ingress) {
        let reference = backend.port.clone().unwrap_or_default();
        let explicit = reference.name.as_deref().is_some_and(|n| !n.is_empty())
            || reference.number.is_some_and(|n| n != 0);

        let port = if explicit {
            ports
                .iter()
                .find(|port| port_matches(&reference, port))
                .ok_or_else(|| {
                    ControllerError::InvalidBackend(format!(
                        "backend service {} has no port matching {:?}",
                        service_name, reference
                    ))
                })?
        } else {
            match ports {
                [only] => only,
                _ => {
                    return Err(ControllerError::InvalidBackend(format!(
                        "backend service {} has more than one port, ingress must choose one",
                        service_name
                    )));
                }
            }
        };

        if !matched.contains(port) {
            matched.push(port.clone());
        }
    }

    Ok(matched)
}

fn service_port_number(port: &ServicePort) -> Result<u16, ControllerError> {
    u16::try_from(port.port)
        .map_err(|_| ControllerError::InvalidBackend(format!("invalid service port {}", port.port)))
}

/// Whether the Endpoints lookup is needed to resolve this Service
pub fn is_load_balancer(service: &Service) -> bool {
    service_type(service) == "LoadBalancer"
}

fn service_type(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .unwrap_or("ClusterIP")
}

/// Resolve the targets for the matched ports of a Service.
///
/// `endpoints` is only consulted for Services that are not of type
/// `LoadBalancer`; for those it must be present.
pub fn resolve_targets(
    config: &Config,
    service: &Service,
    ports: &[ServicePort],
    endpoints: Option<&Endpoints>,
) -> Result<Vec<Target>, ControllerError> {
    match service_type(service) {
        "ExternalName" => Err(ControllerError::InvalidBackend(format!(
            "service {} of type ExternalName cannot be used as backend",
            service.metadata.name.as_deref().unwrap_or_default()
        ))),
        "LoadBalancer" => load_balancer_targets(config, service, ports),
        _ => {
            let endpoints = endpoints.ok_or_else(|| {
                ControllerError::InvalidBackend(format!(
                    "endpoints for service {} not found",
                    service.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;
            endpoint_targets(config, ports, endpoints)
        }
    }
}

fn load_balancer_targets(config: &Config, service: &Service, ports: &[ServicePort]) -> Result<Vec<Target>, ControllerError> {
    let lb_ip = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|ingress| ingress.ip.as_deref());

    let Some(lb_ip) = lb_ip else {
        debug!(
            "Service {} has no load balancer address yet",
            service.metadata.name.as_deref().unwrap_or_default()
        );
        return Ok(Vec::new());
    };
    let ip: Ipv4Addr = lb_ip
        .parse()
        .map_err(|_| ControllerError::InvalidBackend(format!("load balancer address {} is not IPv4", lb_ip)))?;

    ports
        .iter()
        .map(|port| {
            let number = service_port_number(port)?;
            Ok(Target {
                ip,
                port: number,
                network_id: config.lb_network_id,
                tls: number == HTTPS_PORT,
            })
        })
        .collect()
}

fn endpoint_targets(config: &Config, ports: &[ServicePort], endpoints: &Endpoints) -> Result<Vec<Target>, ControllerError> {
    let mut targets = Vec::new();

    for port in ports {
        let service_number = service_port_number(port)?;
        let port_name = port.name.as_deref().filter(|name| !name.is_empty());
        // Without a targetPort the endpoint port equals the service port.
        let fallback_number = port.target_port.is_none().then_some(port.port);

        for subset in endpoints.subsets.iter().flatten() {
            let endpoint_port = subset.ports.iter().flatten().find(|subset_port| {
                (port_name.is_some() && subset_port.name.as_deref() == port_name)
                    || Some(subset_port.port) == fallback_number
            });
            let Some(endpoint_port) = endpoint_port else {
                continue;
            };
            let Ok(number) = u16::try_from(endpoint_port.port) else {
                continue;
            };

            for address in subset.addresses.iter().flatten() {
                match address.ip.parse::<Ipv4Addr>() {
                    Ok(ip) => targets.push(Target {
                        ip,
                        port: number,
                        network_id: config.pod_network_id,
                        tls: service_number == HTTPS_PORT,
                    }),
                    Err(_) => debug!("Skipping non-IPv4 endpoint address {}", address.ip),
                }
            }
        }
    }

    Ok(targets)
}
