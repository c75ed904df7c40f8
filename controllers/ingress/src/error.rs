//! Controller-specific error types.
//!
//! `ValidationError` covers Ingress shapes the controller refuses to program;
//! `ControllerError` is what a reconciliation pass returns.

use kube::Error as KubeError;
use networkapi_client::NetworkApiError;
use thiserror::Error;

/// Unsupported or malformed Ingress. Messages are surfaced verbatim in events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid ingress class detected, predicate failed")]
    InvalidClass,

    #[error("Ingress must have either default backend or one rule")]
    NoBackend,

    #[error("Ingress can have only one path")]
    MultiplePaths,

    #[error("Ingress path must be unset, / or /*")]
    UnsupportedPath,

    #[error("Ingress path must have a Service")]
    PathWithoutService,

    #[error("Ingress default backend must have a Service")]
    DefaultBackendWithoutService,

    #[error("Service backend must have a name")]
    UnnamedService,

    #[error("Ingress rule must have an HTTP value")]
    RuleWithoutHttp,

    #[error("Ingress cannot have different Services by rule")]
    DifferentServices,

    #[error("Ingress can't have a DefaultBackend and Rules at the same time")]
    DefaultBackendAndRules,
}

/// Errors that can occur in the ingress controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// NetworkAPI error
    #[error("NetworkAPI error: {0}")]
    NetworkApi(#[from] NetworkApiError),

    /// Ingress failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Invalid configuration (static file or per-Ingress annotation)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend Service cannot be turned into targets
    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    /// NetworkAPI holds something the controller cannot work with
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
