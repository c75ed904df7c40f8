//! Ingress shape checks.
//!
//! Only a single Service behind at most one path per rule is supported. The
//! checks run in a fixed order so every malformed Ingress reports the same
//! message on every pass.

use crate::config::INGRESS_CLASS_ANNOTATION;
use crate::error::ValidationError;
use k8s_openapi::api::networking::v1::{Ingress, IngressServiceBackend};
use std::collections::BTreeSet;

const ALLOWED_PATHS: [&str; 3] = ["", "/", "/*"];

/// Effective ingress class: the spec field when set, else the legacy annotation.
pub fn ingress_class(ingress: &Ingress) -> Option<&str> {
    let from_spec = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        .filter(|class| !class.is_empty());

    from_spec.or_else(|| {
        ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(INGRESS_CLASS_ANNOTATION))
            .map(String::as_str)
    })
}

pub fn has_class(ingress: &Ingress, class_name: &str) -> bool {
    ingress_class(ingress) == Some(class_name)
}

/// Every Service backend referenced by the default backend and the rule paths.
pub fn service_backends(ingress: &Ingress) -> Vec<&IngressServiceBackend> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };

    let from_default = spec
        .default_backend
        .as_ref()
        .and_then(|backend| backend.service.as_ref());
    let from_rules = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .filter_map(|path| path.backend.service.as_ref());

    from_default.into_iter().chain(from_rules).collect()
}

/// Check that the Ingress has a shape the controller can program.
pub fn validate_ingress(ingress: &Ingress, class_name: &str) -> Result<(), ValidationError> {
    if !has_class(ingress, class_name) {
        return Err(ValidationError::InvalidClass);
    }

    let spec = ingress.spec.clone().unwrap_or_default();
    let rules = spec.rules.unwrap_or_default();

    if spec.default_backend.is_none() && rules.is_empty() {
        return Err(ValidationError::NoBackend);
    }

    let paths: Vec<_> = rules
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .collect();

    if rules
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .any(|http| http.paths.len() > 1)
    {
        return Err(ValidationError::MultiplePaths);
    }

    if paths
        .iter()
        .any(|path| !ALLOWED_PATHS.contains(&path.path.as_deref().unwrap_or_default()))
    {
        return Err(ValidationError::UnsupportedPath);
    }

    if paths.iter().any(|path| path.backend.service.is_none()) {
        return Err(ValidationError::PathWithoutService);
    }

    if spec
        .default_backend
        .as_ref()
        .is_some_and(|backend| backend.service.is_none())
    {
        return Err(ValidationError::DefaultBackendWithoutService);
    }

    let backends = service_backends(ingress);
    if backends.iter().any(|backend| backend.name.is_empty()) {
        return Err(ValidationError::UnnamedService);
    }

    if rules.iter().any(|rule| rule.http.is_none()) {
        return Err(ValidationError::RuleWithoutHttp);
    }

    let names: BTreeSet<&str> = backends.iter().map(|backend| backend.name.as_str()).collect();
    if names.len() > 1 {
        return Err(ValidationError::DifferentServices);
    }
    if names.is_empty() {
        return Err(ValidationError::NoBackend);
    }

    if spec.default_backend.is_some() && !rules.is_empty() {
        return Err(ValidationError::DefaultBackendAndRules);
    }

    Ok(())
}
