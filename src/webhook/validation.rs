//! # Validation
//!
//! Structural validation of a Subscription before it is persisted.
//! Every independently checkable field group is validated and all errors are
//! returned together.

use crate::constants::{
    CLUSTER_LOCAL_URL_SUFFIX, MAX_IN_FLIGHT_MESSAGES_KEY, MIN_EVENT_TYPE_SEGMENTS,
    RESERVED_TYPE_PREFIX, SINK_HOST_SEGMENTS,
};
use crate::crd::{Subscription, TypeMatching};
use crate::webhook::error::{FieldError, ValidationError};
use std::collections::HashSet;

pub const SOURCE_PATH: &str = "spec.source";
pub const TYPES_PATH: &str = "spec.types";
pub const CONFIG_PATH: &str = "spec.config";
pub const SINK_PATH: &str = "spec.sink";
pub const NAMESPACE_PATH: &str = "metadata.namespace";

pub const EMPTY_ERR_DETAIL: &str = "must not be empty";
pub const DUPLICATE_TYPES_ERR_DETAIL: &str = "must not have duplicate types";
pub const LENGTH_ERR_DETAIL: &str = "must not be of length zero";
pub const MISSING_SCHEME_ERR_DETAIL: &str = "must have URL scheme 'http' or 'https'";

/// Validate a Subscription, collecting errors from every field group
///
/// # Errors
/// Returns a [`ValidationError`] listing every field error found.
pub fn validate_subscription(sub: &Subscription) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    let name = sub.metadata.name.clone().unwrap_or_default();

    if let Some(e) = validate_source(sub, &name) {
        errors.push(e);
    }
    if let Some(e) = validate_types(sub, &name) {
        errors.push(e);
    }
    if let Some(e) = validate_config(sub, &name) {
        errors.push(e);
    }
    if let Some(e) = validate_sink(sub, &name) {
        errors.push(e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(name, errors))
    }
}

/// Source must be set unless types are matched exactly
#[must_use]
pub fn validate_source(sub: &Subscription, name: &str) -> Option<FieldError> {
    (sub.spec.source.is_empty() && sub.spec.matching() != TypeMatching::Exact)
        .then(|| FieldError::new(SOURCE_PATH, name, EMPTY_ERR_DETAIL))
}

#[must_use]
pub fn validate_types(sub: &Subscription, name: &str) -> Option<FieldError> {
    let types = &sub.spec.types;
    if types.is_empty() {
        return Some(FieldError::new(TYPES_PATH, name, EMPTY_ERR_DETAIL));
    }

    let unique: HashSet<&str> = types.iter().map(String::as_str).collect();
    if unique.len() != types.len() {
        return Some(FieldError::new(TYPES_PATH, name, DUPLICATE_TYPES_ERR_DETAIL));
    }

    let exact = sub.spec.matching() == TypeMatching::Exact;
    for event_type in types {
        if event_type.is_empty() {
            return Some(FieldError::new(TYPES_PATH, name, LENGTH_ERR_DETAIL));
        }
        if event_type.split('.').count() < MIN_EVENT_TYPE_SEGMENTS {
            return Some(FieldError::new(
                TYPES_PATH,
                name,
                format!("must have minimum {MIN_EVENT_TYPE_SEGMENTS} segments"),
            ));
        }
        if !exact && event_type.starts_with(RESERVED_TYPE_PREFIX) {
            return Some(FieldError::new(
                TYPES_PATH,
                name,
                format!("must not have {RESERVED_TYPE_PREFIX} as type prefix"),
            ));
        }
    }
    None
}

#[must_use]
pub fn validate_config(sub: &Subscription, name: &str) -> Option<FieldError> {
    match sub.spec.max_in_flight_messages() {
        Some(Err(_)) => Some(FieldError::new(
            CONFIG_PATH,
            name,
            format!("{MAX_IN_FLIGHT_MESSAGES_KEY} must be a stringified int value"),
        )),
        _ => None,
    }
}

#[must_use]
pub fn validate_sink(sub: &Subscription, name: &str) -> Option<FieldError> {
    let sink = sub.spec.sink.as_str();
    if sink.is_empty() {
        return Some(FieldError::new(SINK_PATH, name, EMPTY_ERR_DETAIL));
    }

    let url = match url::Url::parse(sink) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Some(FieldError::new(SINK_PATH, name, MISSING_SCHEME_ERR_DETAIL));
        }
        Err(e) => {
            return Some(FieldError::new(
                SINK_PATH,
                name,
                format!("failed to parse subscription sink URL: {e}"),
            ));
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Some(FieldError::new(SINK_PATH, name, MISSING_SCHEME_ERR_DETAIL));
    }

    let host = url.host_str().unwrap_or_default();
    let cluster_local = host
        .strip_suffix(CLUSTER_LOCAL_URL_SUFFIX)
        .is_some_and(|rest| rest.ends_with('.'));
    if !cluster_local {
        return Some(FieldError::new(
            SINK_PATH,
            name,
            format!("must have valid sink URL suffix {CLUSTER_LOCAL_URL_SUFFIX}"),
        ));
    }

    let segments: Vec<&str> = host.split('.').collect();
    if segments.len() != SINK_HOST_SEGMENTS {
        return Some(FieldError::new(
            SINK_PATH,
            name,
            format!("must have sink URL with {SINK_HOST_SEGMENTS} sub-domains: {host}"),
        ));
    }

    let namespace = sub.metadata.namespace.as_deref().unwrap_or_default();
    if segments[1] != namespace {
        return Some(FieldError::new(
            NAMESPACE_PATH,
            name,
            format!("must match subscription namespace:{namespace}"),
        ));
    }
    None
}
