//! # Sink Validator
//!
//! Resolves a Subscription's sink URL to the cluster-local service it points at and checks
//! that the service exists.
//!
//! A missing service is most likely a user error and is reported on the Subscription.
//! A failed lookup is an infrastructure error and is retried.

use crate::constants::CLUSTER_LOCAL_URL_SUFFIX;
use crate::crd::Subscription;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink URL {url} is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("sink {url} is not a valid cluster-local service: service {namespace}/{name} not found")]
    NotFound {
        url: String,
        namespace: String,
        name: String,
    },
    #[error("failed to look up sink service {namespace}/{name}: {reason}")]
    LookupFailed {
        namespace: String,
        name: String,
        reason: String,
    },
}

impl SinkError {
    /// Only lookups against the registry are worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::LookupFailed { .. })
    }
}

/// The subscriber service a sink URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    /// URL path, `/` when empty
    pub path: String,
}

/// Parse `<scheme>://<service>.<namespace>.svc.cluster.local[:port][/path]`
///
/// # Errors
/// Returns [`SinkError::InvalidUrl`] when the URL does not name a cluster-local service.
pub fn parse_sink(sink: &str) -> Result<SinkTarget, SinkError> {
    let invalid = |reason: &str| SinkError::InvalidUrl {
        url: sink.to_string(),
        reason: reason.to_string(),
    };
    let url = url::Url::parse(sink).map_err(|e| invalid(&e.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let prefix = host
        .strip_suffix(CLUSTER_LOCAL_URL_SUFFIX)
        .and_then(|p| p.strip_suffix('.'))
        .ok_or_else(|| invalid("host is not a cluster-local service"))?;
    let (name, namespace) = prefix
        .split_once('.')
        .filter(|(name, namespace)| !name.is_empty() && !namespace.is_empty() && !namespace.contains('.'))
        .ok_or_else(|| invalid("host must be <service>.<namespace>.svc.cluster.local"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;
    let path = if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    };
    Ok(SinkTarget {
        name: name.to_string(),
        namespace: namespace.to_string(),
        port,
        path,
    })
}

/// Cluster-local service lookup
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// # Errors
    /// Returns [`SinkError::LookupFailed`] when the registry cannot be queried.
    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, SinkError>;
}

/// Looks up `core/v1` Services
#[derive(Clone)]
pub struct KubeServiceRegistry {
    client: Client,
}

impl std::fmt::Debug for KubeServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeServiceRegistry").finish_non_exhaustive()
    }
}

impl KubeServiceRegistry {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceRegistry for KubeServiceRegistry {
    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, SinkError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map(|svc| svc.is_some())
            .map_err(|e| SinkError::LookupFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Validate the sink of `sub` against the registry
///
/// # Errors
/// [`SinkError::InvalidUrl`] or [`SinkError::NotFound`] for user errors,
/// [`SinkError::LookupFailed`] when the registry is unavailable.
pub async fn validate_sink(
    registry: &dyn ServiceRegistry,
    sub: &Subscription,
) -> Result<SinkTarget, SinkError> {
    let target = parse_sink(&sub.spec.sink)?;
    if !registry.service_exists(&target.namespace, &target.name).await? {
        return Err(SinkError::NotFound {
            url: sub.spec.sink.clone(),
            namespace: target.namespace,
            name: target.name,
        });
    }
    debug!(
        service = target.name.as_str(),
        namespace = target.namespace.as_str(),
        "Sink service found"
    );
    Ok(target)
}
