//! # Subscription Store
//!
//! Reads and writes of Subscriptions against the cluster API.
//!
//! Every write carries the resourceVersion the change was computed from, so a concurrent
//! writer makes it fail with a conflict instead of being overwritten.

use crate::constants::CONTROLLER_NAME;
use crate::crd::{Subscription, SubscriptionStatus};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription {0} not found")]
    NotFound(String),
    #[error("subscription {0} was modified concurrently")]
    Conflict(String),
    #[error("cluster API error: {0}")]
    Api(String),
}

impl StoreError {
    fn from_kube(key: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(key.to_string()),
            kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(key.to_string()),
            other => StoreError::Api(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Latest version, `None` when the Subscription is gone
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Subscription>, StoreError>;

    /// Every Subscription in `namespace`
    async fn list(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError>;

    /// Write `metadata.finalizers` of `sub`
    async fn update_finalizers(&self, sub: &Subscription) -> Result<Subscription, StoreError>;

    /// Write the status subresource of `sub`
    ///
    /// `previous` is the status the change was computed from; fields it has and the new
    /// status lacks are cleared.
    async fn update_status(
        &self,
        sub: &Subscription,
        previous: Option<&SubscriptionStatus>,
    ) -> Result<Subscription, StoreError>;
}

#[derive(Clone)]
pub struct KubeSubscriptionStore {
    client: Client,
}

impl std::fmt::Debug for KubeSubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSubscriptionStore").finish_non_exhaustive()
    }
}

impl KubeSubscriptionStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Subscription> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// JSON merge patch turning `previous` into `current`
///
/// Optional fields are skipped when empty, so a field cleared since `previous` is sent as an
/// explicit `null`; otherwise the server would keep the stale value.
///
/// # Errors
/// Returns an error when either status fails to serialize.
pub fn status_merge_patch(
    previous: Option<&SubscriptionStatus>,
    current: &SubscriptionStatus,
) -> Result<serde_json::Value, serde_json::Error> {
    let mut patch = serde_json::to_value(current)?;
    if let Some(previous) = previous {
        null_removed_fields(&serde_json::to_value(previous)?, &mut patch);
    }
    Ok(patch)
}

fn null_removed_fields(previous: &serde_json::Value, current: &mut serde_json::Value) {
    let (serde_json::Value::Object(before), serde_json::Value::Object(after)) = (previous, current)
    else {
        return;
    };
    for (key, old) in before {
        match after.get_mut(key) {
            Some(new) => null_removed_fields(old, new),
            None => {
                after.insert(key.clone(), serde_json::Value::Null);
            }
        }
    }
}

fn coordinates(sub: &Subscription) -> (&str, &str) {
    (
        sub.metadata.namespace.as_deref().unwrap_or("default"),
        sub.metadata.name.as_deref().unwrap_or("unknown"),
    )
}

#[async_trait]
impl SubscriptionStore for KubeSubscriptionStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Subscription>, StoreError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(&format!("{namespace}/{name}"), e))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError> {
        self.api(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| StoreError::from_kube(namespace, e))
    }

    async fn update_finalizers(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let (namespace, name) = coordinates(sub);
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": sub.metadata.resource_version,
                "finalizers": sub.metadata.finalizers.clone().unwrap_or_default(),
            }
        });
        self.api(namespace)
            .patch(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(patch))
            .await
            .map_err(|e| StoreError::from_kube(&sub.key(), e))
    }

    async fn update_status(
        &self,
        sub: &Subscription,
        previous: Option<&SubscriptionStatus>,
    ) -> Result<Subscription, StoreError> {
        let (namespace, name) = coordinates(sub);
        let status = match &sub.status {
            Some(current) => status_merge_patch(previous, current)
                .map_err(|e| StoreError::Api(format!("failed to serialize status: {e}")))?,
            None => serde_json::Value::Null,
        };
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": sub.metadata.resource_version,
            },
            "status": status,
        });
        self.api(namespace)
            .patch_status(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(patch))
            .await
            .map_err(|e| StoreError::from_kube(&sub.key(), e))
    }
}
