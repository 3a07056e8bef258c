//! # Event-Mesh Backend
//!
//! Keeps one subscription on a remote event mesh per Subscription. The remote subscription
//! delivers to the public webhook URL exposed by the Subscription's APIRule.
//!
//! Change detection works on hashes stored in `status.backend`:
//!
//! - `ev2hash`: the subscription the controller wants. A change deletes and recreates it.
//! - `eventMeshHash`: the subscription as the server returned it after creation. A change
//!   means someone edited it out of band; it is deleted and recreated as well.
//! - `webhookAuthHash`: the webhook credentials. A change pauses the subscription, patches
//!   the credentials and resumes it, without losing the subscription.

pub mod client;
pub mod rest;
pub mod types;

pub use client::{EventMeshClient, EventMeshClientError};
pub use rest::{EventMeshCredentials, EventMeshRestClient};
pub use types::{MeshEvent, MeshSubscription, StateAction, WebhookAuth};

use crate::backend::cleaner::Cleaner;
use crate::backend::{Backend, BackendError, DeliveryHealth, ResolvedType, SyncReport};
use crate::constants::{EVENT_MESH_MAX_NAME_LENGTH, EVENT_MESH_SUBJECT_SEGMENT_LIMIT};
use crate::crd::{EventMeshSubscriptionStatus, EventMeshTypes, Subscription, TypeMatching};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Length of the hash part of remote subscription names
const NAME_HASH_LENGTH: usize = 40;

/// Settings of the event-mesh backend
#[derive(Debug, Clone)]
pub struct EventMeshSettings {
    /// Prefix of every subject
    pub prefix: String,
    /// Event source registered on every remote subscription
    pub namespace: String,
    pub qos: String,
    pub content_mode: String,
    pub exempt_handshake: bool,
    /// Credentials the mesh uses to call the webhook
    pub webhook_auth: Option<WebhookAuth>,
    /// How long a subscription may stay inactive before it is reported as failed
    pub activation_timeout: Duration,
}

pub struct EventMeshBackend<C> {
    client: C,
    cleaner: Box<dyn Cleaner>,
    settings: EventMeshSettings,
}

impl<C> std::fmt::Debug for EventMeshBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMeshBackend")
            .field("prefix", &self.settings.prefix)
            .field("namespace", &self.settings.namespace)
            .finish_non_exhaustive()
    }
}

/// Deterministic remote name: up to 10 characters of the Subscription name followed by a
/// hash of its key, never longer than 50 characters
#[must_use]
pub fn mesh_subscription_name(sub: &Subscription) -> String {
    let hash = sha256_hex(sub.key().as_bytes());
    let prefix: String = sub
        .metadata
        .name
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(EVENT_MESH_MAX_NAME_LENGTH - NAME_HASH_LENGTH)
        .collect();
    format!("{prefix}{}", &hash[..NAME_HASH_LENGTH])
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn json_hash<T: serde::Serialize>(value: &T) -> Result<String, BackendError> {
    let bytes = serde_json::to_vec(value).map_err(|e| BackendError::UnexpectedStatus {
        code: 0,
        message: format!("failed to hash event-mesh subscription: {e}"),
    })?;
    Ok(sha256_hex(&bytes))
}

/// Hash over the fields the controller owns
///
/// # Errors
/// Returns an error if the subscription cannot be serialised.
pub fn subscription_hash(sub: &MeshSubscription) -> Result<String, BackendError> {
    json_hash(&sub.desired_view())
}

/// Hash of the webhook credentials, empty auth hashes like an empty object
///
/// # Errors
/// Returns an error if the credentials cannot be serialised.
pub fn webhook_auth_hash(auth: Option<&WebhookAuth>) -> Result<String, BackendError> {
    json_hash(&auth)
}

/// Failing when the last failed delivery is newer than the last successful one
#[must_use]
pub fn delivery_health(status: &EventMeshSubscriptionStatus) -> DeliveryHealth {
    let parse = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
    };
    let failed = parse(&status.last_failed_delivery);
    let succeeded = parse(&status.last_successful_delivery);
    match (failed, succeeded) {
        (Some(f), Some(s)) if f > s => DeliveryHealth::Failing(failure_reason(status)),
        (Some(_), None) => DeliveryHealth::Failing(failure_reason(status)),
        _ => DeliveryHealth::Healthy,
    }
}

fn failure_reason(status: &EventMeshSubscriptionStatus) -> String {
    status
        .last_failed_delivery_reason
        .clone()
        .unwrap_or_else(|| "webhook call failed".to_string())
}

impl<C: EventMeshClient> EventMeshBackend<C> {
    pub fn new(client: C, cleaner: Box<dyn Cleaner>, settings: EventMeshSettings) -> Self {
        Self {
            client,
            cleaner,
            settings,
        }
    }

    /// Remote subscription the controller wants for `sub`
    fn desired_subscription(
        &self,
        name: &str,
        resolved: &[ResolvedType],
        webhook_url: &str,
    ) -> MeshSubscription {
        MeshSubscription {
            name: name.to_string(),
            events: resolved
                .iter()
                .map(|r| MeshEvent {
                    source: self.settings.namespace.clone(),
                    type_: r.subject.clone(),
                })
                .collect(),
            webhook_url: webhook_url.to_string(),
            webhook_auth: self.settings.webhook_auth.clone(),
            qos: self.settings.qos.clone(),
            exempt_handshake: self.settings.exempt_handshake,
            content_mode: self.settings.content_mode.clone(),
            ..MeshSubscription::default()
        }
    }

    async fn delete_remote(&self, name: &str) -> Result<(), BackendError> {
        let existed = self.client.delete(name).await?;
        metrics::increment_backend_operations(self.name(), "delete");
        if existed {
            info!(subscription = name, "Deleted event-mesh subscription");
        } else {
            debug!(subscription = name, "Event-mesh subscription already absent");
        }
        Ok(())
    }

    async fn create_and_get(&self, desired: &MeshSubscription) -> Result<MeshSubscription, BackendError> {
        self.client.create(desired).await?;
        metrics::increment_backend_operations(self.name(), "create");
        info!(subscription = desired.name.as_str(), "Created event-mesh subscription");
        self.client
            .get(&desired.name)
            .await?
            .ok_or_else(|| BackendError::MissingSubscription {
                subject: desired.name.clone(),
            })
    }

    /// Pause, patch the credentials, resume
    async fn rotate_webhook_auth(&self, desired: &MeshSubscription) -> Result<(), BackendError> {
        let name = desired.name.as_str();
        let Some(auth) = desired.webhook_auth.as_ref() else {
            return Ok(());
        };
        debug!(subscription = name, "Pausing event-mesh subscription");
        if !self.client.update_state(name, StateAction::Pause).await? {
            warn!(subscription = name, "Cannot pause event-mesh subscription: not found");
            return Ok(());
        }
        debug!(subscription = name, "Updating webhook auth of event-mesh subscription");
        if !self.client.update_webhook_auth(name, auth).await? {
            warn!(subscription = name, "Cannot update webhook auth: subscription not found");
            return Ok(());
        }
        debug!(subscription = name, "Resuming event-mesh subscription");
        if !self.client.update_state(name, StateAction::Resume).await? {
            warn!(subscription = name, "Cannot resume event-mesh subscription: not found");
            return Ok(());
        }
        metrics::increment_backend_operations(self.name(), "update_webhook_auth");
        info!(subscription = name, "Rotated webhook auth of event-mesh subscription");
        Ok(())
    }

    /// Track how long the remote subscription has been inactive
    fn check_activation(&self, sub: &mut Subscription, active: bool) -> Result<(), BackendError> {
        let backend = &mut sub.status_mut().backend;
        if active {
            backend.failed_activation = None;
            return Ok(());
        }
        let now = Utc::now();
        let since = backend
            .failed_activation
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc));
        match since {
            None => {
                backend.failed_activation = Some(now.to_rfc3339());
                Ok(())
            }
            Some(since) => {
                let elapsed = (now - since).to_std().unwrap_or_default();
                if elapsed > self.settings.activation_timeout {
                    Err(BackendError::ActivationTimeout(
                        self.settings.activation_timeout.as_secs(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[async_trait]
impl<C: EventMeshClient> Backend for EventMeshBackend<C> {
    fn name(&self) -> &'static str {
        "eventmesh"
    }

    fn resolve_types(&self, sub: &Subscription) -> Result<Vec<ResolvedType>, BackendError> {
        let matching = sub.spec.matching();
        sub.spec
            .unique_types()
            .into_iter()
            .map(|original_type| {
                if matching == TypeMatching::Exact {
                    return Ok(ResolvedType {
                        clean_type: original_type.clone(),
                        subject: original_type.clone(),
                        original_type,
                    });
                }
                let clean_source = self.cleaner.clean_source(&sub.spec.source)?;
                let clean_type = self.cleaner.clean_event_type(&original_type)?;
                let subject = format!("{}.{}.{}", self.settings.prefix, clean_source, clean_type);
                if subject.split('.').count() > EVENT_MESH_SUBJECT_SEGMENT_LIMIT {
                    return Err(BackendError::SubjectTooLong {
                        subject,
                        limit: EVENT_MESH_SUBJECT_SEGMENT_LIMIT,
                    });
                }
                Ok(ResolvedType {
                    original_type,
                    clean_type,
                    subject,
                })
            })
            .collect()
    }

    async fn sync_subscription(&self, sub: &mut Subscription) -> Result<SyncReport, BackendError> {
        let name = mesh_subscription_name(sub);
        let span = info_span!("eventmesh.sync", subscription = %sub.key(), remote = %name);
        async {
            let resolved = self.resolve_types(sub)?;
            let webhook_url = sub
                .status
                .as_ref()
                .and_then(|s| s.backend.external_sink.clone())
                .ok_or_else(|| BackendError::ExternalSinkUnknown(sub.key()))?;

            let desired = self.desired_subscription(&name, &resolved, &webhook_url);
            let local_hash = subscription_hash(&desired)?;
            let auth_hash = webhook_auth_hash(desired.webhook_auth.as_ref())?;
            let recorded = sub.status.clone().unwrap_or_default().backend;

            let mut server = self.client.get(&name).await?;

            // desired subscription changed since the last sync
            if recorded.ev2hash.as_deref() != Some(local_hash.as_str()) {
                if server.take().is_some() {
                    debug!("Desired event-mesh subscription changed, recreating");
                    self.delete_remote(&name).await?;
                }
                sub.status_mut().clear_event_mesh_state();
            } else if let Some(existing) = &server {
                // server copy edited out of band
                let server_hash = subscription_hash(existing)?;
                if recorded.event_mesh_hash.as_deref() != Some(server_hash.as_str()) {
                    info!("Event-mesh subscription modified on the server, recreating");
                    self.delete_remote(&name).await?;
                    server = None;
                    sub.status_mut().clear_event_mesh_state();
                } else if recorded.webhook_auth_hash.as_deref() != Some(auth_hash.as_str()) {
                    self.rotate_webhook_auth(&desired).await?;
                }
            }

            let server = match server {
                Some(existing) => existing,
                None => self.create_and_get(&desired).await?,
            };

            let ems_status = EventMeshSubscriptionStatus {
                status: server.subscription_status.clone(),
                status_reason: server.subscription_status_reason.clone(),
                last_successful_delivery: server.last_successful_delivery.clone(),
                last_failed_delivery: server.last_failed_delivery.clone(),
                last_failed_delivery_reason: server.last_failed_delivery_reason.clone(),
            };
            let delivery = delivery_health(&ems_status);
            let active = server.is_active();

            let backend = &mut sub.status_mut().backend;
            backend.ems_types = resolved
                .iter()
                .map(|r| EventMeshTypes {
                    original_type: r.original_type.clone(),
                    event_mesh_type: r.subject.clone(),
                })
                .collect();
            backend.ev2hash = Some(local_hash);
            backend.event_mesh_hash = Some(subscription_hash(&server)?);
            backend.webhook_auth_hash = Some(auth_hash);
            backend.ems_subscription_status = Some(ems_status);

            self.check_activation(sub, active)?;
            Ok::<_, BackendError>(SyncReport { active, delivery })
        }
        .instrument(span)
        .await
    }

    async fn delete_subscription(&self, sub: &Subscription) -> Result<(), BackendError> {
        self.delete_remote(&mesh_subscription_name(sub)).await
    }
}
