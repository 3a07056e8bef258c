//! # Subscription
//!
//! The reconciled resource: one subscriber's interest in a set of event types,
//! delivered to a cluster-local sink.

use crate::crd::condition::{Condition, ConditionStatus, ConditionType, Conditions};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subscription Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: eventing.octopilot.io/v1alpha2
/// kind: Subscription
/// metadata:
///   name: order-created
///   namespace: shop
/// spec:
///   sink: http://order-handler.shop.svc.cluster.local/events
///   source: commerce
///   types:
///     - order.created.v1
///   config:
///     maxInFlightMessages: "20"
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Subscription",
    group = "eventing.octopilot.io",
    version = "v1alpha2",
    namespaced,
    status = "SubscriptionStatus",
    shortname = "esub",
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Optional unique identifier of the Subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// URL of the cluster-local service receiving events
    pub sink: String,
    /// How event types are matched: `standard` (cleaned and prefixed) or `exact`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_matching: Option<TypeMatching>,
    /// Origin of the events
    #[serde(default)]
    pub source: String,
    /// Event types to subscribe to
    #[serde(default)]
    pub types: Vec<String>,
    /// Free-form backend settings such as `maxInFlightMessages`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TypeMatching {
    #[default]
    Standard,
    Exact,
}

impl SubscriptionSpec {
    /// Effective matching mode; an unset mode behaves as `standard`
    #[must_use]
    pub fn matching(&self) -> TypeMatching {
        self.type_matching.unwrap_or_default()
    }

    /// Event types with duplicates removed, first occurrence wins
    #[must_use]
    pub fn unique_types(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.types
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }

    /// Parsed `maxInFlightMessages`, if set
    pub fn max_in_flight_messages(&self) -> Option<Result<i64, std::num::ParseIntError>> {
        self.config
            .get(crate::constants::MAX_IN_FLIGHT_MESSAGES_KEY)
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<i64>())
    }
}

/// Status of the Subscription resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// Latest observations, one per condition type
    #[serde(default)]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: Conditions,
    /// True when every canonical condition is True
    #[serde(default)]
    pub ready: bool,
    /// Resolved event types
    #[serde(default)]
    pub types: Vec<EventType>,
    /// Backend specific state, owned by the active backend
    #[serde(default)]
    pub backend: BackendStatus,
}

/// An event type as authored and as normalised for the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub original_type: String,
    pub clean_type: String,
}

/// Backend sub-status
///
/// Stream fields and event-mesh fields share one struct; each backend only touches its own.
/// Every field is serialised, `None` as `null`, so a merge patch clears what was unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    /// Stream backend: consumer per type
    #[serde(default)]
    pub types: Vec<StreamTypes>,
    /// Event-mesh backend: processed subject per type
    #[serde(default)]
    pub ems_types: Vec<EventMeshTypes>,
    /// Hash of the desired event-mesh subscription
    #[serde(default)]
    pub ev2hash: Option<String>,
    /// Hash of the event-mesh subscription as returned by the server
    #[serde(default)]
    pub event_mesh_hash: Option<String>,
    /// Hash of the webhook auth configuration last pushed to the event mesh
    #[serde(default)]
    pub webhook_auth_hash: Option<String>,
    /// Server side subscription state
    #[serde(default)]
    pub ems_subscription_status: Option<EventMeshSubscriptionStatus>,
    /// First time the event-mesh subscription was observed inactive (RFC3339)
    #[serde(default)]
    pub failed_activation: Option<String>,
    /// Public URL the backend delivers to
    #[serde(default)]
    pub external_sink: Option<String>,
    /// APIRule currently exposing the sink
    #[serde(default)]
    pub api_rule_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamTypes {
    pub original_type: String,
    pub consumer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMeshTypes {
    pub original_type: String,
    pub event_mesh_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMeshSubscriptionStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_delivery_reason: Option<String>,
}

impl SubscriptionStatus {
    /// Ensure every canonical condition type is present
    pub fn initialize_conditions(&mut self) {
        self.conditions.initialize();
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.conditions.is_ready()
    }

    /// True when the stored `ready` flag disagrees with the conditions
    #[must_use]
    pub fn should_update_ready_status(&self) -> bool {
        self.ready != self.is_ready()
    }

    /// Set one condition and recompute `ready`. Returns true when the condition changed.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        let changed = self
            .conditions
            .set(Condition::new(type_, status, reason, message));
        self.ready = self.is_ready();
        changed
    }

    /// Forget the recorded event-mesh state once the remote subscription is replaced
    pub fn clear_event_mesh_state(&mut self) {
        self.backend.ems_types.clear();
        self.backend.ev2hash = None;
        self.backend.event_mesh_hash = None;
        self.backend.webhook_auth_hash = None;
        self.backend.ems_subscription_status = None;
        self.backend.failed_activation = None;
    }
}

impl Subscription {
    /// `namespace/name` key used for logs, hashing and per-resource state
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut SubscriptionStatus {
        self.status.get_or_insert_with(SubscriptionStatus::default)
    }
}
