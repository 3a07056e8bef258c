//! # Conditions
//!
//! Condition model for Subscription status.
//!
//! Conditions are held in an ordered map keyed by [`ConditionType`], so each type
//! appears at most once and the serialised list always follows the canonical order.
//! Readiness is a pure function of the map; nothing here performs I/O.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Condition reasons written by the reconciler
pub mod reasons {
    pub const SUBSCRIPTION_CREATED: &str = "SubscriptionCreated";
    pub const SUBSCRIPTION_CREATION_FAILED: &str = "SubscriptionCreationFailed";
    pub const SUBSCRIPTION_VALIDATION_FAILED: &str = "SubscriptionValidationFailed";
    pub const SUBSCRIPTION_ACTIVE: &str = "SubscriptionActive";
    pub const SUBSCRIPTION_NOT_ACTIVE: &str = "SubscriptionNotActive";
    pub const SUBSCRIPTION_DELETED: &str = "SubscriptionDeleted";
    pub const API_RULE_CREATED: &str = "APIRuleCreated";
    pub const API_RULE_NOT_READY: &str = "APIRuleNotReady";
    pub const API_RULE_CREATION_FAILED: &str = "APIRuleCreationFailed";
    pub const SINK_NOT_VALID: &str = "SinkNotValid";
    pub const WEBHOOK_CALL_SUCCESS: &str = "WebhookCallSuccess";
    pub const WEBHOOK_CALL_FAILED: &str = "WebhookCallFailed";
    pub const PENDING: &str = "Pending";
}

/// Type of a Subscription condition
///
/// The four named variants form the canonical set. Anything else read back from the
/// API server is kept as [`ConditionType::Other`] and makes the Subscription not ready.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    Subscribed,
    SubscriptionActive,
    ApiRuleStatus,
    WebhookCallStatus,
    Other(String),
}

impl ConditionType {
    /// Canonical condition types, in status order
    pub const CANONICAL: [ConditionType; 4] = [
        ConditionType::Subscribed,
        ConditionType::SubscriptionActive,
        ConditionType::ApiRuleStatus,
        ConditionType::WebhookCallStatus,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ConditionType::Subscribed => "Subscribed",
            ConditionType::SubscriptionActive => "Subscription active",
            ConditionType::ApiRuleStatus => "APIRule status",
            ConditionType::WebhookCallStatus => "Webhook call status",
            ConditionType::Other(other) => other,
        }
    }
}

impl From<String> for ConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Subscribed" => ConditionType::Subscribed,
            "Subscription active" => ConditionType::SubscriptionActive,
            "APIRule status" => ConditionType::ApiRuleStatus,
            "Webhook call status" => ConditionType::WebhookCallStatus,
            _ => ConditionType::Other(value),
        }
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Condition represents one health signal contributing to readiness
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub type_: ConditionType,
    /// Status of condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last transition time (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine readable reason
    #[serde(default)]
    pub reason: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Field-wise equality ignoring the transition time
    #[must_use]
    pub fn equals(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Ordered set of conditions, one per type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(BTreeMap<ConditionType, Condition>);

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other) && self.last_transition_time == other.last_transition_time
    }
}

impl Conditions {
    /// Insert `Unknown` for every canonical type not yet present
    pub fn initialize(&mut self) {
        for type_ in ConditionType::CANONICAL {
            self.0
                .entry(type_.clone())
                .or_insert_with(|| Condition::new(type_, ConditionStatus::Unknown, "", ""));
        }
    }

    /// True iff the set is exactly the canonical set and every condition is `True`
    #[must_use]
    pub fn is_ready(&self) -> bool {
        if self.0.len() != ConditionType::CANONICAL.len() {
            return false;
        }
        ConditionType::CANONICAL.iter().all(|type_| {
            self.0
                .get(type_)
                .is_some_and(|c| c.status == ConditionStatus::True)
        })
    }

    #[must_use]
    pub fn find(&self, type_: &ConditionType) -> Option<&Condition> {
        self.0.get(type_)
    }

    /// Replace the condition of the same type.
    ///
    /// Returns true when status, reason or message changed. The previous transition
    /// time is kept when the status itself did not change.
    pub fn set(&mut self, mut condition: Condition) -> bool {
        match self.0.get(&condition.type_) {
            Some(existing) if existing.equals(&condition) => false,
            Some(existing) => {
                if existing.status == condition.status {
                    condition
                        .last_transition_time
                        .clone_from(&existing.last_transition_time);
                }
                self.0.insert(condition.type_.clone(), condition);
                true
            }
            None => {
                self.0.insert(condition.type_.clone(), condition);
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Order-insensitive comparison of two condition sets, ignoring transition times
#[must_use]
pub fn conditions_equal(a: &Conditions, b: &Conditions) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|ca| b.find(&ca.type_).is_some_and(|cb| ca.equals(cb)))
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        Self(list.into_iter().map(|c| (c.type_.clone(), c)).collect())
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self(iter.into_iter().map(|c| (c.type_.clone(), c)).collect())
    }
}

impl Serialize for Conditions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Condition>::deserialize(deserializer).map(Conditions::from)
    }
}
