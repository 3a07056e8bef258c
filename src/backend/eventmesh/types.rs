//! Wire types of the event-mesh subscription API

use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: &str = "Active";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSubscription {
    pub name: String,
    #[serde(default)]
    pub events: Vec<MeshEvent>,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_auth: Option<WebhookAuth>,
    #[serde(default)]
    pub qos: String,
    #[serde(default)]
    pub exempt_handshake: bool,
    #[serde(default)]
    pub content_mode: String,
    /// Server side fields below are never sent on create
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subscription_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_delivery_reason: Option<String>,
}

impl MeshSubscription {
    /// Copy holding only the fields the controller sets, without credentials
    #[must_use]
    pub fn desired_view(&self) -> MeshSubscription {
        MeshSubscription {
            name: self.name.clone(),
            events: self.events.clone(),
            webhook_url: self.webhook_url.clone(),
            webhook_auth: None,
            qos: self.qos.clone(),
            exempt_handshake: self.exempt_handshake,
            content_mode: self.content_mode.clone(),
            ..MeshSubscription::default()
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription_status == STATUS_ACTIVE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshEvent {
    pub source: String,
    #[serde(rename = "type")]
    pub type_: String,
}

/// OAuth2 client credentials the event mesh uses to call the webhook
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAuth {
    #[serde(rename = "type")]
    pub type_: String,
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("type_", &self.type_)
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("token_url", &self.token_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateRequest {
    pub action: StateAction,
}
