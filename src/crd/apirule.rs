//! # APIRule
//!
//! HTTP routing resource exposing a subscriber service to webhook delivery.
//! One APIRule is shared by every Subscription whose sink resolves to the same
//! service and port; each contributing Subscription is listed as an owner.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status code the gateway reports once the route is programmed
pub const API_RULE_STATUS_OK: &str = "OK";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "APIRule",
    group = "gateway.octopilot.io",
    version = "v1beta1",
    namespaced,
    status = "ApiRuleStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.APIRuleStatus.code"}, {"name":"Host", "type":"string", "jsonPath":".spec.host"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApiRuleSpec {
    /// Gateway the route is attached to
    pub gateway: String,
    /// Public host name
    pub host: String,
    /// Backing service
    pub service: RuleService,
    /// One rule per distinct sink path
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleService {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub path: String,
    pub methods: Vec<String>,
    #[serde(default)]
    pub access_strategies: Vec<Authenticator>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Authenticator {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AuthenticatorConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorConfig {
    #[serde(default)]
    pub jwks_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiRuleStatus {
    #[serde(default, rename = "APIRuleStatus", skip_serializing_if = "Option::is_none")]
    pub api_rule_status: Option<StatusCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct StatusCode {
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl APIRule {
    /// True once the gateway reports the route as programmed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.api_rule_status.as_ref())
            .is_some_and(|s| s.code == API_RULE_STATUS_OK)
    }

    /// Paths served by this rule
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.spec.rules.iter().map(|r| r.path.as_str())
    }
}
