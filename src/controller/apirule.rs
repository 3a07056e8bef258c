//! # APIRule Manager
//!
//! Exposes subscriber services to webhook delivery through shared APIRules.
//!
//! One APIRule exists per subscriber service and port. Every Subscription whose sink resolves
//! to that service is an owner of the rule and contributes its sink path. Owners and paths are
//! recomputed from the live Subscriptions on every write, so applying the same change twice,
//! or again after a conflict, gives the same result. The rule is deleted once no owner is left.

use crate::constants::{
    CONTROLLER_NAME, LABEL_MANAGED_BY, LABEL_SERVICE_NAME, LABEL_SERVICE_PORT, MAX_CONFLICT_RETRIES,
    WEBHOOK_AUTH_HANDLER, WEBHOOK_METHODS,
};
use crate::controller::sink::{parse_sink, SinkTarget};
use crate::controller::store::{StoreError, SubscriptionStore};
use crate::crd::{
    ApiRuleSpec, Authenticator, AuthenticatorConfig, Rule, RuleService, Subscription, APIRule,
};
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::{Api, Client, Resource};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("APIRule {0} was modified concurrently")]
    Conflict(String),
    #[error("APIRule {name} still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted { name: String, attempts: usize },
    #[error("cluster API error: {0}")]
    Api(String),
}

impl From<StoreError> for RouteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => RouteError::Conflict(key),
            other => RouteError::Api(other.to_string()),
        }
    }
}

/// Storage of APIRules
#[async_trait]
pub trait ApiRuleStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<APIRule>, RouteError>;

    /// Rules in `namespace` carrying every label in `labels`
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<APIRule>, RouteError>;

    /// Fails with [`RouteError::Conflict`] when the rule already exists
    async fn create(&self, rule: &APIRule) -> Result<APIRule, RouteError>;

    /// Fails with [`RouteError::Conflict`] when `rule` carries a stale resourceVersion
    async fn replace(&self, rule: &APIRule) -> Result<APIRule, RouteError>;

    /// Absence is success
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), RouteError>;
}

#[derive(Clone)]
pub struct KubeApiRuleStore {
    client: Client,
}

impl std::fmt::Debug for KubeApiRuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApiRuleStore").finish_non_exhaustive()
    }
}

impl KubeApiRuleStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<APIRule> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_kube_error(name: &str, err: kube::Error) -> RouteError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 => RouteError::Conflict(name.to_string()),
        other => RouteError::Api(other.to_string()),
    }
}

fn rule_name_of(rule: &APIRule) -> &str {
    rule.metadata.name.as_deref().unwrap_or("unknown")
}

fn rule_namespace_of(rule: &APIRule) -> &str {
    rule.metadata.namespace.as_deref().unwrap_or("default")
}

#[async_trait]
impl ApiRuleStore for KubeApiRuleStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<APIRule>, RouteError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(name, e))
    }

    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<APIRule>, RouteError> {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        self.api(namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map(|list| list.items)
            .map_err(|e| map_kube_error(namespace, e))
    }

    async fn create(&self, rule: &APIRule) -> Result<APIRule, RouteError> {
        let pp = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        };
        self.api(rule_namespace_of(rule))
            .create(&pp, rule)
            .await
            .map_err(|e| map_kube_error(rule_name_of(rule), e))
    }

    async fn replace(&self, rule: &APIRule) -> Result<APIRule, RouteError> {
        let pp = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        };
        self.api(rule_namespace_of(rule))
            .replace(rule_name_of(rule), &pp, rule)
            .await
            .map_err(|e| map_kube_error(rule_name_of(rule), e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), RouteError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error(name, e)),
        }
    }
}

/// Settings applied to every generated APIRule
#[derive(Debug, Clone)]
pub struct RouteSettings {
    /// Domain public hosts are created under
    pub domain: String,
    pub gateway: String,
    /// JWKS URL of the webhook access strategy; no URL is configured when empty
    pub jwks_url: String,
}

/// Result of a successful sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStatus {
    pub name: String,
    pub external_sink: String,
    pub ready: bool,
}

fn service_hash(target: &SinkTarget) -> String {
    let digest = format!(
        "{:x}",
        md5::compute(format!("{}/{}/{}", target.namespace, target.name, target.port))
    );
    digest[..10].to_string()
}

/// `webhook-<hash>` for the service and port
#[must_use]
pub fn route_name(target: &SinkTarget) -> String {
    format!("webhook-{}", service_hash(target))
}

fn route_labels(target: &SinkTarget) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_SERVICE_NAME.to_string(), target.name.clone()),
        (LABEL_SERVICE_PORT.to_string(), target.port.to_string()),
    ])
}

fn owner_reference(sub: &Subscription) -> Option<OwnerReference> {
    let uid = sub.metadata.uid.clone()?;
    Some(OwnerReference {
        api_version: Subscription::api_version(&()).to_string(),
        kind: Subscription::kind(&()).to_string(),
        name: sub.metadata.name.clone().unwrap_or_default(),
        uid,
        controller: Some(false),
        block_owner_deletion: Some(false),
    })
}

/// The Subscription is live and its sink resolves to `target`
fn targets(sub: &Subscription, target: &SinkTarget) -> Option<String> {
    if sub.metadata.deletion_timestamp.is_some() {
        return None;
    }
    let parsed = parse_sink(&sub.spec.sink).ok()?;
    (parsed.name == target.name
        && parsed.namespace == target.namespace
        && parsed.port == target.port)
        .then_some(parsed.path)
}

pub struct ApiRuleManager {
    rules: Arc<dyn ApiRuleStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    settings: RouteSettings,
}

impl std::fmt::Debug for ApiRuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRuleManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ApiRuleManager {
    pub fn new(
        rules: Arc<dyn ApiRuleStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        settings: RouteSettings,
    ) -> Self {
        Self {
            rules,
            subscriptions,
            settings,
        }
    }

    /// Public host of the rule for `target`
    #[must_use]
    pub fn host(&self, target: &SinkTarget) -> String {
        format!("web-{}.{}", service_hash(target), self.settings.domain)
    }

    /// URL the backend delivers to once the rule is programmed
    #[must_use]
    pub fn external_sink(&self, target: &SinkTarget) -> String {
        format!("https://{}{}", self.host(target), target.path)
    }

    fn rule_for_path(&self, path: &str) -> Rule {
        let jwks_urls = if self.settings.jwks_url.is_empty() {
            Vec::new()
        } else {
            vec![self.settings.jwks_url.clone()]
        };
        Rule {
            path: path.to_string(),
            methods: WEBHOOK_METHODS.iter().map(ToString::to_string).collect(),
            access_strategies: vec![Authenticator {
                handler: WEBHOOK_AUTH_HANDLER.to_string(),
                config: Some(AuthenticatorConfig { jwks_urls }),
            }],
        }
    }

    fn desired_spec(&self, target: &SinkTarget, paths: &BTreeSet<String>) -> ApiRuleSpec {
        ApiRuleSpec {
            gateway: self.settings.gateway.clone(),
            host: self.host(target),
            service: RuleService {
                name: target.name.clone(),
                namespace: Some(target.namespace.clone()),
                port: target.port,
            },
            rules: paths.iter().map(|p| self.rule_for_path(p)).collect(),
        }
    }

    /// Owners and paths of the rule, recomputed from the live Subscriptions
    ///
    /// `include` is counted as an owner even when not yet listed; `exclude` never is.
    async fn membership(
        &self,
        target: &SinkTarget,
        existing_owners: &[OwnerReference],
        include: Option<&Subscription>,
        exclude: Option<&str>,
    ) -> Result<(Vec<OwnerReference>, BTreeSet<String>), RouteError> {
        let peers = self.subscriptions.list(&target.namespace).await?;
        let mut candidate_uids: BTreeSet<String> =
            existing_owners.iter().map(|o| o.uid.clone()).collect();
        if let Some(sub) = include {
            if let Some(uid) = &sub.metadata.uid {
                candidate_uids.insert(uid.clone());
            }
        }

        let mut owners = Vec::new();
        let mut paths = BTreeSet::new();
        let mut consider = |sub: &Subscription| {
            let Some(uid) = sub.metadata.uid.as_deref() else {
                return;
            };
            if exclude == Some(uid) || !candidate_uids.contains(uid) {
                return;
            }
            if owners.iter().any(|o: &OwnerReference| o.uid == uid) {
                return;
            }
            if let (Some(path), Some(owner)) = (targets(sub, target), owner_reference(sub)) {
                paths.insert(path);
                owners.push(owner);
            }
        };
        // the caller's copy is newer than the listed one
        if let Some(sub) = include {
            consider(sub);
        }
        for peer in &peers {
            consider(peer);
        }
        owners.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok((owners, paths))
    }

    /// Create or merge the rule exposing the sink of `sub`
    ///
    /// # Errors
    /// [`RouteError::ConflictRetriesExhausted`] when concurrent writers keep winning,
    /// [`RouteError::Api`] for cluster API failures.
    pub async fn sync(&self, sub: &Subscription, target: &SinkTarget) -> Result<RouteStatus, RouteError> {
        let name = route_name(target);
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            match self.try_sync(sub, target, &name).await {
                Err(RouteError::Conflict(_)) => {
                    debug!(apirule = name.as_str(), attempt, "APIRule conflict, retrying");
                }
                other => return other,
            }
        }
        Err(RouteError::ConflictRetriesExhausted {
            name,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn try_sync(
        &self,
        sub: &Subscription,
        target: &SinkTarget,
        name: &str,
    ) -> Result<RouteStatus, RouteError> {
        let existing = self
            .rules
            .list(&target.namespace, &route_labels(target))
            .await?
            .into_iter()
            .next();
        let existing_owners = existing
            .as_ref()
            .and_then(|r| r.metadata.owner_references.clone())
            .unwrap_or_default();
        let (owners, paths) = self
            .membership(target, &existing_owners, Some(sub), None)
            .await?;
        let spec = self.desired_spec(target, &paths);
        let external_sink = self.external_sink(target);

        let Some(mut current) = existing else {
            let mut labels = route_labels(target);
            labels.insert(LABEL_MANAGED_BY.to_string(), CONTROLLER_NAME.to_string());
            let rule = APIRule {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(target.namespace.clone()),
                    labels: Some(labels),
                    owner_references: Some(owners),
                    ..ObjectMeta::default()
                },
                spec,
                status: None,
            };
            let created = self.rules.create(&rule).await?;
            metrics::increment_apirule_operations("create");
            info!(apirule = name, host = created.spec.host.as_str(), "Created APIRule");
            return Ok(RouteStatus {
                name: name.to_string(),
                external_sink,
                ready: created.is_ready(),
            });
        };

        let current_name = rule_name_of(&current).to_string();
        let mut current_owners = existing_owners;
        current_owners.sort_by(|a, b| a.uid.cmp(&b.uid));
        if current.spec != spec || current_owners != owners {
            current.spec = spec;
            current.metadata.owner_references = Some(owners);
            current = self.rules.replace(&current).await?;
            metrics::increment_apirule_operations("update");
            info!(apirule = current_name.as_str(), "Updated APIRule");
        }
        Ok(RouteStatus {
            name: current_name,
            external_sink,
            ready: current.is_ready(),
        })
    }

    /// Drop `sub` from the rule named `name`; delete the rule once nobody uses it
    ///
    /// # Errors
    /// [`RouteError::ConflictRetriesExhausted`] when concurrent writers keep winning,
    /// [`RouteError::Api`] for cluster API failures.
    pub async fn release(&self, sub: &Subscription, name: &str) -> Result<(), RouteError> {
        let namespace = sub.metadata.namespace.as_deref().unwrap_or("default");
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            match self.try_release(sub, namespace, name).await {
                Err(RouteError::Conflict(_)) => {
                    debug!(apirule = name, attempt, "APIRule conflict, retrying");
                }
                other => return other,
            }
        }
        Err(RouteError::ConflictRetriesExhausted {
            name: name.to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn try_release(&self, sub: &Subscription, namespace: &str, name: &str) -> Result<(), RouteError> {
        let Some(mut current) = self.rules.get(namespace, name).await? else {
            debug!(apirule = name, "APIRule already gone");
            return Ok(());
        };
        let target = SinkTarget {
            name: current.spec.service.name.clone(),
            namespace: current
                .spec
                .service
                .namespace
                .clone()
                .unwrap_or_else(|| namespace.to_string()),
            port: current.spec.service.port,
            path: String::new(),
        };
        let mut existing_owners = current.metadata.owner_references.clone().unwrap_or_default();
        let (owners, paths) = self
            .membership(&target, &existing_owners, None, sub.metadata.uid.as_deref())
            .await?;

        if owners.is_empty() {
            self.rules.delete(namespace, name).await?;
            metrics::increment_apirule_operations("delete");
            info!(apirule = name, "Deleted APIRule without owners");
            return Ok(());
        }

        existing_owners.sort_by(|a, b| a.uid.cmp(&b.uid));
        let spec = self.desired_spec(&target, &paths);
        if current.spec != spec || existing_owners != owners {
            current.spec = spec;
            current.metadata.owner_references = Some(owners);
            self.rules.replace(&current).await?;
            metrics::increment_apirule_operations("update");
            info!(
                apirule = name,
                subscription = %sub.key(),
                "Removed subscription from APIRule"
            );
        } else {
            warn!(apirule = name, subscription = %sub.key(), "Subscription was not an owner of APIRule");
        }
        Ok(())
    }
}
