//! # Test Fakes
//!
//! In-memory stand-ins for the cluster API, the two backend servers and the event recorder,
//! plus a harness wiring them into a [`Reconciler`].
#![allow(dead_code, reason = "each test binary uses a subset of the fakes")]

use async_trait::async_trait;
use eventing_controller::backend::cleaner::CharsetCleaner;
use eventing_controller::backend::eventmesh::{
    EventMeshBackend, EventMeshClient, EventMeshClientError, EventMeshSettings, MeshSubscription,
    StateAction, WebhookAuth,
};
use eventing_controller::backend::stream::{
    ConsumerConfig, ConsumerInfo, StreamBackend, StreamClient, StreamClientError, StreamSettings,
};
use eventing_controller::backend::Backend;
use eventing_controller::config::ControllerConfig;
use eventing_controller::controller::apirule::{ApiRuleManager, ApiRuleStore, RouteError, RouteSettings};
use eventing_controller::controller::events::EventPublisher;
use eventing_controller::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use eventing_controller::controller::sink::{ServiceRegistry, SinkError};
use eventing_controller::controller::store::{status_merge_patch, StoreError, SubscriptionStore};
use eventing_controller::crd::{
    APIRule, ApiRuleStatus, StatusCode, Subscription, SubscriptionSpec, SubscriptionStatus,
};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "shop";
pub const SINK: &str = "http://orders.shop.svc.cluster.local/events";

type Key = (String, String);

/// Apply a JSON merge patch the way the cluster API does
fn apply_merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(existing) = target {
        for (key, value) in fields {
            if value.is_null() {
                existing.remove(key);
            } else {
                apply_merge_patch(
                    existing.entry(key.clone()).or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
    }
}

fn key_of(meta: &ObjectMeta) -> Key {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Decrement `counter` if it is positive
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Subscription in [`NAMESPACE`] consuming `order.created.v1` from `commerce`
pub fn subscription(name: &str, sink: &str) -> Subscription {
    let mut sub = Subscription::new(
        name,
        SubscriptionSpec {
            sink: sink.to_string(),
            source: "commerce".to_string(),
            types: vec!["order.created.v1".to_string()],
            ..SubscriptionSpec::default()
        },
    );
    sub.metadata.namespace = Some(NAMESPACE.to_string());
    sub.metadata.uid = Some(format!("uid-{name}"));
    sub
}

// ---------------------------------------------------------------------------
// Subscriptions

/// Subscription storage enforcing resourceVersion checks like the API server
#[derive(Default)]
pub struct FakeSubscriptionStore {
    objects: Mutex<BTreeMap<Key, Subscription>>,
    version: AtomicU64,
    status_conflicts: AtomicUsize,
    finalizer_conflicts: AtomicUsize,
    status_writes: AtomicUsize,
    finalizer_writes: AtomicUsize,
}

impl FakeSubscriptionStore {
    fn next_version(&self) -> Option<String> {
        Some((self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string())
    }

    pub fn insert(&self, mut sub: Subscription) -> Subscription {
        sub.metadata.resource_version = self.next_version();
        self.objects
            .lock()
            .unwrap()
            .insert(key_of(&sub.metadata), sub.clone());
        sub
    }

    pub fn stored(&self, name: &str) -> Option<Subscription> {
        self.objects.lock().unwrap().get(&key(NAMESPACE, name)).cloned()
    }

    /// Edit `spec` as a user would
    pub fn edit_spec(&self, name: &str, edit: impl FnOnce(&mut SubscriptionSpec)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let sub = objects.get_mut(&key(NAMESPACE, name)).unwrap();
        edit(&mut sub.spec);
        sub.metadata.resource_version = version;
    }

    /// Overwrite the recorded status, as a previous controller run would have left it
    pub fn edit_status(&self, name: &str, edit: impl FnOnce(&mut SubscriptionStatus)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let sub = objects.get_mut(&key(NAMESPACE, name)).unwrap();
        edit(sub.status.get_or_insert_with(SubscriptionStatus::default));
        sub.metadata.resource_version = version;
    }

    /// Stamp a deletionTimestamp as the API server does for objects with finalizers
    pub fn mark_deleted(&self, name: &str) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let sub = objects.get_mut(&key(NAMESPACE, name)).unwrap();
        let mut meta = serde_json::to_value(&sub.metadata).unwrap();
        meta["deletionTimestamp"] = serde_json::json!("2024-01-01T00:00:00Z");
        sub.metadata = serde_json::from_value(meta).unwrap();
        sub.metadata.resource_version = version;
    }

    pub fn fail_next_status_writes(&self, count: usize) {
        self.status_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_finalizer_writes(&self, count: usize) {
        self.finalizer_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn finalizer_writes(&self) -> usize {
        self.finalizer_writes.load(Ordering::SeqCst)
    }

    fn write(
        &self,
        sub: &Subscription,
        conflicts: &AtomicUsize,
        apply: impl FnOnce(&mut Subscription),
    ) -> Result<Subscription, StoreError> {
        if take_one(conflicts) {
            return Err(StoreError::Conflict(sub.key()));
        }
        let k = key_of(&sub.metadata);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&k) else {
            return Err(StoreError::NotFound(sub.key()));
        };
        if stored.metadata.resource_version != sub.metadata.resource_version {
            return Err(StoreError::Conflict(sub.key()));
        }
        apply(stored);
        stored.metadata.resource_version = self.next_version();
        let updated = stored.clone();
        // the API server drops deleted objects once their last finalizer is gone
        if updated.is_being_deleted() && updated.metadata.finalizers.as_ref().is_none_or(Vec::is_empty) {
            objects.remove(&k);
        }
        Ok(updated)
    }
}

#[async_trait]
impl SubscriptionStore for FakeSubscriptionStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self.objects.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, sub)| sub.clone())
            .collect())
    }

    async fn update_finalizers(&self, sub: &Subscription) -> Result<Subscription, StoreError> {
        let updated = self.write(sub, &self.finalizer_conflicts, |stored| {
            stored.metadata.finalizers = sub.metadata.finalizers.clone();
        })?;
        self.finalizer_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn update_status(
        &self,
        sub: &Subscription,
        previous: Option<&SubscriptionStatus>,
    ) -> Result<Subscription, StoreError> {
        let patch = match &sub.status {
            Some(current) => status_merge_patch(previous, current).unwrap(),
            None => serde_json::Value::Null,
        };
        let updated = self.write(sub, &self.status_conflicts, |stored| {
            let mut status = serde_json::to_value(&stored.status).unwrap();
            apply_merge_patch(&mut status, &patch);
            stored.status = serde_json::from_value(status).unwrap();
        })?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// APIRules

/// APIRule storage; status is owned by the gateway and survives replaces
#[derive(Default)]
pub struct FakeApiRuleStore {
    rules: Mutex<BTreeMap<Key, APIRule>>,
    version: AtomicU64,
    replace_conflicts: AtomicUsize,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    deletes: AtomicUsize,
}

impl FakeApiRuleStore {
    fn next_version(&self) -> Option<String> {
        Some((self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string())
    }

    pub fn all(&self) -> Vec<APIRule> {
        self.rules.lock().unwrap().values().cloned().collect()
    }

    pub fn rule(&self, name: &str) -> Option<APIRule> {
        self.rules.lock().unwrap().get(&key(NAMESPACE, name)).cloned()
    }

    /// Delete behind the controller's back
    pub fn remove(&self, name: &str) {
        self.rules.lock().unwrap().remove(&key(NAMESPACE, name));
    }

    /// Report the rule as programmed, as the gateway would
    pub fn mark_ready(&self, name: &str) {
        let version = self.next_version();
        let mut rules = self.rules.lock().unwrap();
        let rule = rules.get_mut(&key(NAMESPACE, name)).unwrap();
        rule.status = Some(ApiRuleStatus {
            api_rule_status: Some(StatusCode {
                code: "OK".to_string(),
                desc: None,
            }),
        });
        rule.metadata.resource_version = version;
    }

    pub fn fail_next_replaces(&self, count: usize) {
        self.replace_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.replaces() + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiRuleStore for FakeApiRuleStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<APIRule>, RouteError> {
        Ok(self.rules.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<APIRule>, RouteError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, rule)| {
                let own = rule.metadata.labels.clone().unwrap_or_default();
                labels.iter().all(|(k, v)| own.get(k) == Some(v))
            })
            .map(|(_, rule)| rule.clone())
            .collect())
    }

    async fn create(&self, rule: &APIRule) -> Result<APIRule, RouteError> {
        let k = key_of(&rule.metadata);
        let mut rules = self.rules.lock().unwrap();
        if rules.contains_key(&k) {
            return Err(RouteError::Conflict(k.1));
        }
        let mut created = rule.clone();
        created.metadata.resource_version = self.next_version();
        created.status = None;
        rules.insert(k, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn replace(&self, rule: &APIRule) -> Result<APIRule, RouteError> {
        let k = key_of(&rule.metadata);
        if take_one(&self.replace_conflicts) {
            return Err(RouteError::Conflict(k.1));
        }
        let mut rules = self.rules.lock().unwrap();
        let Some(stored) = rules.get_mut(&k) else {
            return Err(RouteError::Api(format!("APIRule {} not found", k.1)));
        };
        if stored.metadata.resource_version != rule.metadata.resource_version {
            return Err(RouteError::Conflict(k.1));
        }
        let status = stored.status.take();
        *stored = rule.clone();
        stored.status = status;
        stored.metadata.resource_version = self.next_version();
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), RouteError> {
        if self.rules.lock().unwrap().remove(&key(namespace, name)).is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Services

#[derive(Default)]
pub struct FakeServiceRegistry {
    services: Mutex<HashSet<Key>>,
    unavailable: AtomicBool,
}

impl FakeServiceRegistry {
    pub fn add(&self, namespace: &str, name: &str) {
        self.services.lock().unwrap().insert(key(namespace, name));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceRegistry for FakeServiceRegistry {
    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, SinkError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SinkError::LookupFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.services.lock().unwrap().contains(&key(namespace, name)))
    }
}

// ---------------------------------------------------------------------------
// Stream server

/// Shared handle to an in-memory stream server
#[derive(Clone, Default)]
pub struct FakeStreamClient {
    consumers: Arc<Mutex<HashMap<String, ConsumerInfo>>>,
    hidden_reads: Arc<AtomicUsize>,
    fail_deletes: Arc<AtomicBool>,
    rejected_subjects: Arc<Mutex<HashSet<String>>>,
    creates: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl FakeStreamClient {
    pub fn consumers(&self) -> Vec<ConsumerInfo> {
        self.consumers.lock().unwrap().values().cloned().collect()
    }

    /// The next `count` lookups miss, as right after a create on a lagging replica
    pub fn hide_next_reads(&self, count: usize) {
        self.hidden_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Creating a consumer filtered on a subject ending in `suffix` fails
    pub fn fail_creates_for(&self, suffix: &str) {
        self.rejected_subjects.lock().unwrap().insert(suffix.to_string());
    }

    pub fn clear_create_failures(&self) {
        self.rejected_subjects.lock().unwrap().clear();
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .consumers
            .lock()
            .unwrap()
            .values()
            .map(|c| c.filter_subject.clone())
            .collect();
        subjects.sort();
        subjects
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn store(&self, config: &ConsumerConfig) {
        self.consumers.lock().unwrap().insert(
            config.name.clone(),
            ConsumerInfo {
                name: config.name.clone(),
                filter_subject: config.filter_subject.clone(),
                max_ack_pending: config.max_ack_pending,
            },
        );
    }
}

#[async_trait]
impl StreamClient for FakeStreamClient {
    async fn consumer_info(&self, name: &str) -> Result<Option<ConsumerInfo>, StreamClientError> {
        if take_one(&self.hidden_reads) {
            return Ok(None);
        }
        Ok(self.consumers.lock().unwrap().get(name).cloned())
    }

    async fn create_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError> {
        let rejected = self
            .rejected_subjects
            .lock()
            .unwrap()
            .iter()
            .any(|suffix| config.filter_subject.ends_with(suffix.as_str()));
        if rejected {
            return Err(StreamClientError::Transport("stream unavailable".to_string()));
        }
        self.store(config);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError> {
        self.store(config);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_consumer(&self, name: &str) -> Result<bool, StreamClientError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StreamClientError::Transport("connection refused".to_string()));
        }
        Ok(self.consumers.lock().unwrap().remove(name).is_some())
    }
}

// ---------------------------------------------------------------------------
// Event-mesh server

/// Shared handle to an in-memory event-mesh management API
#[derive(Clone)]
pub struct FakeEventMeshClient {
    subscriptions: Arc<Mutex<HashMap<String, MeshSubscription>>>,
    status_on_create: Arc<Mutex<String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeEventMeshClient {
    fn default() -> Self {
        Self {
            subscriptions: Arc::default(),
            status_on_create: Arc::new(Mutex::new("Active".to_string())),
            calls: Arc::default(),
        }
    }
}

impl FakeEventMeshClient {
    pub fn set_status_on_create(&self, status: &str) {
        *self.status_on_create.lock().unwrap() = status.to_string();
    }

    pub fn subscriptions(&self) -> Vec<MeshSubscription> {
        self.subscriptions.lock().unwrap().values().cloned().collect()
    }

    /// Modify a remote subscription behind the controller's back
    pub fn edit_remote(&self, edit: impl FnOnce(&mut MeshSubscription)) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let remote = subscriptions.values_mut().next().unwrap();
        edit(remote);
    }

    /// Mutating calls since the last [`Self::take_calls`]
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl EventMeshClient for FakeEventMeshClient {
    async fn get(&self, name: &str) -> Result<Option<MeshSubscription>, EventMeshClientError> {
        Ok(self.subscriptions.lock().unwrap().get(name).cloned())
    }

    async fn create(&self, subscription: &MeshSubscription) -> Result<(), EventMeshClientError> {
        self.record("create");
        let mut created = subscription.clone();
        created.subscription_status = self.status_on_create.lock().unwrap().clone();
        self.subscriptions
            .lock()
            .unwrap()
            .insert(created.name.clone(), created);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, EventMeshClientError> {
        self.record("delete");
        Ok(self.subscriptions.lock().unwrap().remove(name).is_some())
    }

    async fn update_state(&self, name: &str, action: StateAction) -> Result<bool, EventMeshClientError> {
        self.record(&format!("{action:?}").to_lowercase());
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(remote) = subscriptions.get_mut(name) else {
            return Ok(false);
        };
        remote.subscription_status = match action {
            StateAction::Pause => "Paused".to_string(),
            StateAction::Resume => "Active".to_string(),
        };
        Ok(true)
    }

    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<bool, EventMeshClientError> {
        self.record("update_webhook_auth");
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(remote) = subscriptions.get_mut(name) else {
            return Ok(false);
        };
        remote.webhook_auth = Some(auth.clone());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Events

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub type_: String,
    pub reason: String,
    pub action: String,
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        _note: Option<String>,
    ) {
        let type_ = match type_ {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };
        self.events.lock().unwrap().push(RecordedEvent {
            type_: type_.to_string(),
            reason: reason.to_string(),
            action: action.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Harness

/// Fakes shared by one test, with the `orders` service registered in [`NAMESPACE`]
pub struct Harness {
    pub subscriptions: Arc<FakeSubscriptionStore>,
    pub rules: Arc<FakeApiRuleStore>,
    pub services: Arc<FakeServiceRegistry>,
    pub events: Arc<RecordingEventPublisher>,
    pub config: ControllerConfig,
}

impl Harness {
    pub fn new() -> Self {
        let services = Arc::new(FakeServiceRegistry::default());
        services.add(NAMESPACE, "orders");
        Self {
            subscriptions: Arc::default(),
            rules: Arc::default(),
            services,
            events: Arc::default(),
            config: ControllerConfig::default(),
        }
    }

    pub fn routes(&self) -> ApiRuleManager {
        ApiRuleManager::new(
            Arc::clone(&self.rules) as Arc<dyn ApiRuleStore>,
            Arc::clone(&self.subscriptions) as Arc<dyn SubscriptionStore>,
            RouteSettings {
                domain: self.config.domain.clone(),
                gateway: self.config.gateway.clone(),
                jwks_url: "https://auth.example.com/.well-known/jwks.json".to_string(),
            },
        )
    }

    pub fn reconciler<B: Backend>(&self, backend: B) -> Arc<Reconciler<B>> {
        Arc::new(Reconciler::new(
            backend,
            Arc::clone(&self.subscriptions) as Arc<dyn SubscriptionStore>,
            self.routes(),
            Arc::clone(&self.services) as Arc<dyn ServiceRegistry>,
            Arc::clone(&self.events) as Arc<dyn EventPublisher>,
            self.config.clone(),
        ))
    }

    pub fn stream_backend(&self, client: FakeStreamClient) -> StreamBackend<FakeStreamClient> {
        StreamBackend::new(
            client,
            Box::new(CharsetCleaner::for_stream().unwrap()),
            StreamSettings {
                prefix: self.config.event_type_prefix.clone(),
                default_max_in_flight: self.config.max_in_flight_default,
            },
        )
    }

    pub fn event_mesh_backend(
        &self,
        client: FakeEventMeshClient,
        webhook_auth: Option<WebhookAuth>,
    ) -> EventMeshBackend<FakeEventMeshClient> {
        EventMeshBackend::new(
            client,
            Box::new(CharsetCleaner::for_event_mesh().unwrap()),
            EventMeshSettings {
                prefix: self.config.event_type_prefix.clone(),
                namespace: "/default/octopilot.shop/1".to_string(),
                qos: "AT_LEAST_ONCE".to_string(),
                content_mode: "BINARY".to_string(),
                exempt_handshake: true,
                webhook_auth,
                activation_timeout: Duration::from_secs(60),
            },
        )
    }
}

/// One reconcile pass for the stored Subscription called `name`
pub async fn run<B: Backend>(ctx: &Arc<Reconciler<B>>, name: &str) -> Result<Action, ReconcilerError> {
    let mut queued = Subscription::new(name, SubscriptionSpec::default());
    queued.metadata.namespace = Some(NAMESPACE.to_string());
    reconcile(Arc::new(queued), Arc::clone(ctx)).await
}

pub fn webhook_auth(client_id: &str) -> WebhookAuth {
    WebhookAuth {
        type_: "oauth2".to_string(),
        grant_type: "client_credentials".to_string(),
        client_id: client_id.to_string(),
        client_secret: "secret".to_string(),
        token_url: "https://auth.example.com/oauth/token".to_string(),
    }
}
