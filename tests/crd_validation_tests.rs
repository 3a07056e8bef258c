//! # CRD Validation Tests
//!
//! Sample resources as users and the gateway write them, checked against the Rust types
//! and the admission rules, to catch schema drift early.

use eventing_controller::crd::{
    APIRule, ConditionStatus, ConditionType, Subscription, TypeMatching,
};
use eventing_controller::webhook::{default_subscription, to_admission_status, validate_subscription};
use kube::core::CustomResourceExt;

const SUBSCRIPTION_YAML: &str = r#"
apiVersion: eventing.octopilot.io/v1alpha2
kind: Subscription
metadata:
  name: order-created
  namespace: shop
spec:
  sink: http://order-handler.shop.svc.cluster.local:8080/events
  source: commerce
  types:
    - order.created.v1
    - order.cancelled.v1
  config:
    maxInFlightMessages: "20"
"#;

#[test]
fn test_subscription_sample_is_admitted() {
    let mut sub: Subscription =
        serde_yaml::from_str(SUBSCRIPTION_YAML).expect("Should deserialize Subscription");

    assert_eq!(sub.spec.types.len(), 2);
    assert_eq!(sub.spec.type_matching, None);
    assert_eq!(sub.spec.max_in_flight_messages(), Some(Ok(20)));

    default_subscription(&mut sub);
    assert_eq!(sub.spec.type_matching, Some(TypeMatching::Standard));
    assert_eq!(validate_subscription(&sub), Ok(()));
}

#[test]
fn test_exact_matching_sample_without_source() {
    let yaml = r#"
apiVersion: eventing.octopilot.io/v1alpha2
kind: Subscription
metadata:
  name: legacy
  namespace: shop
spec:
  sink: http://legacy.shop.svc.cluster.local
  typeMatching: exact
  types:
    - octopilot.custom.legacy.order.created.v1
"#;
    let sub: Subscription = serde_yaml::from_str(yaml).expect("Should deserialize exact Subscription");

    assert_eq!(sub.spec.type_matching, Some(TypeMatching::Exact));
    assert!(sub.spec.source.is_empty());
    assert_eq!(validate_subscription(&sub), Ok(()));
}

#[test]
fn test_invalid_sample_reports_every_field() {
    let yaml = r#"
apiVersion: eventing.octopilot.io/v1alpha2
kind: Subscription
metadata:
  name: broken
  namespace: shop
spec:
  sink: https://example.com/events
  types: []
  config:
    maxInFlightMessages: lots
"#;
    let sub: Subscription = serde_yaml::from_str(yaml).expect("Should deserialize broken Subscription");

    let err = validate_subscription(&sub).unwrap_err();
    let status = to_admission_status(&err);
    let message = status.message.clone();
    assert!(message.contains("spec.source"), "{message}");
    assert!(message.contains("spec.types"), "{message}");
    assert!(message.contains("spec.config"), "{message}");
    assert!(message.contains("spec.sink"), "{message}");
}

#[test]
fn test_status_written_by_older_controller_is_read() {
    let yaml = r#"
apiVersion: eventing.octopilot.io/v1alpha2
kind: Subscription
metadata:
  name: order-created
  namespace: shop
spec:
  sink: http://order-handler.shop.svc.cluster.local/events
  source: commerce
  types:
    - order.created.v1
status:
  ready: true
  conditions:
    - type: Subscribed
      status: "True"
      reason: SubscriptionCreated
      lastTransitionTime: "2024-01-01T00:00:00Z"
    - type: Subscription active
      status: "True"
      reason: SubscriptionActive
    - type: APIRule status
      status: "True"
      reason: APIRuleCreated
    - type: Webhook call status
      status: "True"
      reason: WebhookCallSuccess
    - type: Legacy
      status: "True"
  types:
    - originalType: order.created.v1
      cleanType: order.created.v1
  backend:
    types:
      - originalType: order.created.v1
        consumerName: 0123456789abcdef0123456789abcdef
    apiRuleName: webhook-0123456789
    externalSink: https://web-0123456789.example.com/events
"#;
    let sub: Subscription = serde_yaml::from_str(yaml).expect("Should deserialize status");
    let status = sub.status.expect("status present");

    assert_eq!(status.conditions.len(), 5);
    assert_eq!(
        status
            .conditions
            .find(&ConditionType::SubscriptionActive)
            .map(|c| c.status),
        Some(ConditionStatus::True)
    );
    assert!(status
        .conditions
        .find(&ConditionType::Other("Legacy".to_string()))
        .is_some());
    // the stored flag is stale: an unknown condition type is never ready
    assert!(status.ready);
    assert!(!status.is_ready());
    assert!(status.should_update_ready_status());
    assert_eq!(status.backend.types[0].consumer_name.len(), 32);
    assert_eq!(status.backend.api_rule_name.as_deref(), Some("webhook-0123456789"));
}

#[test]
fn test_apirule_status_from_gateway() {
    let yaml = r#"
apiVersion: gateway.octopilot.io/v1beta1
kind: APIRule
metadata:
  name: webhook-0123456789
  namespace: shop
spec:
  gateway: octopilot-system/octopilot-gateway
  host: web-0123456789.example.com
  service:
    name: order-handler
    namespace: shop
    port: 8080
  rules:
    - path: /events
      methods: [POST, OPTIONS]
      accessStrategies:
        - handler: jwt
          config:
            jwksUrls: []
status:
  APIRuleStatus:
    code: OK
"#;
    let rule: APIRule = serde_yaml::from_str(yaml).expect("Should deserialize APIRule");

    assert!(rule.is_ready());
    assert_eq!(rule.spec.service.port, 8080);
    assert_eq!(rule.paths().collect::<Vec<_>>(), vec!["/events"]);

    let mut pending = rule.clone();
    pending.status = None;
    assert!(!pending.is_ready());
}

#[test]
fn test_generated_crds_name_both_resources() {
    let subscription = Subscription::crd();
    assert_eq!(
        subscription.metadata.name.as_deref(),
        Some("subscriptions.eventing.octopilot.io")
    );
    assert_eq!(subscription.spec.versions[0].name, "v1alpha2");
    assert!(subscription.spec.versions[0].subresources.is_some());

    let apirule = APIRule::crd();
    assert_eq!(apirule.metadata.name.as_deref(), Some("apirules.gateway.octopilot.io"));
}
