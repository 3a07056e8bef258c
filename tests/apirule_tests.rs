//! APIRule manager behaviour against an in-memory cluster.

mod common;

use common::{run, subscription, FakeStreamClient, Harness, NAMESPACE, SINK};
use eventing_controller::constants::{LABEL_MANAGED_BY, LABEL_SERVICE_NAME, MAX_CONFLICT_RETRIES};
use eventing_controller::controller::apirule::{route_name, RouteError};
use eventing_controller::controller::sink::{parse_sink, SinkTarget};

fn target(sink: &str) -> SinkTarget {
    parse_sink(sink).unwrap()
}

#[tokio::test]
async fn test_created_rule_exposes_sink_through_gateway() {
    let h = Harness::new();
    let routes = h.routes();
    let sub = h.subscriptions.insert(subscription("orders", SINK));

    let status = routes.sync(&sub, &target(SINK)).await.unwrap();

    assert_eq!(status.name, route_name(&target(SINK)));
    assert!(!status.ready);
    assert_eq!(status.external_sink, routes.external_sink(&target(SINK)));

    let rule = h.rules.rule(&status.name).unwrap();
    assert_eq!(rule.spec.gateway, h.config.gateway);
    assert_eq!(rule.spec.host, routes.host(&target(SINK)));
    assert!(rule.spec.host.ends_with(".example.com"));
    assert_eq!(rule.spec.service.name, "orders");
    assert_eq!(rule.spec.service.namespace.as_deref(), Some(NAMESPACE));
    assert_eq!(rule.spec.service.port, 80);
    assert_eq!(rule.spec.rules.len(), 1);
    let path = &rule.spec.rules[0];
    assert_eq!(path.path, "/events");
    assert_eq!(path.methods, vec!["POST", "OPTIONS"]);
    assert_eq!(path.access_strategies[0].handler, "jwt");
    assert_eq!(
        path.access_strategies[0].config.as_ref().unwrap().jwks_urls,
        vec!["https://auth.example.com/.well-known/jwks.json"]
    );

    let labels = rule.metadata.labels.unwrap();
    assert_eq!(labels.get(LABEL_SERVICE_NAME).map(String::as_str), Some("orders"));
    assert!(labels.contains_key(LABEL_MANAGED_BY));
    let owners = rule.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "Subscription");
    assert_eq!(owners[0].uid, "uid-orders");
}

#[tokio::test]
async fn test_identical_paths_are_listed_once() {
    let h = Harness::new();
    let routes = h.routes();
    let orders = h.subscriptions.insert(subscription("orders", SINK));
    let audit = h.subscriptions.insert(subscription("audit", SINK));

    routes.sync(&orders, &target(SINK)).await.unwrap();
    routes.sync(&audit, &target(SINK)).await.unwrap();

    let rules = h.rules.all();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].paths().collect::<Vec<_>>(), vec!["/events"]);
    assert_eq!(rules[0].metadata.owner_references.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rule_deleted_out_of_band_is_recreated() {
    let h = Harness::new();
    let routes = h.routes();
    let sub = h.subscriptions.insert(subscription("orders", SINK));
    let name = routes.sync(&sub, &target(SINK)).await.unwrap().name;

    h.rules.remove(&name);
    routes.sync(&sub, &target(SINK)).await.unwrap();

    assert_eq!(h.rules.creates(), 2);
    assert!(h.rules.rule(&name).is_some());
}

#[tokio::test]
async fn test_conflicting_writers_are_retried() {
    let h = Harness::new();
    let routes = h.routes();
    let orders = h.subscriptions.insert(subscription("orders", SINK));
    let refunds = h.subscriptions.insert(subscription(
        "refunds",
        "http://orders.shop.svc.cluster.local/refunds",
    ));
    routes.sync(&orders, &target(SINK)).await.unwrap();

    h.rules.fail_next_replaces(2);
    let status = routes.sync(&refunds, &target(SINK)).await.unwrap();

    assert_eq!(h.rules.replaces(), 1);
    let rule = h.rules.rule(&status.name).unwrap();
    assert_eq!(rule.paths().collect::<Vec<_>>(), vec!["/events", "/refunds"]);
}

#[tokio::test]
async fn test_conflicts_give_up_after_bounded_retries() {
    let h = Harness::new();
    let routes = h.routes();
    let orders = h.subscriptions.insert(subscription("orders", SINK));
    let refunds = h.subscriptions.insert(subscription(
        "refunds",
        "http://orders.shop.svc.cluster.local/refunds",
    ));
    routes.sync(&orders, &target(SINK)).await.unwrap();

    h.rules.fail_next_replaces(MAX_CONFLICT_RETRIES);
    let err = routes.sync(&refunds, &target(SINK)).await.unwrap_err();

    assert!(matches!(
        err,
        RouteError::ConflictRetriesExhausted { attempts, .. } if attempts == MAX_CONFLICT_RETRIES
    ));
}

#[tokio::test]
async fn test_release_by_non_owner_keeps_rule() {
    let h = Harness::new();
    let routes = h.routes();
    let orders = h.subscriptions.insert(subscription("orders", SINK));
    let other = h.subscriptions.insert(subscription(
        "payments",
        "http://payments.shop.svc.cluster.local/events",
    ));
    let name = routes.sync(&orders, &target(SINK)).await.unwrap().name;
    let writes = h.rules.writes();

    routes.release(&other, &name).await.unwrap();

    assert_eq!(h.rules.writes(), writes);
    assert!(h.rules.rule(&name).is_some());
}

#[tokio::test]
async fn test_moving_the_sink_releases_the_previous_rule() {
    let h = Harness::new();
    let ctx = h.reconciler(h.stream_backend(FakeStreamClient::default()));
    h.subscriptions.insert(subscription("orders", SINK));
    run(&ctx, "orders").await.unwrap();
    let old_rule = route_name(&target(SINK));
    assert!(h.rules.rule(&old_rule).is_some());

    let moved = "http://orders.shop.svc.cluster.local:8080/events";
    h.subscriptions
        .edit_spec("orders", |spec| spec.sink = moved.to_string());
    run(&ctx, "orders").await.unwrap();

    let new_rule = route_name(&target(moved));
    assert_ne!(old_rule, new_rule);
    assert!(h.rules.rule(&old_rule).is_none());
    assert_eq!(h.rules.rule(&new_rule).unwrap().spec.service.port, 8080);
    let stored = h.subscriptions.stored("orders").unwrap();
    assert_eq!(
        stored.status.unwrap().backend.api_rule_name,
        Some(new_rule)
    );
}

#[tokio::test]
async fn test_sink_moved_to_unknown_service_leaves_shared_rule_to_peers() {
    let h = Harness::new();
    let ctx = h.reconciler(h.stream_backend(FakeStreamClient::default()));
    h.subscriptions.insert(subscription("orders", SINK));
    h.subscriptions.insert(subscription(
        "refunds",
        "http://orders.shop.svc.cluster.local/refunds",
    ));
    run(&ctx, "orders").await.unwrap();
    run(&ctx, "refunds").await.unwrap();
    let shared = route_name(&target(SINK));
    assert_eq!(
        h.rules.rule(&shared).unwrap().paths().collect::<Vec<_>>(),
        vec!["/events", "/refunds"]
    );

    h.subscriptions.edit_spec("orders", |spec| {
        spec.sink = "http://billing.shop.svc.cluster.local/events".to_string();
    });
    run(&ctx, "orders").await.unwrap();

    let rule = h.rules.rule(&shared).unwrap();
    assert_eq!(rule.paths().collect::<Vec<_>>(), vec!["/refunds"]);
    let owners = rule.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, "uid-refunds");
    let stored = h.subscriptions.stored("orders").unwrap();
    assert_eq!(stored.status.unwrap().backend.api_rule_name, None);
}
