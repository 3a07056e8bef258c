//! # Watch Loop
//!
//! Controller watch loop that monitors Subscriptions and the APIRules they own, and
//! triggers reconciliation when either changes.

use crate::backend::Backend;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::{APIRule, Subscription};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Subscriptions listed as owners of `rule`
#[must_use]
pub fn owning_subscriptions(rule: &APIRule) -> Vec<ObjectRef<Subscription>> {
    let namespace = rule.metadata.namespace.as_deref();
    let kind = Subscription::kind(&());
    let api_version = Subscription::api_version(&());
    rule.metadata
        .owner_references
        .iter()
        .flatten()
        .filter(|owner| owner.kind == kind && owner.api_version == api_version)
        .map(|owner| {
            let object = ObjectRef::new(&owner.name);
            match namespace {
                Some(ns) => object.within(ns),
                None => object,
            }
        })
        .collect()
}

/// Run the controller watch loop
///
/// Restarts the controller stream whenever it ends, until a shutdown signal marks the
/// server as not ready.
pub async fn run_watch_loop<B: Backend + 'static>(
    client: Client,
    reconciler: Arc<Reconciler<B>>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config.clone();
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
    });

    let subscriptions: Api<Subscription> = Api::all(client.clone());
    let rules: Api<APIRule> = Api::all(client);
    let concurrency = u16::try_from(config.max_concurrent_reconciliations).unwrap_or(u16::MAX);

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let backoff_start_ms = config.backoff_start_ms;
        let backoff_max_ms = config.backoff_max_ms;
        let restart_delay = config.watch_restart_delay_duration();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop",
            backend = reconciler.backend.name()
        );

        info!("Starting controller watch loop...");
        Controller::new(subscriptions.clone(), watcher::Config::default().any_semantic())
            .watches(rules.clone(), watcher::Config::default(), |rule| {
                owning_subscriptions(&rule)
            })
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(
                |obj, ctx| reconcile(obj, ctx),
                |obj, error, ctx| handle_reconciliation_error(obj, error, ctx),
                Arc::clone(&reconciler),
            )
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff);
                async move {
                    match &x {
                        Ok((object, _)) => {
                            backoff.store(backoff_start_ms, Ordering::Relaxed);
                            debug!(subscription = %object, "watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                backoff_max_ms,
                                restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
