//! # Stream Backend
//!
//! Keeps one durable consumer per event type on a persistent stream.
//!
//! Subjects are `<prefix>.<source>.<type>` for standard matching and `<prefix>.<type>` for
//! exact matching. Consumer names are an md5 hash of the Subscription key and the subject,
//! so the same Subscription always maps to the same consumers.

pub mod client;
pub mod nats;

pub use client::{ConsumerConfig, ConsumerInfo, StreamClient, StreamClientError};

use crate::backend::cleaner::Cleaner;
use crate::backend::{max_in_flight, Backend, BackendError, ResolvedType, SyncReport};
use crate::crd::{StreamTypes, Subscription, TypeMatching};
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, info_span, Instrument};

/// Settings of the stream backend
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Prefix of every subject
    pub prefix: String,
    /// Delivery concurrency when the Subscription does not set one
    pub default_max_in_flight: i64,
}

pub struct StreamBackend<C> {
    client: C,
    cleaner: Box<dyn Cleaner>,
    settings: StreamSettings,
}

impl<C> std::fmt::Debug for StreamBackend<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBackend")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<C: StreamClient> StreamBackend<C> {
    pub fn new(client: C, cleaner: Box<dyn Cleaner>, settings: StreamSettings) -> Self {
        Self {
            client,
            cleaner,
            settings,
        }
    }

    /// Stream subject for one event type
    ///
    /// # Errors
    /// Returns an error when the source or type is empty after cleaning.
    pub fn subject(
        &self,
        source: &str,
        event_type: &str,
        matching: TypeMatching,
    ) -> Result<(String, String), BackendError> {
        if matching == TypeMatching::Exact {
            return Ok((
                event_type.to_string(),
                format!("{}.{}", self.settings.prefix, event_type),
            ));
        }
        let clean_source = self.cleaner.clean_source(source)?;
        let clean_type = self.cleaner.clean_event_type(event_type)?;
        let subject = format!("{}.{}.{}", self.settings.prefix, clean_source, clean_type);
        Ok((clean_type, subject))
    }

    fn consumer_config(&self, sub: &Subscription, resolved: &ResolvedType, max: i64) -> ConsumerConfig {
        ConsumerConfig {
            name: consumer_name(sub, &resolved.subject),
            filter_subject: resolved.subject.clone(),
            max_ack_pending: max,
            description: sub.key(),
        }
    }

    async fn delete_consumer(&self, name: &str) -> Result<(), BackendError> {
        let existed = self
            .client
            .delete_consumer(name)
            .await
            .map_err(map_client_error)?;
        metrics::increment_backend_operations(self.name(), "delete");
        if existed {
            info!(consumer = name, "Deleted stream consumer");
        } else {
            debug!(consumer = name, "Stream consumer already absent");
        }
        Ok(())
    }
}

/// Consumer name derived from the Subscription key and subject
#[must_use]
pub fn consumer_name(sub: &Subscription, subject: &str) -> String {
    format!("{:x}", md5::compute(format!("{}/{}", sub.key(), subject)))
}

fn record_consumer(sub: &mut Subscription, original_type: &str, name: &str) {
    let types = &mut sub.status_mut().backend.types;
    if !types.iter().any(|t| t.consumer_name == name) {
        types.push(StreamTypes {
            original_type: original_type.to_string(),
            consumer_name: name.to_string(),
        });
    }
}

fn forget_consumer(sub: &mut Subscription, name: &str) {
    sub.status_mut()
        .backend
        .types
        .retain(|t| t.consumer_name != name);
}

fn map_client_error(err: StreamClientError) -> BackendError {
    match err {
        StreamClientError::Transport(msg) => BackendError::Transport(msg),
        StreamClientError::Rejected(msg) => BackendError::UnexpectedStatus {
            code: 400,
            message: msg,
        },
    }
}

#[async_trait]
impl<C: StreamClient> Backend for StreamBackend<C> {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn resolve_types(&self, sub: &Subscription) -> Result<Vec<ResolvedType>, BackendError> {
        let matching = sub.spec.matching();
        sub.spec
            .unique_types()
            .into_iter()
            .map(|original_type| {
                let (clean_type, subject) =
                    self.subject(&sub.spec.source, &original_type, matching)?;
                Ok(ResolvedType {
                    original_type,
                    clean_type,
                    subject,
                })
            })
            .collect()
    }

    async fn sync_subscription(&self, sub: &mut Subscription) -> Result<SyncReport, BackendError> {
        let span = info_span!("stream.sync", subscription = %sub.key());
        async {
            let resolved = self.resolve_types(sub)?;
            let max = max_in_flight(sub, self.settings.default_max_in_flight)?;
            let desired: Vec<ConsumerConfig> = resolved
                .iter()
                .map(|r| self.consumer_config(sub, r, max))
                .collect();

            // consumers recorded for types that are no longer wanted
            let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();
            let stale: Vec<String> = sub
                .status
                .as_ref()
                .map(|s| {
                    s.backend
                        .types
                        .iter()
                        .filter(|t| !desired_names.contains(t.consumer_name.as_str()))
                        .map(|t| t.consumer_name.clone())
                        .collect()
                })
                .unwrap_or_default();
            for name in &stale {
                self.delete_consumer(name).await?;
                forget_consumer(sub, name);
            }

            let mut created = Vec::new();
            for (resolved_type, config) in resolved.iter().zip(&desired) {
                match self
                    .client
                    .consumer_info(&config.name)
                    .await
                    .map_err(map_client_error)?
                {
                    None => {
                        self.client
                            .create_consumer(config)
                            .await
                            .map_err(map_client_error)?;
                        metrics::increment_backend_operations(self.name(), "create");
                        info!(
                            consumer = config.name.as_str(),
                            subject = config.filter_subject.as_str(),
                            "Created stream consumer"
                        );
                        // recorded right away so a later failure in this pass cannot orphan it
                        record_consumer(sub, &resolved_type.original_type, &config.name);
                        created.push(config);
                    }
                    Some(info) if info.max_ack_pending != config.max_ack_pending => {
                        self.client
                            .update_consumer(config)
                            .await
                            .map_err(map_client_error)?;
                        metrics::increment_backend_operations(self.name(), "update");
                        info!(
                            consumer = config.name.as_str(),
                            from = info.max_ack_pending,
                            to = config.max_ack_pending,
                            "Updated stream consumer max in flight"
                        );
                    }
                    Some(_) => {}
                }
            }

            sub.status_mut().backend.types = resolved
                .iter()
                .zip(&desired)
                .map(|(r, c)| StreamTypes {
                    original_type: r.original_type.clone(),
                    consumer_name: c.name.clone(),
                })
                .collect();

            for config in created {
                let visible = self
                    .client
                    .consumer_info(&config.name)
                    .await
                    .map_err(map_client_error)?;
                if visible.is_none() {
                    return Err(BackendError::MissingSubscription {
                        subject: config.filter_subject.clone(),
                    });
                }
            }

            Ok::<_, BackendError>(SyncReport::healthy())
        }
        .instrument(span)
        .await
    }

    async fn delete_subscription(&self, sub: &Subscription) -> Result<(), BackendError> {
        let mut names: Vec<String> = sub
            .status
            .as_ref()
            .map(|s| s.backend.types.iter().map(|t| t.consumer_name.clone()).collect())
            .unwrap_or_default();
        // spec.types may have moved on since the last recorded status
        if let Ok(resolved) = self.resolve_types(sub) {
            for r in resolved {
                let name = consumer_name(sub, &r.subject);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        for name in &names {
            self.delete_consumer(name).await?;
        }
        Ok(())
    }
}
