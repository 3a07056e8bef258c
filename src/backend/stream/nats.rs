//! # NATS JetStream Client
//!
//! [`StreamClient`] binding for a JetStream stream. Consumers are durable push consumers
//! delivering to `<deliver_prefix>.<consumer>` with a queue group of the same name, so
//! any number of dispatcher replicas share the load.

use crate::backend::stream::client::{ConsumerConfig, ConsumerInfo, StreamClient, StreamClientError};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::push, stream::Stream};
use async_trait::async_trait;
use tracing::info;

pub struct NatsStreamClient {
    stream: Stream,
    deliver_prefix: String,
}

impl std::fmt::Debug for NatsStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsStreamClient")
            .field("deliver_prefix", &self.deliver_prefix)
            .finish_non_exhaustive()
    }
}

impl NatsStreamClient {
    /// Connect to the server and bind to an existing stream
    ///
    /// # Errors
    /// Returns an error if the server is unreachable or the stream does not exist.
    pub async fn connect(url: &str, stream_name: &str, deliver_prefix: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {url}"))?;
        let context = jetstream::new(client);
        let stream = context
            .get_stream(stream_name)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to stream {stream_name}: {e}"))?;
        info!("Connected to JetStream stream {} at {}", stream_name, url);
        Ok(Self {
            stream,
            deliver_prefix: deliver_prefix.to_string(),
        })
    }

    fn push_config(&self, config: &ConsumerConfig) -> push::Config {
        push::Config {
            durable_name: Some(config.name.clone()),
            deliver_subject: format!("{}.{}", self.deliver_prefix, config.name),
            deliver_group: Some(config.name.clone()),
            filter_subject: config.filter_subject.clone(),
            max_ack_pending: config.max_ack_pending,
            description: Some(config.description.clone()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ..Default::default()
        }
    }
}

/// JetStream reports missing consumers as API errors, classified by message
fn is_not_found(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("not found") || lower.contains("10014")
}

fn classify(error: &str) -> StreamClientError {
    let lower = error.to_lowercase();
    if lower.contains("timed out") || lower.contains("connection") || lower.contains("no responders") {
        StreamClientError::Transport(error.to_string())
    } else {
        StreamClientError::Rejected(error.to_string())
    }
}

#[async_trait]
impl StreamClient for NatsStreamClient {
    async fn consumer_info(&self, name: &str) -> Result<Option<ConsumerInfo>, StreamClientError> {
        match self.stream.get_consumer::<push::Config>(name).await {
            Ok(consumer) => {
                let info = consumer.cached_info();
                Ok(Some(ConsumerInfo {
                    name: info.name.clone(),
                    filter_subject: info.config.filter_subject.clone(),
                    max_ack_pending: info.config.max_ack_pending,
                }))
            }
            Err(e) if is_not_found(&e.to_string()) => Ok(None),
            Err(e) => Err(classify(&e.to_string())),
        }
    }

    async fn create_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError> {
        self.stream
            .create_consumer(self.push_config(config))
            .await
            .map(|_| ())
            .map_err(|e| classify(&e.to_string()))
    }

    async fn update_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError> {
        self.stream
            .update_consumer(self.push_config(config))
            .await
            .map(|_| ())
            .map_err(|e| classify(&e.to_string()))
    }

    async fn delete_consumer(&self, name: &str) -> Result<bool, StreamClientError> {
        match self.stream.delete_consumer(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e.to_string()) => Ok(false),
            Err(e) => Err(classify(&e.to_string())),
        }
    }
}
