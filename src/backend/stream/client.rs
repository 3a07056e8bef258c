//! # Stream Client
//!
//! Consumer management operations the stream backend needs from the stream server.

use async_trait::async_trait;
use thiserror::Error;

/// Desired durable consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub name: String,
    /// Only messages on this subject are delivered
    pub filter_subject: String,
    /// Delivery concurrency
    pub max_ack_pending: i64,
    /// `namespace/name` of the owning Subscription
    pub description: String,
}

/// Consumer as reported by the stream server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub name: String,
    pub filter_subject: String,
    pub max_ack_pending: i64,
}

#[derive(Debug, Error)]
pub enum StreamClientError {
    #[error("stream server unreachable: {0}")]
    Transport(String),
    #[error("stream request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait StreamClient: Send + Sync {
    /// `None` when the consumer does not exist
    async fn consumer_info(&self, name: &str) -> Result<Option<ConsumerInfo>, StreamClientError>;

    async fn create_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError>;

    async fn update_consumer(&self, config: &ConsumerConfig) -> Result<(), StreamClientError>;

    /// Returns false when the consumer was already absent
    async fn delete_consumer(&self, name: &str) -> Result<bool, StreamClientError>;
}
