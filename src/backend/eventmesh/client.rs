//! # Event-Mesh Client
//!
//! Subscription management operations the event-mesh backend needs from the remote service.

use crate::backend::eventmesh::types::{MeshSubscription, StateAction, WebhookAuth};
use crate::backend::BackendError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventMeshClientError {
    #[error("event mesh unreachable: {0}")]
    Transport(String),
    #[error("event mesh rejected credentials: {0}")]
    Unauthorized(String),
    #[error("event mesh returned {code}: {message}")]
    Status { code: u16, message: String },
}

impl From<EventMeshClientError> for BackendError {
    fn from(err: EventMeshClientError) -> Self {
        match err {
            EventMeshClientError::Transport(msg) => BackendError::Transport(msg),
            EventMeshClientError::Unauthorized(msg) => BackendError::Unauthorized(msg),
            EventMeshClientError::Status { code, message } => {
                BackendError::UnexpectedStatus { code, message }
            }
        }
    }
}

#[async_trait]
pub trait EventMeshClient: Send + Sync {
    /// `None` when the subscription does not exist
    async fn get(&self, name: &str) -> Result<Option<MeshSubscription>, EventMeshClientError>;

    async fn create(&self, subscription: &MeshSubscription) -> Result<(), EventMeshClientError>;

    /// Returns false when the subscription was already absent
    async fn delete(&self, name: &str) -> Result<bool, EventMeshClientError>;

    /// Returns false when the subscription does not exist
    async fn update_state(&self, name: &str, action: StateAction) -> Result<bool, EventMeshClientError>;

    /// Returns false when the subscription does not exist
    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<bool, EventMeshClientError>;
}
