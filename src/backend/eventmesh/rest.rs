//! Event-Mesh REST Client
//!
//! Native REST implementation of [`EventMeshClient`].
//! Uses reqwest for HTTP requests and OAuth2 client credentials for authentication.
//!
//! The access token is cached until shortly before it expires and dropped on any
//! 401 response, so the next call fetches a fresh one.

use crate::backend::eventmesh::client::{EventMeshClient, EventMeshClientError};
use crate::backend::eventmesh::types::{MeshSubscription, StateAction, StateRequest, WebhookAuth};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Credentials and endpoints of the event mesh
#[derive(Clone)]
pub struct EventMeshCredentials {
    /// Base URL of the messaging API, e.g. `https://mesh.example.com/messaging`
    pub messaging_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for EventMeshCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMeshCredentials")
            .field("messaging_url", &self.messaging_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Event-mesh REST client
pub struct EventMeshRestClient {
    http_client: Client,
    credentials: EventMeshCredentials,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for EventMeshRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMeshRestClient")
            .field("messaging_url", &self.credentials.messaging_url)
            .finish_non_exhaustive()
    }
}

impl EventMeshRestClient {
    /// Create a new client. No request is made until the first call.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: EventMeshCredentials) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        info!(
            "Initializing event-mesh REST client for {}",
            credentials.messaging_url
        );
        Ok(Self {
            http_client,
            credentials,
            token: RwLock::new(None),
        })
    }

    fn subscriptions_url(&self) -> String {
        format!(
            "{}/events/subscriptions",
            self.credentials.messaging_url.trim_end_matches('/')
        )
    }

    fn subscription_url(&self, name: &str) -> String {
        format!("{}/{}", self.subscriptions_url(), name)
    }

    async fn access_token(&self) -> Result<String, EventMeshClientError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Fetching event-mesh access token");
        let response = self
            .http_client
            .post(&self.credentials.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| EventMeshClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EventMeshClientError::Unauthorized(format!(
                "token request failed with {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| EventMeshClientError::Transport(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300));
        let cached = CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        };
        let value = cached.value.clone();
        *self.token.write().await = Some(cached);
        Ok(value)
    }

    /// Send an authenticated request, returning the raw response
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, EventMeshClientError> {
        let token = self.access_token().await?;
        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EventMeshClientError::Transport(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            *self.token.write().await = None;
            let body = response.text().await.unwrap_or_default();
            return Err(EventMeshClientError::Unauthorized(body));
        }
        Ok(response)
    }

    async fn status_error(response: reqwest::Response) -> EventMeshClientError {
        let code = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        EventMeshClientError::Status { code, message }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EventMeshClientError> {
    serde_json::to_value(value).map_err(|e| EventMeshClientError::Status {
        code: 0,
        message: format!("failed to serialize request: {e}"),
    })
}

#[async_trait]
impl EventMeshClient for EventMeshRestClient {
    async fn get(&self, name: &str) -> Result<Option<MeshSubscription>, EventMeshClientError> {
        let response = self
            .send(Method::GET, &self.subscription_url(name), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| EventMeshClientError::Transport(e.to_string())),
            _ => Err(Self::status_error(response).await),
        }
    }

    async fn create(&self, subscription: &MeshSubscription) -> Result<(), EventMeshClientError> {
        let response = self
            .send(Method::POST, &self.subscriptions_url(), Some(to_json(subscription)?))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, EventMeshClientError> {
        let response = self
            .send(Method::DELETE, &self.subscription_url(name), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::status_error(response).await),
        }
    }

    async fn update_state(&self, name: &str, action: StateAction) -> Result<bool, EventMeshClientError> {
        let url = format!("{}/state", self.subscription_url(name));
        let response = self
            .send(Method::PUT, &url, Some(to_json(&StateRequest { action })?))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::ACCEPTED | StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            _ => Err(Self::status_error(response).await),
        }
    }

    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<bool, EventMeshClientError> {
        let body = serde_json::json!({ "webhookAuth": to_json(auth)? });
        let response = self
            .send(Method::PATCH, &self.subscription_url(name), Some(body))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            _ => Err(Self::status_error(response).await),
        }
    }
}
