//! Remote claims and notifications API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared_types::{
    ApiConfig, Claim, CreateClaimPayload, CreateClaimResponse, Notification, PortalError,
    RemoteErrorBody, SendMessagePayload, SendMessageResponse,
};

/// Backend operations the portal core depends on.
///
/// Every call takes the bearer token explicitly; token acquisition belongs
/// to the session provider.
#[async_trait]
pub trait ClaimsApi: Send + Sync {
    async fn list_claims(&self, token: &str) -> Result<Vec<Claim>, PortalError>;

    async fn get_claim(&self, token: &str, claim_id: &str) -> Result<Claim, PortalError>;

    async fn create_claim(
        &self,
        token: &str,
        payload: &CreateClaimPayload,
    ) -> Result<CreateClaimResponse, PortalError>;

    async fn send_message(
        &self,
        token: &str,
        claim_id: &str,
        payload: &SendMessagePayload,
    ) -> Result<SendMessageResponse, PortalError>;

    async fn list_notifications(&self, token: &str) -> Result<Vec<Notification>, PortalError>;

    async fn mark_notification_read(
        &self,
        token: &str,
        notification_id: &str,
    ) -> Result<(), PortalError>;

    async fn mark_all_notifications_read(&self, token: &str) -> Result<(), PortalError>;
}

/// HTTP client carrying the configured request timeout.
pub fn build_client(config: &ApiConfig) -> Result<reqwest::Client, PortalError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.effective_timeout_secs()))
        .build()
        .map_err(|e| PortalError::config(format!("Failed to build HTTP client: {e}")))
}

/// `ClaimsApi` over HTTP+JSON.
#[derive(Debug, Clone)]
pub struct HttpClaimsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClaimsApi {
    pub fn new(config: &ApiConfig) -> Result<Self, PortalError> {
        Ok(Self::with_client(build_client(config)?, &config.base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(token)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, PortalError> {
        let response = send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortalError::transport(format!("Invalid response body: {e}")))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), PortalError> {
        send(builder).await.map(|_| ())
    }
}

/// Send a request, mapping non-2xx responses to `Remote` errors.
pub(crate) async fn send(builder: RequestBuilder) -> Result<Response, PortalError> {
    let response = builder
        .send()
        .await
        .map_err(|e| PortalError::transport(format!("Network error: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<RemoteErrorBody>().await.unwrap_or_default();
    let message = body.into_message().unwrap_or_else(|| {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown status")
        )
    });
    Err(PortalError::remote(status.as_u16(), message))
}

fn claim_path(claim_id: &str) -> String {
    format!("/claims/{}", urlencoding::encode(claim_id))
}

#[async_trait]
impl ClaimsApi for HttpClaimsApi {
    #[tracing::instrument(skip_all)]
    async fn list_claims(&self, token: &str) -> Result<Vec<Claim>, PortalError> {
        self.send_json(self.request(Method::GET, "/claims", token))
            .await
    }

    #[tracing::instrument(skip(self, token))]
    async fn get_claim(&self, token: &str, claim_id: &str) -> Result<Claim, PortalError> {
        self.send_json(self.request(Method::GET, &claim_path(claim_id), token))
            .await
    }

    #[tracing::instrument(skip_all, fields(service = %payload.claim.service_type))]
    async fn create_claim(
        &self,
        token: &str,
        payload: &CreateClaimPayload,
    ) -> Result<CreateClaimResponse, PortalError> {
        self.send_json(self.request(Method::POST, "/claims", token).json(payload))
            .await
    }

    #[tracing::instrument(skip(self, token, payload))]
    async fn send_message(
        &self,
        token: &str,
        claim_id: &str,
        payload: &SendMessagePayload,
    ) -> Result<SendMessageResponse, PortalError> {
        let path = format!("{}/messages", claim_path(claim_id));
        self.send_json(self.request(Method::POST, &path, token).json(payload))
            .await
    }

    #[tracing::instrument(skip_all)]
    async fn list_notifications(&self, token: &str) -> Result<Vec<Notification>, PortalError> {
        self.send_json(self.request(Method::GET, "/notifications", token))
            .await
    }

    #[tracing::instrument(skip(self, token))]
    async fn mark_notification_read(
        &self,
        token: &str,
        notification_id: &str,
    ) -> Result<(), PortalError> {
        let path = format!("/notifications/{}/read", urlencoding::encode(notification_id));
        self.send_empty(self.request(Method::PATCH, &path, token))
            .await
    }

    #[tracing::instrument(skip_all)]
    async fn mark_all_notifications_read(&self, token: &str) -> Result<(), PortalError> {
        self.send_empty(self.request(Method::PATCH, "/notifications/read-all", token))
            .await
    }
}
