//! Boundary to the external background-removal collaborator and sample image sources.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use shared::{AssetOrigin, ImageAsset};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const API_KEY_HEADER: &str = "X-Api-Key";
pub const DEFAULT_SIMULATED_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("removal service endpoint is invalid: {0}")]
    InvalidEndpoint(String),
    #[error("removal service transport failure: {0}")]
    Transport(String),
    #[error("removal service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("removal service did not answer within {after:?}")]
    Timeout { after: Duration },
    #[error("removal service returned an unusable payload: {0}")]
    InvalidResponse(String),
    #[error("removal service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    fn from_reqwest(err: reqwest::Error, timeout: Option<Duration>) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                after: timeout.unwrap_or_default(),
            };
        }
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait RemovalService: Send + Sync {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError>;
}

#[async_trait]
impl<T: RemovalService + ?Sized> RemovalService for Arc<T> {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        (**self).remove_background(asset).await
    }
}

#[async_trait]
pub trait SampleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Sends the raw source payload to an HTTP endpoint and expects the processed image back
/// as the response body.
pub struct HttpRemovalService {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl HttpRemovalService {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ServiceError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ServiceError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RemovalService for HttpRemovalService {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        info!(
            asset_id = %asset.id(),
            bytes = asset.len(),
            endpoint = %self.endpoint,
            "sending image to removal service"
        );
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, asset.mime_type())
            .body(asset.bytes().to_vec());
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "removal service rejected request");
            return Err(status_error(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout))?;
        let result = ImageAsset::from_bytes(bytes.to_vec(), AssetOrigin::RemovalService)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        debug!(
            source_id = %asset.id(),
            result_id = %result.id(),
            mime_type = result.mime_type(),
            "removal service answered"
        );
        Ok(result)
    }
}

fn status_error(status: StatusCode, body: &str) -> ServiceError {
    ServiceError::Status {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}

/// Downloads sample images. Each fetch is bounded by `timeout`.
pub struct HttpSampleFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpSampleFetcher {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Client::new(), timeout)
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let timeout = Some(self.timeout);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, timeout))?;
        Ok(bytes.to_vec())
    }
}

impl Default for HttpSampleFetcher {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl SampleFetcher for HttpSampleFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        match tokio::time::timeout(self.timeout, self.get(url)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(url, after_ms = self.timeout.as_millis() as u64, "sample fetch timed out");
                Err(ServiceError::Timeout {
                    after: self.timeout,
                })
            }
        }
    }
}

/// Stand-in collaborator: waits, then answers with a fixed image or a copy of the source.
pub struct SimulatedRemovalService {
    delay: Duration,
    fixed_result: Option<ImageAsset>,
}

impl SimulatedRemovalService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fixed_result: None,
        }
    }

    pub fn with_fixed_result(mut self, result: ImageAsset) -> Self {
        self.fixed_result = Some(result);
        self
    }
}

impl Default for SimulatedRemovalService {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATED_DELAY)
    }
}

#[async_trait]
impl RemovalService for SimulatedRemovalService {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        debug!(asset_id = %asset.id(), delay_ms = self.delay.as_millis() as u64, "simulating removal");
        tokio::time::sleep(self.delay).await;
        let template = self.fixed_result.as_ref().unwrap_or(&asset);
        Ok(template.reissue_with_origin(AssetOrigin::RemovalService))
    }
}

pub struct UnavailableRemovalService;

#[async_trait]
impl RemovalService for UnavailableRemovalService {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        Err(ServiceError::Unavailable(format!(
            "no removal service configured for asset {}",
            asset.id()
        )))
    }
}

/// Deadline at the collaborator boundary. The inner future is dropped when it expires.
pub struct WithTimeout<S> {
    inner: S,
    after: Duration,
}

impl<S> WithTimeout<S> {
    pub fn new(inner: S, after: Duration) -> Self {
        Self { inner, after }
    }
}

#[async_trait]
impl<S: RemovalService> RemovalService for WithTimeout<S> {
    async fn remove_background(&self, asset: ImageAsset) -> Result<ImageAsset, ServiceError> {
        let asset_id = asset.id();
        match tokio::time::timeout(self.after, self.inner.remove_background(asset)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(%asset_id, after_ms = self.after.as_millis() as u64, "removal call timed out");
                Err(ServiceError::Timeout { after: self.after })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
