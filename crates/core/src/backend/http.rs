//! HTTP backend using `reqwest` streaming bodies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client as HttpClient, StatusCode};
use serde::Serialize;

use super::GenerationBackend;
use crate::auth::{CredentialProvider, EnvCredentials};
use crate::error::{PipelineError, Result};
use crate::models::{OutlineRequest, SectionRequest, UpstreamConfig};
use crate::stream::ByteStream;

#[derive(Serialize)]
struct UpstreamBody<'a, T: Serialize> {
    model: &'a str,
    stream: bool,
    #[serde(flatten)]
    request: &'a T,
}

/// Streams generations from an HTTP service
pub struct HttpBackend {
    config: UpstreamConfig,
    http_client: HttpClient,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpBackend {
    /// Create a backend reading its key from `config.api_key_env`
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let credentials = Arc::new(EnvCredentials::new(config.api_key_env.clone()));
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(
        config: UpstreamConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            credentials,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    async fn open<T: Serialize + Sync>(&self, url: &str, request: &T) -> Result<ByteStream> {
        let body = UpstreamBody {
            model: &self.config.model,
            stream: true,
            request,
        };

        let mut builder = self
            .http_client
            .post(url)
            .header(header::ACCEPT, "text/event-stream")
            .json(&body);
        if let Some(key) = self.credentials.api_key()? {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::connection(format!("failed to send request to {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match status {
                StatusCode::UNAUTHORIZED => "authentication failed, check your API key".to_string(),
                StatusCode::TOO_MANY_REQUESTS => "rate limit exceeded, try again later".to_string(),
                _ => {
                    let error_body: Option<serde_json::Value> = response.json().await.ok();
                    let detail = error_body
                        .as_ref()
                        .and_then(|v| v.get("error").and_then(|e| e.get("message")))
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    format!("request failed ({}): {}", status, detail)
                }
            };
            return Err(PipelineError::Connection {
                message,
                status: Some(status.as_u16()),
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| PipelineError::connection(format!("failed to read chunk: {}", e)))
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn open_outline(&self, request: &OutlineRequest) -> Result<ByteStream> {
        tracing::debug!(subject = %request.subject, "opening outline stream");
        self.open(&self.config.outline_url(), request).await
    }

    async fn open_section(&self, request: &SectionRequest) -> Result<ByteStream> {
        tracing::debug!(index = request.section_index, "opening section stream");
        self.open(&self.config.section_url(), request).await
    }
}
