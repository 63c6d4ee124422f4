use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::ForwardError;
use super::types::{ForwardRequest, ForwardResult, parse_body};
use crate::config::ForwardConfig;

/// Sends a captured payload to the remote service. One attempt, no retry.
#[async_trait]
pub trait PayloadSender: Send + Sync {
    async fn send(&self, request: &ForwardRequest) -> Result<ForwardResult, ForwardError>;

    /// Where payloads are sent, for status messages.
    fn endpoint(&self) -> &str;
}

pub struct ForwardClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl ForwardClient {
    pub fn new(config: &ForwardConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(config.url.clone(), config.timeout())
    }

    /// Create a client with an explicit URL and timeout (useful for testing).
    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ForwardError::Network(err)
        }
    }
}

#[async_trait]
impl PayloadSender for ForwardClient {
    async fn send(&self, request: &ForwardRequest) -> Result<ForwardResult, ForwardError> {
        tracing::info!(url = %self.url, bytes = request.payload.len(), "Forwarding payload");

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        let body = parse_body(&text);

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Remote service rejected payload");
            return Err(ForwardError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        Ok(ForwardResult {
            status: status.as_u16(),
            body: body.unwrap_or(serde_json::Value::Null),
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
