//! Embedding handler: sends each message's text to an Azure OpenAI
//! embeddings deployment and classifies the response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{HandlerError, Message, Outcome};
use crate::observability::EMBEDDING_REQUESTS;
use crate::ports::MessageHandler;

pub const DEFAULT_API_VERSION: &str = "2023-12-01-preview";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the embeddings deployment.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    /// Whole-request timeout. There are no client-side retries.
    pub timeout: Duration,
}

impl EmbeddingConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

/// Message body expected on the subscription.
#[derive(Debug, Deserialize)]
struct TextPayload {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Map a downstream HTTP status to a message outcome.
///
/// 2xx → `Success`; 429, 408 and 5xx → `Retry`; any other status → `Drop`.
pub fn classify_status(status: StatusCode) -> Outcome {
    if status.is_success() {
        Outcome::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Outcome::Retry
    } else {
        Outcome::Drop
    }
}

pub struct EmbeddingHandler {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl EmbeddingHandler {
    pub fn new(config: EmbeddingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}

#[async_trait]
impl MessageHandler for EmbeddingHandler {
    async fn process(&self, message: &Message) -> Result<Outcome, HandlerError> {
        let payload: TextPayload = match message.json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(message_id = %message.id(), error = %err, "payload is not a text message");
                return Ok(Outcome::Drop);
            }
        };

        let response = self
            .client
            .post(self.config.url())
            .header("api-key", &self.config.api_key)
            .json(&EmbeddingRequest {
                input: &payload.text,
            })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let status = if err.is_timeout() { "timeout" } else { "error" };
                metrics::counter!(EMBEDDING_REQUESTS, "status" => status).increment(1);
                return Err(HandlerError::Transient(err.to_string()));
            }
        };

        let status = response.status();
        metrics::counter!(EMBEDDING_REQUESTS, "status" => status.as_u16().to_string())
            .increment(1);

        let outcome = classify_status(status);
        match outcome {
            Outcome::Success => {
                let body: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|err| HandlerError::Transient(err.to_string()))?;
                let Some(first) = body.data.first() else {
                    return Err(HandlerError::Unexpected("empty embedding response".into()));
                };
                info!(
                    message_id = %message.id(),
                    dimensions = first.embedding.len(),
                    head = ?&first.embedding[..first.embedding.len().min(5)],
                    "embedding received"
                );
            }
            Outcome::Retry => {
                warn!(message_id = %message.id(), %status, "embedding request throttled or failed");
            }
            Outcome::Drop => {
                let body = response.text().await.unwrap_or_default();
                warn!(message_id = %message.id(), %status, body = %body, "embedding request rejected");
            }
        }
        debug!(message_id = %message.id(), %outcome, "embedding call classified");
        Ok(outcome)
    }
}
