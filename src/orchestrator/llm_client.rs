//! HTTP-backed implementations of [`LlmClient`] and [`EmbeddingClient`],
//! calling an operator-configured completion/embedding endpoint over
//! `reqwest`. Both speak a minimal JSON request/response shape rather than
//! any one vendor's wire format, so the endpoint is expected to sit behind
//! a small adapter.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain_types::RequestText;
use crate::orchestrator::traits::{
    AgentDescriptor, CacheError, EmbeddingClient, LlmClient, LlmRoutingResponse, RouterError,
};

/// Calls a remote completion endpoint to classify a request against the
/// available agent descriptors.
pub struct HttpLlmClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct RoutingRequestBody<'a> {
    request: &'a str,
    agents: Vec<AgentSummary<'a>>,
}

#[derive(Serialize)]
struct AgentSummary<'a> {
    id: &'a str,
    description: &'a str,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn route(
        &self,
        request: &RequestText,
        agents: &[AgentDescriptor],
    ) -> Result<LlmRoutingResponse, RouterError> {
        let body = RoutingRequestBody {
            request: request.as_ref(),
            agents: agents
                .iter()
                .map(|a| AgentSummary {
                    id: a.name.as_ref(),
                    description: a.description.as_str(),
                })
                .collect(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RouterError::ModelUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RouterError::ModelUnavailable(format!(
                "routing endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<LlmRoutingResponse>()
            .await
            .map_err(|e| RouterError::ModelUnavailable(e.to_string()))
    }
}

/// Calls a remote embedding endpoint to compute a vector for normalized
/// prompt text, feeding the prompt cache's semantic-similarity fallback.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequestBody<'a> {
    text: &'a str,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, normalized_text: &str) -> Result<Vec<f32>, CacheError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmbeddingRequestBody { text: normalized_text })
            .send()
            .await
            .map_err(|e| CacheError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<f32>>()
            .await
            .map_err(|e| CacheError::Embedding(e.to_string()))
    }
}
