//! Router executor: consults the prompt cache, falls through to a language
//! model client, validates the result against the live registry snapshot,
//! and decides between routing, falling back, and clarifying.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::domain_types::{AgentName, Confidence, RequestText};
use crate::orchestrator::traits::{
    AgentDescriptor, CacheProvenance, LlmClient, LlmRoutingResponse, PromptCache, RouterError,
    RouterExecutor, RoutingDecision,
};

/// Base delay before the single retry attempt on a transient model failure.
const RETRY_BACKOFF_BASE_MS: u64 = 100;
/// Jitter added on top of the base delay, to avoid thundering-herd retries.
const RETRY_BACKOFF_JITTER_MS: u64 = 100;

/// Default implementation of [`RouterExecutor`].
pub struct RouterExecutorImpl {
    cache: std::sync::Arc<dyn PromptCache>,
    llm: std::sync::Arc<dyn LlmClient>,
    confidence_floor: f64,
    cache_admission_confidence: f64,
    fallback_agent: AgentName,
    cache_enabled: bool,
}

impl RouterExecutorImpl {
    pub fn new(
        cache: std::sync::Arc<dyn PromptCache>,
        llm: std::sync::Arc<dyn LlmClient>,
        confidence_floor: f64,
        cache_admission_confidence: f64,
        fallback_agent: AgentName,
        cache_enabled: bool,
    ) -> Self {
        Self {
            cache,
            llm,
            confidence_floor,
            cache_admission_confidence,
            fallback_agent,
            cache_enabled,
        }
    }

    fn fallback_decision(&self, reasoning: impl Into<String>) -> RoutingDecision {
        RoutingDecision {
            primary_agent: self.fallback_agent.clone(),
            additional_agents: vec![],
            confidence: Confidence::zero(),
            reasoning: reasoning.into(),
            provenance: CacheProvenance::None,
        }
    }

    /// Calls the routing model, retrying once after a jittered backoff if
    /// the first attempt fails transiently. A clarification request is never
    /// retried; it isn't a failure.
    async fn route_with_retry(
        &self,
        request: &RequestText,
        agents: &[AgentDescriptor],
    ) -> Result<LlmRoutingResponse, RouterError> {
        match self.llm.route(request, agents).await {
            Err(RouterError::NeedsClarification { reasoning }) => {
                Err(RouterError::NeedsClarification { reasoning })
            }
            Err(first_err) => {
                warn!(error = %first_err, "router model call failed, retrying once");
                let jitter = rand::thread_rng().gen_range(0..=RETRY_BACKOFF_JITTER_MS);
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_BASE_MS + jitter)).await;
                self.llm.route(request, agents).await
            }
            ok => ok,
        }
    }
}

#[async_trait]
impl RouterExecutor for RouterExecutorImpl {
    async fn route(
        &self,
        request: &RequestText,
        agents: &[AgentDescriptor],
    ) -> Result<RoutingDecision, RouterError> {
        if self.cache_enabled {
            if let Some(decision) = self.cache.lookup(request).await {
                info!(agent = %decision.primary_agent, "routed from cache");
                return Ok(decision);
            }
        }

        let llm_result = self.route_with_retry(request, agents).await;

        let decision = match llm_result {
            Ok(response) => {
                if response.confidence < 0.0 || response.confidence > 1.0 {
                    warn!(confidence = response.confidence, "malformed confidence from router model");
                    return Ok(self.fallback_decision("router model returned a malformed confidence score"));
                }

                let confidence = Confidence::try_new(response.confidence)
                    .unwrap_or_else(|_| Confidence::zero());

                let resolved_agent = agents
                    .iter()
                    .find(|a| a.name.to_string() == response.agent_id)
                    .map(|a| a.name.clone());

                let Some(primary_agent) = resolved_agent else {
                    if response.agent_id.is_empty() {
                        return Ok(self.fallback_decision("router model did not name an agent"));
                    }
                    warn!(agent_id = %response.agent_id, "router model named an unknown agent");
                    return Ok(self.fallback_decision(format!(
                        "router model named an unregistered agent: {}",
                        response.agent_id
                    )));
                };

                if confidence.as_f64() < self.confidence_floor {
                    return Err(RouterError::NeedsClarification {
                        reasoning: response.reasoning,
                    });
                }

                let additional_agents = response
                    .additional_agents
                    .into_iter()
                    .filter_map(|name| AgentName::try_new(name).ok())
                    .filter(|name| agents.iter().any(|a| &a.name == name))
                    .collect();

                RoutingDecision {
                    primary_agent,
                    additional_agents,
                    confidence,
                    reasoning: response.reasoning,
                    provenance: CacheProvenance::None,
                }
            }
            Err(RouterError::NeedsClarification { reasoning }) => {
                return Err(RouterError::NeedsClarification { reasoning });
            }
            Err(err) => {
                warn!(error = %err, "router model unavailable, falling back");
                self.fallback_decision(format!("routing failed: {err}"))
            }
        };

        if self.cache_enabled && decision.confidence.as_f64() >= self.cache_admission_confidence {
            self.cache.store(request, decision.clone()).await;
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{AgentId, AgentPriority, CacheCapacity};
    use crate::orchestrator::prompt_cache::{DeterministicEmbeddingClient, PromptCacheImpl};
    use crate::orchestrator::traits::{AgentCapabilities, AgentTransport};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct StubLlm {
        response: Result<LlmRoutingResponse, RouterError>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn route(
            &self,
            _request: &RequestText,
            _agents: &[AgentDescriptor],
        ) -> Result<LlmRoutingResponse, RouterError> {
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(RouterError::NeedsClarification { reasoning }) => {
                    Err(RouterError::NeedsClarification { reasoning: reasoning.clone() })
                }
                Err(_) => Err(RouterError::ModelUnavailable("stub failure".to_string())),
            }
        }
    }

    fn agent(name: &str) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::generate(),
            name: AgentName::try_new(name.to_string()).unwrap(),
            description: String::new(),
            transport: AgentTransport::Local,
            capabilities: AgentCapabilities::default(),
            priority: AgentPriority::default(),
        }
    }

    fn router_with(response: Result<LlmRoutingResponse, RouterError>) -> RouterExecutorImpl {
        RouterExecutorImpl::new(
            Arc::new(PromptCacheImpl::new(Arc::new(DeterministicEmbeddingClient), CacheCapacity::try_new(10).unwrap(), 0.92)),
            Arc::new(StubLlm { response }),
            0.7,
            0.7,
            AgentName::try_new("general-assistant".to_string()).unwrap(),
            true,
        )
    }

    #[tokio::test]
    async fn routes_to_named_agent_when_confident() {
        let router = router_with(Ok(LlmRoutingResponse {
            agent_id: "light".to_string(),
            reasoning: "about lights".to_string(),
            confidence: 0.95,
            additional_agents: vec![],
        }));
        let agents = vec![agent("light")];
        let decision = router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();
        assert_eq!(decision.primary_agent.to_string(), "light");
    }

    #[tokio::test]
    async fn unknown_agent_falls_back() {
        let router = router_with(Ok(LlmRoutingResponse {
            agent_id: "unregistered".to_string(),
            reasoning: "guessed".to_string(),
            confidence: 0.95,
            additional_agents: vec![],
        }));
        let agents = vec![agent("light")];
        let decision = router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();
        assert_eq!(decision.primary_agent.to_string(), "general-assistant");
        assert_eq!(decision.confidence.as_f64(), 0.0);
    }

    #[tokio::test]
    async fn low_confidence_requests_clarification() {
        let router = router_with(Ok(LlmRoutingResponse {
            agent_id: "light".to_string(),
            reasoning: "ambiguous".to_string(),
            confidence: 0.3,
            additional_agents: vec![],
        }));
        let agents = vec![agent("light")];
        let result = router
            .route(&RequestText::try_new("make it warmer".to_string()).unwrap(), &agents)
            .await;
        assert!(matches!(result, Err(RouterError::NeedsClarification { .. })));
    }

    #[tokio::test]
    async fn model_outage_falls_back_with_zero_confidence() {
        let router = router_with(Err(RouterError::ModelUnavailable("down".to_string())));
        let agents = vec![agent("light")];
        let decision = router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();
        assert_eq!(decision.confidence.as_f64(), 0.0);
    }

    #[tokio::test]
    async fn a_disabled_cache_is_never_consulted_or_admitted_to() {
        let cache = Arc::new(PromptCacheImpl::new(
            Arc::new(DeterministicEmbeddingClient),
            CacheCapacity::try_new(10).unwrap(),
            0.92,
        ));
        let router = RouterExecutorImpl::new(
            cache.clone(),
            Arc::new(StubLlm {
                response: Ok(LlmRoutingResponse {
                    agent_id: "light".to_string(),
                    reasoning: "about lights".to_string(),
                    confidence: 0.95,
                    additional_agents: vec![],
                }),
            }),
            0.7,
            0.7,
            AgentName::try_new("general-assistant".to_string()).unwrap(),
            false,
        );
        let agents = vec![agent("light")];
        router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();
        router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();

        assert_eq!(cache.stats().entries, 0, "a disabled cache must never admit an entry");
        assert_eq!(cache.stats().exact_hits, 0, "a disabled cache must never be consulted");
    }

    /// A stub that counts calls and fails a fixed number of times before
    /// returning a canned response, standing in for a model that recovers or
    /// a model that is down for good.
    struct CountingLlm {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
        then: Result<LlmRoutingResponse, RouterError>,
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn route(
            &self,
            _request: &RequestText,
            _agents: &[AgentDescriptor],
        ) -> Result<LlmRoutingResponse, RouterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(RouterError::ModelUnavailable("down".to_string()))
            } else {
                self.then.clone()
            }
        }
    }

    #[tokio::test]
    async fn model_outage_is_retried_exactly_once_before_falling_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = RouterExecutorImpl::new(
            Arc::new(PromptCacheImpl::new(
                Arc::new(DeterministicEmbeddingClient),
                CacheCapacity::try_new(10).unwrap(),
                0.92,
            )),
            Arc::new(CountingLlm {
                calls: calls.clone(),
                fail_times: usize::MAX,
                then: Err(RouterError::ModelUnavailable("down".to_string())),
            }),
            0.7,
            0.7,
            AgentName::try_new("general-assistant".to_string()).unwrap(),
            true,
        );
        let agents = vec![agent("light")];
        let decision = router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();

        assert_eq!(decision.confidence.as_f64(), 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "expected the original call plus exactly one retry");
    }

    #[tokio::test]
    async fn a_transient_model_error_recovers_on_the_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = RouterExecutorImpl::new(
            Arc::new(PromptCacheImpl::new(
                Arc::new(DeterministicEmbeddingClient),
                CacheCapacity::try_new(10).unwrap(),
                0.92,
            )),
            Arc::new(CountingLlm {
                calls: calls.clone(),
                fail_times: 1,
                then: Ok(LlmRoutingResponse {
                    agent_id: "light".to_string(),
                    reasoning: "recovered".to_string(),
                    confidence: 0.95,
                    additional_agents: vec![],
                }),
            }),
            0.7,
            0.7,
            AgentName::try_new("general-assistant".to_string()).unwrap(),
            true,
        );
        let agents = vec![agent("light")];
        let decision = router
            .route(&RequestText::try_new("turn on the lights".to_string()).unwrap(), &agents)
            .await
            .unwrap();

        assert_eq!(decision.primary_agent.to_string(), "light");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
