//! HTTP surface for the orchestrator: a single JSON-RPC endpoint plus the
//! health check and agent-card document.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain_types::{ContextId, RequestText, TaskId, TaskState};
use crate::orchestrator::{AgentRegistry, PromptCache, SessionStore, WorkflowDriver};
use crate::wire::{
    AgentCard, JsonRpcError, JsonRpcResponse, SendMessageParams, SendMessageResult, Task,
    TaskIdParams, TaskStatus, WireMessage,
};

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<WorkflowDriver>,
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<dyn AgentRegistry>,
    pub cache: Arc<dyn PromptCache>,
    pub card: Arc<AgentCard>,
}

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/.well-known/agent.json", get(agent_card))
        .route("/rpc", post(rpc))
        .route("/admin/agents", get(admin_agents))
        .route("/admin/cache/stats", get(admin_cache_stats))
        .route("/admin/sessions/{context_id}", get(admin_session))
        .with_state(state)
}

async fn agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json((*state.card).clone())
}

async fn admin_agents(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list().await.into_iter().map(|a| a.name.to_string()).collect())
}

async fn admin_cache_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache.stats();
    Json(json!({
        "entries": stats.entries,
        "exact_hits": stats.exact_hits,
        "semantic_hits": stats.semantic_hits,
        "misses": stats.misses,
    }))
}

async fn admin_session(
    State(state): State<AppState>,
    Path(context_id): Path<ContextId>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.store.get(context_id).await {
        Ok(Some(snapshot)) => Ok(Json(serde_json::to_value(&snapshot).unwrap_or(Value::Null))),
        Ok(None) => Err((StatusCode::NOT_FOUND, "no such session".to_string())),
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string())),
    }
}

async fn rpc(State(state): State<AppState>, Json(body): Json<Value>) -> Json<JsonRpcResponse> {
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = body.get("params").cloned().unwrap_or(Value::Null);

    let response = match method {
        "message/send" => handle_message_send(&state, params, id.clone()).await,
        "tasks/get" => handle_tasks_get(&state, params, id.clone()).await,
        "tasks/cancel" => handle_tasks_cancel(&state, params, id.clone()).await,
        other => {
            warn!(method = other, "unknown json-rpc method");
            JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("unknown method: {other}")))
        }
    };

    Json(response)
}

async fn handle_message_send(state: &AppState, params: Value, id: Value) -> JsonRpcResponse {
    let params: SendMessageParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(err) => {
            return JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, err.to_string()));
        }
    };

    let context_id = params.message.context_id.unwrap_or_else(ContextId::generate);
    let text = params.message.text();
    let request = match RequestText::try_new(text) {
        Ok(r) => r,
        Err(err) => {
            return JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, err.to_string()));
        }
    };

    match state
        .driver
        .handle_request(context_id, request, CancellationToken::new())
        .await
    {
        Ok(output) => {
            let result = match output.task_id {
                Some(task_id) => SendMessageResult::Task(Task {
                    id: task_id,
                    context_id,
                    status: TaskStatus {
                        state: output.state,
                        message: Some(WireMessage::agent_text(context_id, &output.reply.content)),
                        timestamp: chrono::Utc::now(),
                    },
                    history: vec![WireMessage::agent_text(context_id, &output.reply.content)],
                }),
                None => SendMessageResult::Message(WireMessage::agent_text(context_id, &output.reply.content)),
            };
            JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
        }
        Err(err) => JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, err.to_string())),
    }
}

async fn handle_tasks_get(state: &AppState, params: Value, id: Value) -> JsonRpcResponse {
    let params: TaskIdParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(err) => {
            return JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, err.to_string()));
        }
    };

    task_response(state, params.id, id).await
}

async fn handle_tasks_cancel(state: &AppState, params: Value, id: Value) -> JsonRpcResponse {
    let params: TaskIdParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(err) => {
            return JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, err.to_string()));
        }
    };

    if let Err(err) = state.driver.cancel_task(params.id).await {
        return JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, err.to_string()));
    }

    task_response(state, params.id, id).await
}

async fn task_response(state: &AppState, task_id: TaskId, id: Value) -> JsonRpcResponse {
    match state.store.get_task(task_id).await {
        Ok(Some(snapshot)) => {
            let task = Task {
                id: task_id,
                context_id: snapshot.context_id,
                status: TaskStatus {
                    state: snapshot.state,
                    message: snapshot.last_message,
                    timestamp: chrono::Utc::now(),
                },
                history: vec![],
            };
            JsonRpcResponse::success(id, serde_json::to_value(task).unwrap_or(json!({})))
        }
        Ok(None) => JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::TASK_NOT_FOUND, "no such task")),
        Err(err) => JsonRpcResponse::failure(id, JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, err.to_string())),
    }
}

/// Serve the application on the given listener
///
/// # Errors
///
/// Returns an error if the server cannot be started or fails during operation.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .await
        .map_err(std::io::Error::other)?;
    Ok(())
}

/// Serve the application with graceful shutdown handling
///
/// # Errors
///
/// Returns an error if the server cannot be started or fails during operation.
pub async fn serve_with_graceful_shutdown(
    listener: TcpListener,
    router: Router,
    shutdown_token: CancellationToken,
) -> Result<(), std::io::Error> {
    let shutdown_signal = async move {
        shutdown_token.cancelled().await;
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(std::io::Error::other)?;

    Ok(())
}

/// Binds to any available localhost port, for tests.
pub async fn start_server_on_available_port() -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    Ok((listener, actual_addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::domain_types::{AgentId, AgentName, CacheCapacity};
    use crate::orchestrator::invoker::AgentInvokerImpl;
    use crate::orchestrator::metrics::NoopMetricsCollector;
    use crate::orchestrator::prompt_cache::{DeterministicEmbeddingClient, PromptCacheImpl};
    use crate::orchestrator::registry::InProcessAgentRegistry;
    use crate::orchestrator::router::RouterExecutorImpl;
    use crate::orchestrator::session_store::InMemorySessionStore;
    use crate::orchestrator::traits::{
        AgentCapabilities, AgentDescriptor, AgentTransport, InvokerError, LlmClient,
        LlmRoutingResponse, LocalAgentHandler, NullEventSink, RouterError,
    };
    use crate::wire::{AgentCapabilities as WireCapabilities, AgentSkill, PreferredTransport};
    use async_trait::async_trait;
    use tokio::time::{Duration, timeout};

    struct EchoHandler;

    #[async_trait]
    impl LocalAgentHandler for EchoHandler {
        async fn handle(
            &self,
            request: &RequestText,
            _context_id: ContextId,
            _cancel: CancellationToken,
        ) -> Result<crate::orchestrator::traits::AgentResponse, InvokerError> {
            Ok(crate::orchestrator::traits::AgentResponse {
                agent: AgentName::try_new("light".to_string()).unwrap(),
                content: format!("Handled: {request}"),
                success: true,
                error: None,
                execution_time: crate::domain_types::ExecutionTime::from_duration(Duration::ZERO),
                needs_input: false,
                performed_action: true,
            })
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn route(
            &self,
            _request: &RequestText,
            _agents: &[AgentDescriptor],
        ) -> Result<LlmRoutingResponse, RouterError> {
            Ok(LlmRoutingResponse {
                agent_id: "light".to_string(),
                reasoning: "lighting request".to_string(),
                confidence: 0.95,
                additional_agents: vec![],
            })
        }
    }

    async fn test_state() -> AppState {
        let config = OrchestratorConfig::testing();
        let registry = Arc::new(InProcessAgentRegistry::default());
        registry
            .register(AgentDescriptor {
                id: AgentId::generate(),
                name: AgentName::try_new("light".to_string()).unwrap(),
                description: "controls lights".to_string(),
                transport: AgentTransport::Local,
                capabilities: crate::orchestrator::traits::AgentCapabilities::default(),
                priority: Default::default(),
            })
            .await
            .unwrap();

        let invoker = Arc::new(AgentInvokerImpl::new());
        invoker.register_local_handler(AgentName::try_new("light".to_string()).unwrap(), Arc::new(EchoHandler));

        let cache = Arc::new(PromptCacheImpl::new(
            Arc::new(DeterministicEmbeddingClient),
            CacheCapacity::try_new(100).unwrap(),
            0.92,
        ));
        let router = Arc::new(RouterExecutorImpl::new(
            cache.clone(),
            Arc::new(StubLlm),
            0.7,
            0.7,
            AgentName::try_new("general-assistant".to_string()).unwrap(),
            true,
        ));
        let store = Arc::new(InMemorySessionStore::new());

        let driver = Arc::new(WorkflowDriver::new(
            config,
            crate::orchestrator::WorkflowDependencies {
                store: store.clone(),
                registry: registry.clone(),
                router,
                invoker,
                cache: cache.clone(),
                events: Arc::new(NullEventSink),
                metrics: Arc::new(NoopMetricsCollector::new()),
            },
        ));

        AppState {
            driver,
            store,
            registry,
            cache,
            card: Arc::new(AgentCard {
                name: "hearthroute".to_string(),
                description: "home automation orchestrator".to_string(),
                url: "http://localhost".to_string(),
                preferred_transport: PreferredTransport::Jsonrpc,
                capabilities: WireCapabilities::default(),
                default_input_modes: vec!["text".to_string()],
                default_output_modes: vec!["text".to_string()],
                skills: vec![AgentSkill {
                    id: "route".to_string(),
                    name: "Route request".to_string(),
                    description: "Routes a request to the right agent".to_string(),
                }],
                version: "0.1.0".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn health_endpoint_responds_ok() {
        let (listener, addr) = start_server_on_available_port().await.unwrap();
        let router = create_router(test_state().await);
        let handle = tokio::spawn(async move { serve(listener, router).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = reqwest::Client::new();
        let response = timeout(Duration::from_secs(1), client.get(format!("http://{addr}/health")).send())
            .await
            .unwrap()
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.text().await.unwrap(), "OK");
        handle.abort();
    }

    #[tokio::test]
    async fn agent_card_is_published_at_well_known_path() {
        let (listener, addr) = start_server_on_available_port().await.unwrap();
        let router = create_router(test_state().await);
        let handle = tokio::spawn(async move { serve(listener, router).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = reqwest::Client::new();
        let response = timeout(
            Duration::from_secs(1),
            client.get(format!("http://{addr}/.well-known/agent.json")).send(),
        )
        .await
        .unwrap()
        .unwrap();
        let card: AgentCard = response.json().await.unwrap();
        assert_eq!(card.name, "hearthroute");
        handle.abort();
    }

    #[tokio::test]
    async fn message_send_routes_and_returns_a_completed_message() {
        let (listener, addr) = start_server_on_available_port().await.unwrap();
        let router = create_router(test_state().await);
        let handle = tokio::spawn(async move { serve(listener, router).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = reqwest::Client::new();
        let body = json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "id": 1,
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"kind": "text", "text": "turn on the kitchen lights"}],
                    "messageId": uuid::Uuid::new_v4().to_string(),
                    "kind": "message"
                }
            }
        });
        let response = timeout(
            Duration::from_secs(1),
            client.post(format!("http://{addr}/rpc")).json(&body).send(),
        )
        .await
        .unwrap()
        .unwrap();
        let value: Value = response.json().await.unwrap();
        assert!(value.get("error").is_none());
        assert!(value["result"]["parts"][0]["text"].as_str().unwrap().contains("Handled"));
        handle.abort();
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let (listener, addr) = start_server_on_available_port().await.unwrap();
        let router = create_router(test_state().await);
        let handle = tokio::spawn(async move { serve(listener, router).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = reqwest::Client::new();
        let body = json!({"jsonrpc": "2.0", "method": "bogus/method", "id": 2, "params": {}});
        let response = timeout(
            Duration::from_secs(1),
            client.post(format!("http://{addr}/rpc")).json(&body).send(),
        )
        .await
        .unwrap()
        .unwrap();
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["error"]["code"], JsonRpcError::METHOD_NOT_FOUND);
        handle.abort();
    }

    #[tokio::test]
    async fn tasks_get_on_an_unknown_task_returns_task_not_found() {
        let (listener, addr) = start_server_on_available_port().await.unwrap();
        let router = create_router(test_state().await);
        let handle = tokio::spawn(async move { serve(listener, router).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let client = reqwest::Client::new();
        let body = json!({
            "jsonrpc": "2.0",
            "method": "tasks/get",
            "id": 3,
            "params": {"id": uuid::Uuid::new_v4().to_string()}
        });
        let response = timeout(
            Duration::from_secs(1),
            client.post(format!("http://{addr}/rpc")).json(&body).send(),
        )
        .await
        .unwrap()
        .unwrap();
        let value: Value = response.json().await.unwrap();
        assert_eq!(value["error"]["code"], JsonRpcError::TASK_NOT_FOUND);
        handle.abort();
    }
}
