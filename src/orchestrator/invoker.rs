//! Agent invocation: a uniform call surface over local, remote, and keyed
//! agent transports, normalizing each into one `AgentResponse` shape.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

use crate::domain_types::{AgentName, ContextId, ExecutionTime, RequestText, TimeoutMs};
use crate::orchestrator::traits::{
    AgentDescriptor, AgentInvoker, AgentResponse, AgentTransport, InvokerError, LocalAgentHandler,
    ServiceLocator,
};

/// Default implementation of [`AgentInvoker`].
///
/// Local handlers are registered by name ahead of time; remote transports
/// are reached over `reqwest`; keyed transports resolve through a
/// [`ServiceLocator`] when one is configured, falling back to treating the
/// key as a local handler name directly when it isn't.
pub struct AgentInvokerImpl {
    local_handlers: DashMap<AgentName, Arc<dyn LocalAgentHandler>>,
    locator: RwLock<Option<Arc<dyn ServiceLocator>>>,
    http: reqwest::Client,
}

impl AgentInvokerImpl {
    pub fn new() -> Self {
        Self {
            local_handlers: DashMap::new(),
            locator: RwLock::new(None),
            http: reqwest::Client::new(),
        }
    }

    /// Registers the handler behind a `local` or `keyed` agent transport.
    pub fn register_local_handler(&self, name: AgentName, handler: Arc<dyn LocalAgentHandler>) {
        self.local_handlers.insert(name, handler);
    }

    /// Configures the locator used to resolve `keyed` transports.
    pub fn set_service_locator(&self, locator: Arc<dyn ServiceLocator>) {
        *self.locator.write().expect("service locator lock poisoned") = Some(locator);
    }

    async fn invoke_local(
        &self,
        name: &AgentName,
        request: &RequestText,
        context_id: ContextId,
        timeout: TimeoutMs,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<AgentResponse, InvokerError> {
        let handler = self
            .local_handlers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| InvokerError::Transport(format!("no local handler registered for {name}")))?;

        let started = Instant::now();
        let result = tokio::time::timeout(
            timeout.as_duration(),
            handler.handle(request, context_id, cancel),
        )
        .await;

        match result {
            Ok(Ok(mut response)) => {
                response.execution_time = ExecutionTime::from_duration(started.elapsed());
                Ok(response)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(InvokerError::Timeout(timeout.as_duration())),
        }
    }

    async fn invoke_remote(
        &self,
        descriptor: &AgentDescriptor,
        base_url: &str,
        request: &RequestText,
        context_id: ContextId,
        timeout: TimeoutMs,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<AgentResponse, InvokerError> {
        let started = Instant::now();
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{ "kind": "text", "text": request.to_string() }],
                    "messageId": uuid::Uuid::new_v4().to_string(),
                    "contextId": context_id.to_string(),
                    "kind": "message",
                }
            },
            "id": 1,
        });

        let send = self
            .http
            .post(format!("{base_url}/rpc"))
            .json(&body)
            .timeout(timeout.as_duration())
            .send();

        let response = tokio::select! {
            result = tokio::time::timeout(timeout.as_duration(), send) => {
                result
                    .map_err(|_| InvokerError::Timeout(timeout.as_duration()))?
                    .map_err(|e| InvokerError::Transport(e.to_string()))?
            }
            () = cancel.cancelled() => return Err(InvokerError::Cancelled),
        };

        let json: serde_json::Value = tokio::select! {
            result = response.json() => result.map_err(|e| InvokerError::Transport(e.to_string()))?,
            () = cancel.cancelled() => return Err(InvokerError::Cancelled),
        };

        classify_remote_reply(descriptor, json, ExecutionTime::from_duration(started.elapsed()))
    }
}

impl Default for AgentInvokerImpl {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a JSON-RPC `message/send` result onto an [`AgentResponse`], enforcing
/// that a non-final task state is only accepted from an agent that declared
/// long-running capability.
fn classify_remote_reply(
    descriptor: &AgentDescriptor,
    json: serde_json::Value,
    execution_time: ExecutionTime,
) -> Result<AgentResponse, InvokerError> {
    let result = json.get("result").cloned().unwrap_or(serde_json::Value::Null);

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("remote agent returned an error")
            .to_string();
        return Ok(AgentResponse::failed(descriptor.name.clone(), message, execution_time));
    }

    // Plain message reply.
    if result.get("status").is_none() {
        let content = extract_text(&result);
        return Ok(AgentResponse {
            agent: descriptor.name.clone(),
            content,
            success: true,
            error: None,
            execution_time,
            needs_input: false,
            performed_action: false,
        });
    }

    // Task reply.
    let state = result["status"]["state"].as_str().unwrap_or("");
    let message = result["status"]["message"].clone();
    let content = extract_text(&message);

    match state {
        "input-required" => Ok(AgentResponse {
            agent: descriptor.name.clone(),
            content,
            success: true,
            error: None,
            execution_time,
            needs_input: true,
            performed_action: false,
        }),
        "working" => {
            if !descriptor.capabilities.long_running {
                return Err(InvokerError::ContractViolation);
            }
            Ok(AgentResponse {
                agent: descriptor.name.clone(),
                content,
                success: true,
                error: None,
                execution_time,
                needs_input: false,
                performed_action: true,
            })
        }
        "completed" => Ok(AgentResponse {
            agent: descriptor.name.clone(),
            content,
            success: true,
            error: None,
            execution_time,
            needs_input: false,
            performed_action: false,
        }),
        other => Ok(AgentResponse::failed(
            descriptor.name.clone(),
            format!("unexpected task state from remote agent: {other}"),
            execution_time,
        )),
    }
}

fn extract_text(message: &serde_json::Value) -> String {
    message
        .get("parts")
        .and_then(|parts| parts.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl AgentInvoker for AgentInvokerImpl {
    async fn invoke(
        &self,
        descriptor: &AgentDescriptor,
        request: &RequestText,
        context_id: ContextId,
        timeout: TimeoutMs,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<AgentResponse, InvokerError> {
        if cancel.is_cancelled() {
            return Err(InvokerError::Cancelled);
        }

        let result = match &descriptor.transport {
            AgentTransport::Local => {
                self.invoke_local(&descriptor.name, request, context_id, timeout, cancel)
                    .await
            }
            AgentTransport::Remote { base_url } => {
                self.invoke_remote(descriptor, base_url, request, context_id, timeout, cancel)
                    .await
            }
            AgentTransport::Keyed { key } => {
                let locator = self
                    .locator
                    .read()
                    .expect("service locator lock poisoned")
                    .clone();
                let resolved = match locator {
                    Some(locator) => locator.resolve(key).await,
                    None => AgentName::try_new(key.clone()).ok(),
                };
                let Some(name) = resolved else {
                    return Err(InvokerError::Transport(format!(
                        "keyed agent could not be resolved: {key}"
                    )));
                };
                self.invoke_local(&name, request, context_id, timeout, cancel)
                    .await
            }
        };

        match &result {
            Ok(response) => debug!(agent = %descriptor.name, success = response.success, "agent invocation completed"),
            Err(err) => warn!(agent = %descriptor.name, error = %err, "agent invocation failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{AgentId, AgentPriority};
    use crate::orchestrator::traits::{AgentCapabilities, ServiceLocator};

    /// A locator that resolves one fixed key to one fixed agent name,
    /// standing in for a registry-backed locator without pulling in the
    /// registry implementation.
    struct FixedLocator {
        key: String,
        resolves_to: Option<AgentName>,
    }

    #[async_trait]
    impl ServiceLocator for FixedLocator {
        async fn resolve(&self, key: &str) -> Option<AgentName> {
            if key == self.key {
                self.resolves_to.clone()
            } else {
                None
            }
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl LocalAgentHandler for EchoHandler {
        async fn handle(
            &self,
            request: &RequestText,
            _context_id: ContextId,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Result<AgentResponse, InvokerError> {
            Ok(AgentResponse {
                agent: AgentName::try_new("echo".to_string()).unwrap(),
                content: request.to_string(),
                success: true,
                error: None,
                execution_time: ExecutionTime::from_duration(std::time::Duration::ZERO),
                needs_input: false,
                performed_action: false,
            })
        }
    }

    struct HangingHandler;

    #[async_trait]
    impl LocalAgentHandler for HangingHandler {
        async fn handle(
            &self,
            _request: &RequestText,
            _context_id: ContextId,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Result<AgentResponse, InvokerError> {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            unreachable!("should have timed out first")
        }
    }

    fn descriptor(name: &str) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::generate(),
            name: AgentName::try_new(name.to_string()).unwrap(),
            description: String::new(),
            transport: AgentTransport::Local,
            capabilities: AgentCapabilities::default(),
            priority: AgentPriority::default(),
        }
    }

    #[tokio::test]
    async fn local_invocation_returns_handler_response() {
        let invoker = AgentInvokerImpl::new();
        invoker.register_local_handler(
            AgentName::try_new("echo".to_string()).unwrap(),
            Arc::new(EchoHandler),
        );
        let response = invoker
            .invoke(
                &descriptor("echo"),
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn missing_local_handler_yields_transport_error() {
        let invoker = AgentInvokerImpl::new();
        let result = invoker
            .invoke(
                &descriptor("missing"),
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Transport(_))));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let invoker = AgentInvokerImpl::new();
        invoker.register_local_handler(
            AgentName::try_new("slow".to_string()).unwrap(),
            Arc::new(HangingHandler),
        );
        let result = invoker
            .invoke(
                &descriptor("slow"),
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(10).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Timeout(_))));
    }

    #[tokio::test]
    async fn keyed_transport_resolves_through_the_configured_locator() {
        let invoker = AgentInvokerImpl::new();
        invoker.register_local_handler(
            AgentName::try_new("echo".to_string()).unwrap(),
            Arc::new(EchoHandler),
        );
        invoker.set_service_locator(Arc::new(FixedLocator {
            key: "registry-key-for-echo".to_string(),
            resolves_to: Some(AgentName::try_new("echo".to_string()).unwrap()),
        }));

        let mut keyed = descriptor("keyed-echo");
        keyed.transport = AgentTransport::Keyed {
            key: "registry-key-for-echo".to_string(),
        };
        let response = invoker
            .invoke(
                &keyed,
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn keyed_transport_without_a_locator_falls_back_to_treating_the_key_as_a_handler_name() {
        let invoker = AgentInvokerImpl::new();
        invoker.register_local_handler(
            AgentName::try_new("echo".to_string()).unwrap(),
            Arc::new(EchoHandler),
        );

        let mut keyed = descriptor("keyed-echo");
        keyed.transport = AgentTransport::Keyed { key: "echo".to_string() };
        let response = invoker
            .invoke(
                &keyed,
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn keyed_transport_an_unresolvable_key_is_a_transport_error() {
        let invoker = AgentInvokerImpl::new();
        invoker.set_service_locator(Arc::new(FixedLocator {
            key: "registry-key-for-echo".to_string(),
            resolves_to: None,
        }));

        let mut keyed = descriptor("keyed-echo");
        keyed.transport = AgentTransport::Keyed {
            key: "registry-key-for-echo".to_string(),
        };
        let result = invoker
            .invoke(
                &keyed,
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                tokio_util::sync::CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Transport(_))));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let invoker = AgentInvokerImpl::new();
        invoker.register_local_handler(
            AgentName::try_new("echo".to_string()).unwrap(),
            Arc::new(EchoHandler),
        );
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let result = invoker
            .invoke(
                &descriptor("echo"),
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                cancel,
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits_remote_invocation() {
        let invoker = AgentInvokerImpl::new();
        let mut remote = descriptor("remote-agent");
        remote.transport = AgentTransport::Remote {
            base_url: "http://127.0.0.1:1".to_string(),
        };
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let result = invoker
            .invoke(
                &remote,
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(1_000).unwrap(),
                cancel,
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelling_mid_flight_abandons_a_hanging_remote_call() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        // Accepts the connection but never writes a response, so the request
        // would otherwise hang until the timeout.
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                let _socket = socket;
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        let invoker = AgentInvokerImpl::new();
        let mut remote = descriptor("remote-agent");
        remote.transport = AgentTransport::Remote { base_url };
        let cancel = tokio_util::sync::CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let result = invoker
            .invoke(
                &remote,
                &RequestText::try_new("hello".to_string()).unwrap(),
                ContextId::generate(),
                TimeoutMs::try_new(2_000).unwrap(),
                cancel,
            )
            .await;
        assert!(matches!(result, Err(InvokerError::Cancelled)));
    }

    #[test]
    fn classify_remote_reply_rejects_working_state_without_long_running_capability() {
        let mut descriptor = descriptor("no-long-running");
        descriptor.capabilities.long_running = false;
        let json = serde_json::json!({
            "result": { "status": { "state": "working", "message": { "parts": [] } } }
        });
        let result = classify_remote_reply(&descriptor, json, ExecutionTime::from_duration(std::time::Duration::ZERO));
        assert!(matches!(result, Err(InvokerError::ContractViolation)));
    }

    #[test]
    fn classify_remote_reply_accepts_input_required_state() {
        let descriptor = descriptor("clarifier");
        let json = serde_json::json!({
            "result": {
                "status": {
                    "state": "input-required",
                    "message": { "parts": [{ "kind": "text", "text": "which light?" }] }
                }
            }
        });
        let response =
            classify_remote_reply(&descriptor, json, ExecutionTime::from_duration(std::time::Duration::ZERO))
                .unwrap();
        assert!(response.needs_input);
        assert_eq!(response.content, "which light?");
    }
}
