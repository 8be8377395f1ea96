//! Trait seams for every subsystem of the orchestration core, plus their
//! error taxonomies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain_types::{
    AgentId, AgentName, AgentPriority, Confidence, ContextId, ExecutionTime, PromptHash,
    RequestText, TaskId, TaskState, TimeoutMs,
};
use crate::wire::WireMessage;

// ---------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

/// One turn of a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: crate::domain_types::TurnRole,
    pub content: String,
}

/// Durable per-context conversation state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub turns: Vec<Turn>,
}

/// Durable per-task continuation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub context_id: ContextId,
    pub state: TaskState,
    pub last_message: Option<WireMessage>,
    /// Agent-private continuation data, opaque to the core.
    pub continuation: Option<serde_json::Value>,
}

/// Key-value persistence of session and task state, abstracted over an
/// in-memory or durable backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, context_id: ContextId) -> Result<Option<SessionSnapshot>, SessionStoreError>;
    async fn put(
        &self,
        context_id: ContextId,
        snapshot: SessionSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError>;
    async fn delete(&self, context_id: ContextId) -> Result<(), SessionStoreError>;

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskSnapshot>, SessionStoreError>;
    async fn put_task(
        &self,
        task_id: TaskId,
        snapshot: TaskSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError>;
}

// ---------------------------------------------------------------------
// Agent registry
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("agent not found: {name}")]
    NotFound { name: String },
}

/// How an agent is reached
#[derive(Debug, Clone)]
pub enum AgentTransport {
    /// A handler object resident in this process
    Local,
    /// A peer reachable over JSON-RPC at this base URL
    Remote { base_url: String },
    /// Resolved through the registry itself at call time, by name
    Keyed { key: String },
}

/// Declared capability flags, carried over from an agent card
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentCapabilities {
    pub long_running: bool,
    pub state_transition_history: bool,
}

/// A registered agent's public metadata
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: AgentName,
    pub description: String,
    pub transport: AgentTransport,
    pub capabilities: AgentCapabilities,
    pub priority: AgentPriority,
}

/// A filter over [`AgentCapabilities`], used to narrow a registry query to
/// agents declaring a particular capability. `None` means "don't care".
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityFilter {
    pub long_running: Option<bool>,
    pub state_transition_history: Option<bool>,
}

impl CapabilityFilter {
    fn matches(self, capabilities: AgentCapabilities) -> bool {
        self.long_running.is_none_or(|want| want == capabilities.long_running)
            && self
                .state_transition_history
                .is_none_or(|want| want == capabilities.state_transition_history)
    }
}

/// Set of known agents: registration, lookup, and capability query.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn register(&self, descriptor: AgentDescriptor) -> Result<(), RegistryError>;
    async fn unregister(&self, name: &AgentName) -> Result<(), RegistryError>;
    async fn get(&self, name: &AgentName) -> Option<AgentDescriptor>;
    async fn list(&self) -> Vec<AgentDescriptor>;

    /// Lists every registered agent whose capabilities match `filter`.
    async fn find_by_capability(&self, filter: CapabilityFilter) -> Vec<AgentDescriptor>;
}

// ---------------------------------------------------------------------
// Agent invoker
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("agent call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("agent declared no long-running capability but returned a non-final task state")]
    ContractViolation,

    #[error("request was cancelled")]
    Cancelled,
}

/// Normalized shape of a single agent's reply, regardless of transport
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub agent: AgentName,
    pub content: String,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time: ExecutionTime,
    pub needs_input: bool,
    pub performed_action: bool,
}

impl AgentResponse {
    pub fn failed(agent: AgentName, error: impl Into<String>, execution_time: ExecutionTime) -> Self {
        Self {
            agent,
            content: String::new(),
            success: false,
            error: Some(error.into()),
            execution_time,
            needs_input: false,
            performed_action: false,
        }
    }
}

/// The handler behind a **local** agent transport: an in-process function
/// taking a request and producing a response.
#[async_trait]
pub trait LocalAgentHandler: Send + Sync {
    async fn handle(
        &self,
        request: &RequestText,
        context_id: ContextId,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<AgentResponse, InvokerError>;
}

/// Uniform call surface over local, remote, and keyed agent transports.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &AgentDescriptor,
        request: &RequestText,
        context_id: ContextId,
        timeout: TimeoutMs,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<AgentResponse, InvokerError>;
}

/// Resolves a keyed transport's registry key to the local handler that
/// should serve it. A small indirection over the [`AgentRegistry`], so the
/// invoker itself does not need to own separate locator infrastructure.
#[async_trait]
pub trait ServiceLocator: Send + Sync {
    async fn resolve(&self, key: &str) -> Option<AgentName>;
}

// ---------------------------------------------------------------------
// Prompt cache
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("embedding computation failed: {0}")]
    Embedding(String),

    #[error("cache persistence failed: {0}")]
    Persistence(String),
}

/// Provenance of a routing decision: freshly routed, or recalled from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheProvenance {
    None,
    Exact,
    Semantic,
}

/// A decision recalled from, or destined for, the prompt cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub primary_agent: AgentName,
    pub additional_agents: Vec<AgentName>,
    pub confidence: Confidence,
    pub reasoning: String,
    pub provenance: CacheProvenance,
}

/// Computes a vector embedding for normalized prompt text, used by the
/// prompt cache's semantic-match fallback.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, normalized_text: &str) -> Result<Vec<f32>, CacheError>;
}

/// Exact-hash plus semantic-similarity lookup from normalized prompt text to
/// a previously computed routing decision.
#[async_trait]
pub trait PromptCache: Send + Sync {
    async fn lookup(&self, prompt: &RequestText) -> Option<RoutingDecision>;
    async fn store(&self, prompt: &RequestText, decision: RoutingDecision);
    fn stats(&self) -> PromptCacheStats;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptCacheStats {
    pub entries: usize,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
}

/// Internal representation of one cached entry, exposed for cache admin
/// tooling.
#[derive(Debug, Clone)]
pub struct CachedPromptEntry {
    pub normalized_text: String,
    pub hash: PromptHash,
    pub embedding: Vec<f32>,
    pub decision: RoutingDecision,
    pub hit_count: u64,
}

// ---------------------------------------------------------------------
// Router executor
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("language model call timed out")]
    Timeout,

    #[error("language model call failed: {0}")]
    ModelUnavailable(String),

    #[error("request is ambiguous and needs clarification")]
    NeedsClarification { reasoning: String },
}

/// Structured routing response as produced by the language model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRoutingResponse {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(rename = "additionalAgents", default)]
    pub additional_agents: Vec<String>,
}

/// Language-model client used by the router to classify a request against
/// the available agent descriptors.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn route(
        &self,
        request: &RequestText,
        agents: &[AgentDescriptor],
    ) -> Result<LlmRoutingResponse, RouterError>;
}

/// Produces a routing decision for a request given the current registry
/// snapshot, consulting the prompt cache first.
#[async_trait]
pub trait RouterExecutor: Send + Sync {
    async fn route(
        &self,
        request: &RequestText,
        agents: &[AgentDescriptor],
    ) -> Result<RoutingDecision, RouterError>;
}

// ---------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("no branches were dispatched")]
    NoBranches,
}

/// The aggregator's final, user-visible composition
#[derive(Debug, Clone)]
pub struct AggregatedReply {
    pub content: String,
    pub interrogative: bool,
    pub performed_action: bool,
    pub long_running: bool,
    pub failed_agents: Vec<(AgentName, String)>,
}

/// Collects per-agent responses and composes one unified reply.
pub trait ResultAggregator: Send + Sync {
    fn aggregate(
        &self,
        responses: &[AgentResponse],
        priorities: &dyn Fn(&AgentName) -> AgentPriority,
        long_running: &dyn Fn(&AgentName) -> bool,
    ) -> Result<AggregatedReply, AggregatorError>;
}

// ---------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("per-context request queue is full")]
    ContextQueueFull,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Store(#[from] SessionStoreError),

    #[error("request was cancelled")]
    Cancelled,
}

/// A lifecycle event emitted as the workflow progresses, for tests and an
/// observability sink; also emitted as a `tracing` event at the call site.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RoutingCompleted {
        context_id: ContextId,
        decision: RoutingDecisionSummary,
    },
    BranchStarted {
        context_id: ContextId,
        agent: AgentName,
    },
    BranchCompleted {
        context_id: ContextId,
        agent: AgentName,
        success: bool,
    },
    WorkflowOutput {
        context_id: ContextId,
        task_id: Option<TaskId>,
    },
}

/// A cheaply cloned summary of a routing decision, for event payloads
#[derive(Debug, Clone)]
pub struct RoutingDecisionSummary {
    pub primary_agent: AgentName,
    pub additional_agents: Vec<AgentName>,
    pub confidence: Confidence,
    pub cache_sourced: bool,
}

impl From<&RoutingDecision> for RoutingDecisionSummary {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            primary_agent: decision.primary_agent.clone(),
            additional_agents: decision.additional_agents.clone(),
            confidence: decision.confidence,
            cache_sourced: decision.provenance != CacheProvenance::None,
        }
    }
}

/// Sink for structured workflow lifecycle events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// A no-op event sink for tests that don't care about observability
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: WorkflowEvent) {}
}

/// A sink that records every event, for assertions in integration tests
#[derive(Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<WorkflowEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: WorkflowEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Event sink that logs each event as a structured `tracing` record; the
/// default sink for running servers.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::RoutingCompleted { context_id, decision } => {
                tracing::info!(
                    %context_id,
                    primary_agent = %decision.primary_agent,
                    confidence = decision.confidence.as_f64(),
                    cache_sourced = decision.cache_sourced,
                    "routing completed"
                );
            }
            WorkflowEvent::BranchStarted { context_id, agent } => {
                tracing::debug!(%context_id, %agent, "branch started");
            }
            WorkflowEvent::BranchCompleted { context_id, agent, success } => {
                tracing::debug!(%context_id, %agent, success, "branch completed");
            }
            WorkflowEvent::WorkflowOutput { context_id, task_id } => {
                tracing::info!(%context_id, ?task_id, "workflow output produced");
            }
        }
    }
}
