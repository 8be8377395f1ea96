//! Orchestration core: routes a natural-language request to one or more
//! agents, fans out concurrently, and composes their replies into one
//! reply back to the caller.
//!
//! ## Components
//!
//! - [`traits`]: the trait seams and error taxonomy shared by every piece
//! - [`session_store`]: durable per-context/per-task state, in-memory or SQLite
//! - [`registry`]: the in-process agent directory
//! - [`invoker`]: uniform dispatch over local, remote, and keyed transports
//! - [`prompt_cache`]: exact and semantic routing-decision cache
//! - [`router`]: cache-first, LLM-backed routing decisions
//! - [`wrapper`]: per-branch invocation wrapper that never propagates an error
//! - [`aggregator`]: priority-ordered composition of branch responses
//! - [`metrics`]: a placeholder observability seam
//! - [`driver`]: the end-to-end pipeline tying everything above together

pub mod aggregator;
pub mod driver;
pub mod invoker;
pub mod llm_client;
pub mod metrics;
pub mod prompt_cache;
pub mod registry;
pub mod router;
pub mod session_store;
pub mod traits;
pub mod wrapper;

pub use aggregator::ResultAggregatorImpl;
pub use driver::{WorkflowDependencies, WorkflowDriver, WorkflowOutput};
pub use invoker::AgentInvokerImpl;
pub use llm_client::{HttpEmbeddingClient, HttpLlmClient};
pub use metrics::{MetricsCollector, NoopMetricsCollector};
pub use prompt_cache::PromptCacheImpl;
pub use registry::InProcessAgentRegistry;
pub use router::RouterExecutorImpl;
pub use session_store::{InMemorySessionStore, SqliteSessionStore};
pub use traits::*;
pub use wrapper::AgentExecutorWrapper;
