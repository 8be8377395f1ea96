//! # hearthroute — a multi-agent orchestration runtime for home automation
//!
//! hearthroute takes a natural-language request ("dim the living room and
//! play something relaxing"), routes it to the agents that can act on it,
//! fans out concurrently, and composes their replies into one answer.
//!
//! ## Core components
//!
//! - **Session store**: durable per-conversation and per-task state, backed
//!   by an in-memory map or SQLite ([`orchestrator::SessionStore`])
//! - **Agent registry**: O(1) lookup of registered agents and their
//!   declared capabilities ([`orchestrator::AgentRegistry`])
//! - **Prompt cache**: exact and semantic-similarity cache of routing
//!   decisions, so repeated phrasing skips the language model
//!   ([`orchestrator::PromptCache`])
//! - **Router**: decides which agent(s) a request goes to, falling back to
//!   a default agent or asking the user to clarify
//!   ([`orchestrator::RouterExecutor`])
//! - **Workflow driver**: the single entry point tying routing, fan-out,
//!   and aggregation together, gated by a bounded per-context request
//!   queue ([`orchestrator::WorkflowDriver`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hearthroute::config::OrchestratorConfig;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = OrchestratorConfig::development();
//! # }
//! ```

pub mod config;
pub mod database;
pub mod domain_types;
pub mod orchestrator;
pub mod server;
pub mod wire;

// Common imports, following this crate's conventions
pub use ::tracing::{debug, error, info, instrument, warn};
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use std::collections::HashMap;
pub use std::time::Duration;
pub use thiserror::Error;
pub use tokio::time::timeout;
pub use uuid::Uuid;
