//! Orchestrator configuration for development and production environments
//!
//! Provides pre-configured settings optimized for different deployment scenarios
//! with validation and builder pattern support.

use crate::domain_types::{
    AgentName, AgentPriority, CacheCapacity, ContextQueueDepth, TimeoutMs, TtlSeconds,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

/// Per-agent overrides keyed by registered agent name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub timeout_ms: TimeoutMs,
    pub priority: AgentPriority,
    pub long_running: bool,
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    // Request-level timing
    pub request_timeout_ms: TimeoutMs,
    pub router_timeout_ms: TimeoutMs,
    pub default_agent_timeout_ms: TimeoutMs,

    // Router
    pub router_confidence_floor: f64,
    pub cache_admission_confidence: f64,

    // Prompt cache
    pub cache_enabled: bool,
    pub cache_max_entries: CacheCapacity,
    pub cache_similarity_threshold: f64,
    pub cache_ttl_seconds: Option<TtlSeconds>,

    // Per-context concurrency
    pub context_queue_depth: ContextQueueDepth,

    // Durability
    pub session_ttl_seconds: TtlSeconds,
    pub task_ttl_seconds: TtlSeconds,
    pub enable_persistence: bool,
    pub storage_path: Option<PathBuf>,

    // Fallback
    pub fallback_agent: AgentName,

    // Observability
    pub enable_detailed_logs: bool,

    // Router model endpoints
    pub llm_endpoint: String,
    pub embedding_endpoint: String,

    // Per-agent overrides
    pub agents: HashMap<String, AgentConfig>,
}

impl OrchestratorConfig {
    /// Creates a development configuration optimized for debugging
    ///
    /// # Panics
    /// Panics if any of the hardcoded values are out of range for their domain types
    pub fn development() -> Self {
        Self {
            request_timeout_ms: TimeoutMs::try_new(15_000).unwrap(),
            router_timeout_ms: TimeoutMs::try_new(5_000).unwrap(),
            default_agent_timeout_ms: TimeoutMs::try_new(5_000).unwrap(),

            router_confidence_floor: 0.5,
            cache_admission_confidence: 0.6,

            cache_enabled: true,
            cache_max_entries: CacheCapacity::try_new(500).unwrap(),
            cache_similarity_threshold: 0.90,
            cache_ttl_seconds: None,

            context_queue_depth: ContextQueueDepth::try_new(8).unwrap(),

            session_ttl_seconds: TtlSeconds::try_new(86_400).unwrap(),
            task_ttl_seconds: TtlSeconds::try_new(172_800).unwrap(),
            enable_persistence: false,
            storage_path: None,

            fallback_agent: AgentName::try_new("general-assistant".to_string()).unwrap(),

            enable_detailed_logs: true,

            llm_endpoint: "http://localhost:9100/route".to_string(),
            embedding_endpoint: "http://localhost:9100/embed".to_string(),

            agents: HashMap::new(),
        }
    }

    /// Creates a production configuration prioritizing reliability and
    /// conservative routing behavior
    ///
    /// # Panics
    /// Panics if any of the hardcoded values are out of range for their domain types
    pub fn production() -> Self {
        Self {
            request_timeout_ms: TimeoutMs::try_new(5_000).unwrap(),
            router_timeout_ms: TimeoutMs::try_new(1_000).unwrap(),
            default_agent_timeout_ms: TimeoutMs::try_new(2_000).unwrap(),

            router_confidence_floor: 0.7,
            cache_admission_confidence: 0.7,

            cache_enabled: true,
            cache_max_entries: CacheCapacity::try_new(5_000).unwrap(),
            cache_similarity_threshold: 0.92,
            cache_ttl_seconds: Some(TtlSeconds::try_new(2_592_000).unwrap()), // 30 days

            context_queue_depth: ContextQueueDepth::try_new(8).unwrap(),

            session_ttl_seconds: TtlSeconds::try_new(86_400).unwrap(),
            task_ttl_seconds: TtlSeconds::try_new(172_800).unwrap(),
            enable_persistence: true,
            storage_path: Some(PathBuf::from("./data/hearthroute.db")),

            fallback_agent: AgentName::try_new("general-assistant".to_string()).unwrap(),

            enable_detailed_logs: false,

            llm_endpoint: "http://router.internal:9100/route".to_string(),
            embedding_endpoint: "http://router.internal:9100/embed".to_string(),

            agents: HashMap::new(),
        }
    }

    /// Creates a configuration builder starting from development defaults
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::new()
    }

    /// Creates a configuration suitable for tests: in-memory, fast timeouts,
    /// no cache TTL sweeps racing assertions
    pub fn testing() -> Self {
        Self {
            request_timeout_ms: TimeoutMs::try_new(2_000).unwrap(),
            router_timeout_ms: TimeoutMs::try_new(500).unwrap(),
            default_agent_timeout_ms: TimeoutMs::try_new(500).unwrap(),

            router_confidence_floor: 0.5,
            cache_admission_confidence: 0.5,

            cache_enabled: true,
            cache_max_entries: CacheCapacity::try_new(50).unwrap(),
            cache_similarity_threshold: 0.92,
            cache_ttl_seconds: None,

            context_queue_depth: ContextQueueDepth::try_new(4).unwrap(),

            session_ttl_seconds: TtlSeconds::try_new(300).unwrap(),
            task_ttl_seconds: TtlSeconds::try_new(300).unwrap(),
            enable_persistence: false,
            storage_path: None,

            fallback_agent: AgentName::try_new("general-assistant".to_string()).unwrap(),

            enable_detailed_logs: false,

            llm_endpoint: "http://localhost:9100/route".to_string(),
            embedding_endpoint: "http://localhost:9100/embed".to_string(),

            agents: HashMap::new(),
        }
    }

    /// Validates the configuration for internal consistency
    ///
    /// # Errors
    /// Returns `ConfigError` if any configuration values are inconsistent or invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router_confidence_floor < 0.0 || self.router_confidence_floor > 1.0 {
            return Err(ConfigError::ValidationError {
                field: "router_confidence_floor".to_string(),
                reason: "Must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.cache_similarity_threshold < 0.0 || self.cache_similarity_threshold > 1.0 {
            return Err(ConfigError::ValidationError {
                field: "cache_similarity_threshold".to_string(),
                reason: "Must be between 0.0 and 1.0".to_string(),
            });
        }

        // Per-agent timeout must leave room for the aggregator to compose
        // a reply before the overall request deadline fires.
        const AGGREGATION_MARGIN_MS: u64 = 200;
        if self.default_agent_timeout_ms.as_u64() + AGGREGATION_MARGIN_MS
            >= self.request_timeout_ms.as_u64()
        {
            return Err(ConfigError::ValidationError {
                field: "default_agent_timeout_ms".to_string(),
                reason: format!(
                    "Must be at least {AGGREGATION_MARGIN_MS}ms less than request_timeout_ms"
                ),
            });
        }

        if self.router_timeout_ms.as_u64() >= self.request_timeout_ms.as_u64() {
            return Err(ConfigError::ValidationError {
                field: "router_timeout_ms".to_string(),
                reason: "Must be less than request_timeout_ms".to_string(),
            });
        }

        for (name, agent) in &self.agents {
            if agent.timeout_ms.as_u64() + AGGREGATION_MARGIN_MS >= self.request_timeout_ms.as_u64()
            {
                return Err(ConfigError::ValidationError {
                    field: format!("agents.{name}.timeout_ms"),
                    reason: format!(
                        "Must be at least {AGGREGATION_MARGIN_MS}ms less than request_timeout_ms"
                    ),
                });
            }
        }

        if self.enable_persistence && self.storage_path.is_none() {
            return Err(ConfigError::ValidationError {
                field: "storage_path".to_string(),
                reason: "Must specify storage path when persistence is enabled".to_string(),
            });
        }

        Ok(())
    }

    /// Saves configuration to a JSON file
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration cannot be serialized or the
    /// file cannot be written.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads configuration from a JSON file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, its contents are
    /// not valid JSON, or the resulting configuration fails validation.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Looks up the configured timeout for an agent, falling back to the default
    pub fn agent_timeout(&self, agent: &str) -> TimeoutMs {
        self.agents
            .get(agent)
            .map_or(self.default_agent_timeout_ms, |a| a.timeout_ms)
    }

    /// Looks up the configured priority for an agent, falling back to the
    /// unlisted-tier default
    pub fn agent_priority(&self, agent: &str) -> AgentPriority {
        self.agents
            .get(agent)
            .map_or_else(AgentPriority::default, |a| a.priority)
    }

    /// Looks up whether an agent is declared long-running, defaulting to
    /// `false` for unlisted agents
    pub fn agent_long_running(&self, agent: &str) -> bool {
        self.agents.get(agent).is_some_and(|a| a.long_running)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Builder for custom orchestrator configurations
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Creates a new builder starting with development defaults
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::development(),
        }
    }

    /// Sets the overall per-request deadline
    #[must_use]
    pub fn request_timeout_ms(mut self, timeout: TimeoutMs) -> Self {
        self.config.request_timeout_ms = timeout;
        self
    }

    /// Sets the router's own call deadline
    #[must_use]
    pub fn router_timeout_ms(mut self, timeout: TimeoutMs) -> Self {
        self.config.router_timeout_ms = timeout;
        self
    }

    /// Sets the default per-agent call deadline
    #[must_use]
    pub fn default_agent_timeout_ms(mut self, timeout: TimeoutMs) -> Self {
        self.config.default_agent_timeout_ms = timeout;
        self
    }

    /// Sets the minimum router confidence accepted without clarification
    #[must_use]
    pub fn router_confidence_floor(mut self, floor: f64) -> Self {
        self.config.router_confidence_floor = floor;
        self
    }

    /// Enables or disables the prompt cache
    #[must_use]
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    /// Sets the prompt cache's maximum entry count
    #[must_use]
    pub fn cache_max_entries(mut self, capacity: CacheCapacity) -> Self {
        self.config.cache_max_entries = capacity;
        self
    }

    /// Sets the depth of the per-context queue
    #[must_use]
    pub fn context_queue_depth(mut self, depth: ContextQueueDepth) -> Self {
        self.config.context_queue_depth = depth;
        self
    }

    /// Sets the fallback agent name used when routing cannot proceed normally
    #[must_use]
    pub fn fallback_agent(mut self, agent: AgentName) -> Self {
        self.config.fallback_agent = agent;
        self
    }

    /// Enables persistent (SQLite-backed) session and task storage at the
    /// given path
    #[must_use]
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.config.enable_persistence = true;
        self.config.storage_path = Some(path);
        self
    }

    /// Sets the routing completion endpoint
    #[must_use]
    pub fn llm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.llm_endpoint = endpoint.into();
        self
    }

    /// Sets the embedding endpoint backing the prompt cache's semantic fallback
    #[must_use]
    pub fn embedding_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.embedding_endpoint = endpoint.into();
        self
    }

    /// Registers a per-agent override
    #[must_use]
    pub fn agent(mut self, name: impl Into<String>, agent_config: AgentConfig) -> Self {
        self.config.agents.insert(name.into(), agent_config);
        self
    }

    /// Finalizes the configuration, validating it
    ///
    /// # Errors
    /// Returns `ConfigError` if the resulting configuration is inconsistent
    pub fn build(self) -> Result<OrchestratorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for OrchestratorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
