//! Domain types for the orchestration core
//!
//! This module defines strongly-typed domain values to prevent primitive obsession
//! and improve type safety throughout the codebase.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an agent
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct AgentId(Uuid);

impl AgentId {
    /// Creates a new random agent ID
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Name of an agent, used both as registry key and wire-visible identifier
#[nutype(
    validate(len_char_min = 1, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef,
        TryFrom,
        Into
    )
)]
pub struct AgentName(String);

/// Context identifier grouping turns into one conversation
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct ContextId(Uuid);

impl ContextId {
    /// Mints a fresh context identifier
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Task identifier addressing a long-running or interrogative unit of work
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct TaskId(Uuid);

impl TaskId {
    /// Mints a fresh task identifier
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier for a single wire-level message
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    TryFrom,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Mints a fresh message identifier
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Routing confidence, clamped to the closed unit interval
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, TryFrom, Into)
)]
pub struct Confidence(f64);

impl Confidence {
    /// Zero confidence, used for forced fallback routing
    pub fn zero() -> Self {
        Self::try_new(0.0).expect("0.0 is always a valid confidence")
    }

    /// Full confidence
    pub fn certain() -> Self {
        Self::try_new(1.0).expect("1.0 is always a valid confidence")
    }

    /// Gets the value as f64
    pub fn as_f64(&self) -> f64 {
        self.into_inner()
    }
}

/// Free-form request or agent reply text, bounded to keep prompts and
/// cache keys within sane limits
#[nutype(
    validate(len_char_min = 1, len_char_max = 8192),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef, TryFrom, Into)
)]
pub struct RequestText(String);

/// SHA-256 hex digest of a normalized prompt, used as the exact-match cache key
#[nutype(
    validate(len_char_min = 64, len_char_max = 64),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, TryFrom, Into)
)]
pub struct PromptHash(String);

/// Per-agent dispatch priority used to order the aggregator's composed reply;
/// lower sorts first
#[nutype(
    validate(greater_or_equal = 0, less_or_equal = 1000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct AgentPriority(u16);

impl AgentPriority {
    /// Gets the value as u16
    pub fn as_u16(&self) -> u16 {
        self.into_inner()
    }
}

/// A timeout duration bound to a sane operational range (1ms..=5min)
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 300_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TimeoutMs(u64);

impl TimeoutMs {
    /// Converts to a `std::time::Duration`
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }

    /// Gets the value as u64
    pub fn as_u64(&self) -> u64 {
        self.into_inner()
    }
}

/// A time-to-live in seconds for cache/session/task entries
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TtlSeconds(u64);

impl TtlSeconds {
    /// Converts to a `std::time::Duration`
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.into_inner())
    }
}

impl From<TtlSeconds> for TimeoutMs {
    /// Clamps a session/task TTL into the timeout range, for passing a TTL
    /// wherever a store signature expects a timeout.
    fn from(ttl: TtlSeconds) -> Self {
        let millis = ttl.as_duration().as_millis().min(300_000) as u64;
        TimeoutMs::try_new(millis.max(1)).unwrap_or_else(|_| TimeoutMs::try_new(300_000).unwrap())
    }
}

/// Bounded depth of the per-context request queue
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 8
)]
pub struct ContextQueueDepth(usize);

impl ContextQueueDepth {
    /// Gets the value as usize
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum number of cache entries retained by the prompt cache
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct CacheCapacity(usize);

impl CacheCapacity {
    /// Gets the value as usize
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Size of the SQLite connection pool backing the durable session store
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10
)]
pub struct ConnectionPoolSize(usize);

impl ConnectionPoolSize {
    /// Gets the value as usize
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Execution time duration wrapper, reported back on agent responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTime(Duration);

impl ExecutionTime {
    /// Creates a new execution time from a Duration
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Gets the inner Duration
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for ExecutionTime {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<ExecutionTime> for Duration {
    fn from(time: ExecutionTime) -> Self {
        time.0
    }
}

/// Lifecycle state of a durable task, mirroring the wire protocol's `status.state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Role of a single turn in a session transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Domain-level validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)] // Error variant fields are self-documenting through error messages
pub enum ValidationError {
    /// Invalid field value with descriptive reason
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Value is outside allowed range
    #[error("Value out of range: {value}, expected {min}-{max}")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },

    /// Required field is missing
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Domain constraint violation
    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },
}
