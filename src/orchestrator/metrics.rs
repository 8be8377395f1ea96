//! Metrics collection seam for the orchestration core.
//!
//! Kept deliberately no-op for now; dashboards and exporters are out of
//! scope. The trait exists so a Prometheus- or OTel-backed collector can be
//! dropped in later without touching the driver.

use std::time::Duration;

use crate::domain_types::AgentName;
use crate::orchestrator::traits::{CacheProvenance, DriverError};

/// Observes workflow-level counters and timings.
pub trait MetricsCollector: Send + Sync {
    fn record_request_routed(&self, primary_agent: &AgentName, provenance: CacheProvenance, duration: Duration);
    fn record_branch_completed(&self, agent: &AgentName, success: bool, duration: Duration);
    fn record_workflow_error(&self, error: &DriverError);
    fn record_context_queue_rejected(&self);
}

/// Placeholder metrics collector implementation.
pub struct NoopMetricsCollector;

impl NoopMetricsCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for NoopMetricsCollector {
    fn record_request_routed(&self, _primary_agent: &AgentName, _provenance: CacheProvenance, _duration: Duration) {}

    fn record_branch_completed(&self, _agent: &AgentName, _success: bool, _duration: Duration) {}

    fn record_workflow_error(&self, _error: &DriverError) {}

    fn record_context_queue_rejected(&self) {}
}
