//! Agent executor wrapper: one instance per fan-out branch. Calls the
//! invoker, never propagates an error past itself, and emits start/complete
//! telemetry.

use std::sync::Arc;
use tracing::{info_span, Instrument};

use crate::domain_types::{ContextId, ExecutionTime, RequestText};
use crate::orchestrator::traits::{
    AgentDescriptor, AgentInvoker, AgentResponse, EventSink, WorkflowEvent,
};

/// Invokes exactly one agent and normalizes the outcome into an
/// [`AgentResponse`], converting any invoker error into a failed response
/// instead of propagating it.
pub struct AgentExecutorWrapper {
    invoker: Arc<dyn AgentInvoker>,
    events: Arc<dyn EventSink>,
}

impl AgentExecutorWrapper {
    pub fn new(invoker: Arc<dyn AgentInvoker>, events: Arc<dyn EventSink>) -> Self {
        Self { invoker, events }
    }

    pub async fn execute(
        &self,
        descriptor: &AgentDescriptor,
        request: &RequestText,
        context_id: ContextId,
        timeout: crate::domain_types::TimeoutMs,
        cancel: tokio_util::sync::CancellationToken,
    ) -> AgentResponse {
        self.events.emit(WorkflowEvent::BranchStarted {
            context_id,
            agent: descriptor.name.clone(),
        });

        let span = info_span!("agent_branch", agent = %descriptor.name);
        let result = self
            .invoker
            .invoke(descriptor, request, context_id, timeout, cancel)
            .instrument(span)
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => AgentResponse::failed(
                descriptor.name.clone(),
                err.to_string(),
                ExecutionTime::from_duration(std::time::Duration::ZERO),
            ),
        };

        self.events.emit(WorkflowEvent::BranchCompleted {
            context_id,
            agent: descriptor.name.clone(),
            success: response.success,
        });

        response
    }
}
