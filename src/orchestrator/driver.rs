//! Workflow driver: the single entry point that turns one natural-language
//! request into a composed reply, owning the per-context request gate,
//! fan-out, cancellation, and durable state.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::OrchestratorConfig;
use crate::domain_types::{ContextId, RequestText, TaskId, TaskState, TurnRole};
use crate::orchestrator::aggregator::ResultAggregatorImpl;
use crate::orchestrator::metrics::MetricsCollector;
use crate::orchestrator::traits::{
    AgentInvoker, AgentRegistry, AgentResponse, AggregatedReply, DriverError, EventSink,
    PromptCache, ResultAggregator, RouterError, RouterExecutor, RoutingDecisionSummary,
    SessionSnapshot, SessionStore, TaskSnapshot, Turn, WorkflowEvent,
};
use crate::orchestrator::wrapper::AgentExecutorWrapper;

/// The outcome of driving one request to completion.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    pub context_id: ContextId,
    pub task_id: Option<TaskId>,
    pub state: TaskState,
    pub reply: AggregatedReply,
}

/// Assembles the router, the agent registry, the per-branch wrapper, and
/// the aggregator into the end-to-end request pipeline, gating concurrent
/// requests per conversation context.
pub struct WorkflowDriver {
    config: OrchestratorConfig,
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn AgentRegistry>,
    router: Arc<dyn RouterExecutor>,
    invoker: Arc<dyn AgentInvoker>,
    cache: Arc<dyn PromptCache>,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsCollector>,
    aggregator: ResultAggregatorImpl,
    context_gates: DashMap<ContextId, Arc<Semaphore>>,
    /// Cancellation handle for each request currently fanning out to agents,
    /// keyed by the task id it will be persisted under if it produces one.
    /// Entries live only for the duration of the fan-out; `tasks/cancel`
    /// consults this before (and in addition to) flipping the persisted
    /// snapshot, since a finished fan-out has nothing left to signal.
    in_flight: DashMap<TaskId, CancellationToken>,
}

/// The collaborators a [`WorkflowDriver`] is assembled from, grouped to keep
/// the constructor's arity sane.
pub struct WorkflowDependencies {
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<dyn AgentRegistry>,
    pub router: Arc<dyn RouterExecutor>,
    pub invoker: Arc<dyn AgentInvoker>,
    pub cache: Arc<dyn PromptCache>,
    pub events: Arc<dyn EventSink>,
    pub metrics: Arc<dyn MetricsCollector>,
}

impl WorkflowDriver {
    pub fn new(config: OrchestratorConfig, deps: WorkflowDependencies) -> Self {
        Self {
            config,
            store: deps.store,
            registry: deps.registry,
            router: deps.router,
            invoker: deps.invoker,
            cache: deps.cache,
            events: deps.events,
            metrics: deps.metrics,
            aggregator: ResultAggregatorImpl,
            context_gates: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    fn gate_for(&self, context_id: ContextId) -> Arc<Semaphore> {
        self.context_gates
            .entry(context_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.context_queue_depth.as_usize())))
            .clone()
    }

    /// Drives one request through routing, fan-out, and aggregation.
    #[instrument(skip(self, request, cancel), fields(context_id = %context_id))]
    pub async fn handle_request(
        &self,
        context_id: ContextId,
        request: RequestText,
        cancel: CancellationToken,
    ) -> Result<WorkflowOutput, DriverError> {
        let gate = self.gate_for(context_id);
        let _permit = gate
            .clone()
            .try_acquire_owned()
            .map_err(|_| {
                self.metrics.record_context_queue_rejected();
                DriverError::ContextQueueFull
            })?;

        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let mut snapshot = self
            .store
            .get(context_id)
            .await?
            .unwrap_or_default();
        snapshot.turns.push(Turn {
            role: TurnRole::User,
            content: request.to_string(),
        });

        let agents = self.registry.list().await;
        let started = std::time::Instant::now();
        let decision = match self.router.route(&request, &agents).await {
            Ok(decision) => decision,
            Err(RouterError::NeedsClarification { reasoning }) => {
                return self
                    .clarification_output(context_id, snapshot, reasoning)
                    .await;
            }
            Err(err) => return Err(err.into()),
        };
        self.metrics.record_request_routed(
            &decision.primary_agent,
            decision.provenance,
            started.elapsed(),
        );

        self.events.emit(WorkflowEvent::RoutingCompleted {
            context_id,
            decision: RoutingDecisionSummary::from(&decision),
        });
        info!(agent = %decision.primary_agent, confidence = decision.confidence.as_f64(), "routed");

        let mut branch_names = vec![decision.primary_agent.clone()];
        branch_names.extend(decision.additional_agents.iter().cloned());

        let wrapper = AgentExecutorWrapper::new(self.invoker.clone(), self.events.clone());
        let mut branches = Vec::with_capacity(branch_names.len());
        for name in &branch_names {
            let Some(descriptor) = self.registry.get(name).await else {
                continue;
            };
            let timeout = self.config.agent_timeout(&descriptor.name.to_string());
            branches.push((descriptor, timeout));
        }

        let futures = branches.iter().map(|(descriptor, timeout)| {
            let wrapper = &wrapper;
            let request = &request;
            let cancel = cancel.clone();
            async move {
                let started = std::time::Instant::now();
                let response = wrapper
                    .execute(descriptor, request, context_id, *timeout, cancel)
                    .await;
                (descriptor.name.clone(), response, started.elapsed())
            }
        });

        let provisional_task_id = TaskId::generate();
        self.in_flight.insert(provisional_task_id, cancel.clone());
        let results = futures::future::join_all(futures).await;
        self.in_flight.remove(&provisional_task_id);

        let responses: Vec<AgentResponse> = results
            .iter()
            .map(|(_, response, _)| response.clone())
            .collect();
        for (agent, response, elapsed) in &results {
            self.metrics.record_branch_completed(agent, response.success, *elapsed);
        }

        let config = &self.config;
        let priorities = |name: &crate::domain_types::AgentName| config.agent_priority(&name.to_string());
        let long_running = |name: &crate::domain_types::AgentName| config.agent_long_running(&name.to_string());
        let reply = self.aggregator.aggregate(&responses, &priorities, &long_running)?;

        let (state, task_id) = if reply.interrogative {
            (TaskState::InputRequired, Some(provisional_task_id))
        } else if reply.long_running {
            (TaskState::Working, Some(provisional_task_id))
        } else if reply.failed_agents.len() == responses.len() {
            (TaskState::Failed, None)
        } else {
            (TaskState::Completed, None)
        };

        snapshot.turns.push(Turn {
            role: TurnRole::Assistant,
            content: reply.content.clone(),
        });
        self.store
            .put(context_id, snapshot, self.config.session_ttl_seconds.into())
            .await?;

        if let Some(task_id) = task_id {
            self.store
                .put_task(
                    task_id,
                    TaskSnapshot {
                        context_id,
                        state,
                        last_message: None,
                        continuation: None,
                    },
                    self.config.task_ttl_seconds.into(),
                )
                .await?;
        }

        self.events.emit(WorkflowEvent::WorkflowOutput { context_id, task_id });

        Ok(WorkflowOutput {
            context_id,
            task_id,
            state,
            reply,
        })
    }

    /// Builds and persists the reply for a request the router judged too
    /// ambiguous to act on, short-circuiting before any agent fan-out. No
    /// routing decision is cached, since none was reached.
    async fn clarification_output(
        &self,
        context_id: ContextId,
        mut snapshot: SessionSnapshot,
        reasoning: String,
    ) -> Result<WorkflowOutput, DriverError> {
        let task_id = TaskId::generate();
        let reply = AggregatedReply {
            content: format!("I need a bit more to go on: {reasoning}"),
            interrogative: true,
            performed_action: false,
            long_running: false,
            failed_agents: vec![],
        };

        snapshot.turns.push(Turn {
            role: TurnRole::Assistant,
            content: reply.content.clone(),
        });
        self.store
            .put(context_id, snapshot, self.config.session_ttl_seconds.into())
            .await?;
        self.store
            .put_task(
                task_id,
                TaskSnapshot {
                    context_id,
                    state: TaskState::InputRequired,
                    last_message: None,
                    continuation: None,
                },
                self.config.task_ttl_seconds.into(),
            )
            .await?;

        self.events.emit(WorkflowEvent::WorkflowOutput {
            context_id,
            task_id: Some(task_id),
        });

        Ok(WorkflowOutput {
            context_id,
            task_id: Some(task_id),
            state: TaskState::InputRequired,
            reply,
        })
    }

    /// Cancels a task: signals the matching in-flight fan-out, if its branch
    /// calls are still running, then marks the persisted task cancelled.
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<(), DriverError> {
        if let Some((_, cancel)) = self.in_flight.remove(&task_id) {
            cancel.cancel();
        }

        let Some(mut snapshot) = self.store.get_task(task_id).await? else {
            return Ok(());
        };
        snapshot.state = TaskState::Cancelled;
        self.store
            .put_task(task_id, snapshot, self.config.task_ttl_seconds.into())
            .await?;
        Ok(())
    }
}
