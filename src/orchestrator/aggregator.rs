//! Result aggregator: composes one unified reply from every branch's
//! response, in priority order, tolerating partial failure.

use crate::domain_types::AgentPriority;
use crate::orchestrator::traits::{
    AgentResponse, AggregatedReply, AggregatorError, ResultAggregator,
};

/// Default implementation of [`ResultAggregator`].
pub struct ResultAggregatorImpl;

impl ResultAggregator for ResultAggregatorImpl {
    fn aggregate(
        &self,
        responses: &[AgentResponse],
        priorities: &dyn Fn(&crate::domain_types::AgentName) -> AgentPriority,
        long_running: &dyn Fn(&crate::domain_types::AgentName) -> bool,
    ) -> Result<AggregatedReply, AggregatorError> {
        if responses.is_empty() {
            return Err(AggregatorError::NoBranches);
        }

        let mut ordered: Vec<&AgentResponse> = responses.iter().collect();
        ordered.sort_by_key(|r| priorities(&r.agent).as_u16());

        let mut pieces = Vec::new();
        let mut failed_agents = Vec::new();
        let mut interrogative = false;
        let mut performed_action = false;
        let mut any_long_running = false;

        for response in &ordered {
            if !response.success {
                failed_agents.push((
                    response.agent.clone(),
                    response.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                ));
                continue;
            }

            if response.content.is_empty() {
                continue;
            }

            let connector = if pieces.is_empty() { None } else { Some(if pieces.len() == 1 { "Also, " } else { "And, " }) };
            if let Some(connector) = connector {
                pieces.push(format!("{connector}{}", response.content));
            } else {
                pieces.push(response.content.clone());
            }

            if response.needs_input {
                interrogative = true;
            }
            if response.performed_action {
                performed_action = true;
                if long_running(&response.agent) {
                    any_long_running = true;
                }
            }
        }

        let mut content = pieces.join(" ");

        if !failed_agents.is_empty() {
            let names: Vec<String> = failed_agents
                .iter()
                .map(|(agent, error)| format!("{agent} ({error})"))
                .collect();
            let clause = format!("However, I wasn't able to complete everything because {}.", names.join("; "));
            if content.is_empty() {
                content = clause;
            } else {
                content = format!("{content} {clause}");
            }
        }

        Ok(AggregatedReply {
            content,
            interrogative,
            performed_action,
            long_running: any_long_running,
            failed_agents,
        })
    }
}
