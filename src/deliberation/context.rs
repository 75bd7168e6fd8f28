//! Per-run context shared by every node invocation, including the fan-out branches.

use crate::deliberation::client_wrapper::{ClientWrapper, Message};
use crate::deliberation::error::PipelineError;
use crate::deliberation::event::{EventHandler, PipelineEvent};
use crate::deliberation::tool_protocol::ToolMetadata;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Global ceiling on node invocations. Shared by all branches of a run.
#[derive(Debug)]
pub struct StepBudget {
    limit: usize,
    used: AtomicUsize,
}

impl StepBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Claim the next step. Fails once more than `limit` steps have been claimed.
    pub fn tick(&self) -> Result<usize, PipelineError> {
        let step = self.used.fetch_add(1, Ordering::SeqCst) + 1;
        if step > self.limit {
            return Err(PipelineError::RecursionLimitExceeded { limit: self.limit });
        }
        Ok(step)
    }

    /// Steps claimed so far, capped at the limit.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst).min(self.limit)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

pub struct RunContext {
    pub run_id: Uuid,
    budget: StepBudget,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl RunContext {
    pub fn new(
        run_id: Uuid,
        max_steps: usize,
        event_handler: Option<Arc<dyn EventHandler>>,
    ) -> Self {
        Self {
            run_id,
            budget: StepBudget::new(max_steps),
            event_handler,
        }
    }

    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_pipeline_event(&event).await;
        }
    }

    /// Account for one invocation of `node` against the step ceiling.
    pub async fn enter(&self, node: &str) -> Result<usize, PipelineError> {
        let step = self.budget.tick().map_err(|e| {
            log::error!("step ceiling hit while entering {}: {}", node, e);
            e
        })?;
        log::debug!("[{}] step {}: {}", self.run_id, step, node);
        self.emit(PipelineEvent::NodeStarted {
            run_id: self.run_id,
            node: node.to_string(),
            step,
        })
        .await;
        Ok(step)
    }

    pub fn steps_used(&self) -> usize {
        self.budget.used()
    }

    /// Call the model on behalf of `node`. Failures are fatal for the run.
    pub async fn invoke_model(
        &self,
        node: &str,
        client: &dyn ClientWrapper,
        messages: &[Message],
        tools: Option<&[ToolMetadata]>,
    ) -> Result<Message, PipelineError> {
        let response = client.send_message(messages, tools).await.map_err(|e| {
            log::error!(
                "{}: model '{}' failed: {}",
                node,
                client.model_name(),
                e
            );
            PipelineError::model(node, e)
        })?;

        self.emit(PipelineEvent::ModelCallCompleted {
            run_id: self.run_id,
            node: node.to_string(),
            tokens_used: response.usage.clone(),
            response_length: response.content.len(),
        })
        .await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows_exactly_limit_steps() {
        let budget = StepBudget::new(3);
        assert_eq!(budget.tick().unwrap(), 1);
        assert_eq!(budget.tick().unwrap(), 2);
        assert_eq!(budget.tick().unwrap(), 3);
        assert_eq!(
            budget.tick().unwrap_err(),
            PipelineError::RecursionLimitExceeded { limit: 3 }
        );
        assert_eq!(budget.used(), 3);
    }
}
