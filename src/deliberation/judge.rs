//! The two judges. Each reads a finished debate and calls the model once; neither touches the
//! transcripts or the turn count.

use crate::deliberation::client_wrapper::{ClientWrapper, Message};
use crate::deliberation::context::RunContext;
use crate::deliberation::error::PipelineError;
use crate::deliberation::memory::{situation_memories, MemoryStore};
use crate::deliberation::roles::render_template;
use crate::deliberation::state::{InvestDebateUpdate, PipelineState, RiskDebateUpdate, StateUpdate};
use std::sync::Arc;

/// Judges the Bull/Bear debate and writes the investment plan.
pub struct ResearchManager {
    client: Arc<dyn ClientWrapper>,
    memory: Arc<dyn MemoryStore>,
    template: String,
    memory_matches: usize,
}

impl ResearchManager {
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        memory: Arc<dyn MemoryStore>,
        template: impl Into<String>,
        memory_matches: usize,
    ) -> Self {
        Self {
            client,
            memory,
            template: template.into(),
            memory_matches,
        }
    }

    fn prompt(&self, state: &PipelineState) -> String {
        let past_memory_str =
            situation_memories(self.memory.as_ref(), &state.reports, self.memory_matches);
        let debate = &state.investment_debate_state;
        let current_date = state.trade_date_str();
        render_template(
            &self.template,
            &[
                ("history", debate.history.as_str()),
                ("current_response", debate.current_response.as_str()),
                ("past_memory_str", past_memory_str.as_str()),
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
            ],
        )
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let messages = [Message::user(self.prompt(state))];
        let response = ctx
            .invoke_model("Research Manager", self.client.as_ref(), &messages, None)
            .await?;
        log::info!(
            "Research Manager decided after {} debate turns",
            state.investment_debate_state.count
        );

        let mut update = StateUpdate::new().with_investment_debate(InvestDebateUpdate::Verdict {
            decision: response.content.clone(),
        });
        update.investment_plan = Some(response.content);
        Ok(update)
    }
}

/// Judges the risk debate and writes the final trade decision.
pub struct RiskJudge {
    client: Arc<dyn ClientWrapper>,
    memory: Arc<dyn MemoryStore>,
    template: String,
    memory_matches: usize,
}

impl RiskJudge {
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        memory: Arc<dyn MemoryStore>,
        template: impl Into<String>,
        memory_matches: usize,
    ) -> Self {
        Self {
            client,
            memory,
            template: template.into(),
            memory_matches,
        }
    }

    fn prompt(&self, state: &PipelineState) -> String {
        let past_memory_str =
            situation_memories(self.memory.as_ref(), &state.reports, self.memory_matches);
        let current_date = state.trade_date_str();
        // The judge weighs the debate against the research manager's plan.
        render_template(
            &self.template,
            &[
                ("history", state.risk_debate_state.history.as_str()),
                ("trader_plan", state.investment_plan.as_str()),
                ("past_memory_str", past_memory_str.as_str()),
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
            ],
        )
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let messages = [Message::user(self.prompt(state))];
        let response = ctx
            .invoke_model("Risk Judge", self.client.as_ref(), &messages, None)
            .await?;
        log::info!(
            "Risk Judge decided after {} debate turns",
            state.risk_debate_state.count
        );

        let mut update = StateUpdate::new().with_risk_debate(RiskDebateUpdate::Verdict {
            decision: response.content.clone(),
        });
        update.final_trade_decision = Some(response.content);
        Ok(update)
    }
}
