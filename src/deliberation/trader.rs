//! Roles downstream of the first judge: the trader and the optional portfolio manager.

use crate::deliberation::client_wrapper::{ClientWrapper, Message};
use crate::deliberation::context::RunContext;
use crate::deliberation::error::PipelineError;
use crate::deliberation::memory::{current_situation, situation_memories, MemoryStore};
use crate::deliberation::roles::render_template;
use crate::deliberation::state::{MessageEntry, PipelineState, StateUpdate};
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

/// Text used when no memory matches the current situation.
pub const NO_PAST_MEMORIES: &str = "No past memories found.";

/// Turns the research manager's plan into a concrete trading proposal.
pub struct Trader {
    client: Arc<dyn ClientWrapper>,
    memory: Arc<dyn MemoryStore>,
    template: String,
    memory_matches: usize,
}

impl Trader {
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

    fn past_memories(&self, state: &PipelineState) -> String {
        let matches = self
            .memory
            .get_memories(&current_situation(&state.reports), self.memory_matches);
        if matches.is_empty() {
            return NO_PAST_MEMORIES.to_string();
        }
        matches
            .into_iter()
            .map(|m| format!("{}\n\n", m.recommendation))
            .collect()
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let past_memory_str = self.past_memories(state);
        let current_date = state.trade_date_str();
        let system = render_template(
            &self.template,
            &[
                ("past_memory_str", past_memory_str.as_str()),
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
            ],
        );
        let context = format!(
            "Based on a comprehensive analysis by a team of analysts, here is an investment plan \
             tailored for {}. This plan incorporates insights from current technical market trends, \
             macroeconomic indicators, and social media sentiment. Use this plan as a foundation for \
             evaluating your next trading decision.\n\n\
             Proposed Investment Plan: {}\n\n\
             Leverage these insights to make an informed and strategic decision.",
            state.company_of_interest, state.investment_plan
        );
        let messages = [Message::system(system), Message::user(context)];
        let response = ctx
            .invoke_model("Trader", self.client.as_ref(), &messages, None)
            .await?;

        let mut update = StateUpdate::new().with_message(MessageEntry::new(
            "Trader",
            Message::assistant(response.content.clone()),
        ));
        update.trader_investment_plan = Some(response.content);
        update.sender = Some("Trader".to_string());
        Ok(update)
    }
}

/// Source of the account summary shown to the portfolio manager.
#[async_trait]
pub trait PortfolioService: Send + Sync {
    async fn portfolio_summary(&self) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Optional last step: tailors the final decision to a concrete portfolio.
pub struct PortfolioManager {
    client: Arc<dyn ClientWrapper>,
    memory: Arc<dyn MemoryStore>,
    portfolio: Arc<dyn PortfolioService>,
    template: String,
    memory_matches: usize,
}

impl PortfolioManager {
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        memory: Arc<dyn MemoryStore>,
        portfolio: Arc<dyn PortfolioService>,
        template: impl Into<String>,
        memory_matches: usize,
    ) -> Self {
        Self {
            client,
            memory,
            portfolio,
            template: template.into(),
            memory_matches,
        }
    }

    async fn portfolio_summary(&self) -> String {
        match self.portfolio.portfolio_summary().await {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("portfolio lookup failed: {}", e);
                format!("Unable to load portfolio: {}", e)
            }
        }
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let portfolio_summary = self.portfolio_summary().await;
        let past_memory_str =
            situation_memories(self.memory.as_ref(), &state.reports, self.memory_matches);
        let current_date = state.trade_date_str();
        let prompt = render_template(
            &self.template,
            &[
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
                ("portfolio_summary", portfolio_summary.as_str()),
                ("investment_plan", state.investment_plan.as_str()),
                ("trader_plan", state.trader_investment_plan.as_str()),
                ("final_decision", state.final_trade_decision.as_str()),
                ("past_memory_str", past_memory_str.as_str()),
            ],
        );
        let messages = [Message::user(prompt)];
        let response = ctx
            .invoke_model("Portfolio Manager", self.client.as_ref(), &messages, None)
            .await?;

        let mut update = StateUpdate::new();
        update.personalized_recommendation = Some(response.content);
        update.sender = Some("Portfolio Manager".to_string());
        Ok(update)
    }
}
