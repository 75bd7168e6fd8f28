//! The two debate controllers.
//!
//! Routing is evaluated before every turn: the termination check comes first, and only a
//! debate that is still open picks its next speaker. Speakers return a typed turn, so the merge
//! can only ever touch their own transcript and response fields.
//!
//! - **Investment debate** (pairwise): Bull and Bear alternate by turn index, Bull on even
//!   counts. It ends once `count >= 2 * max_debate_rounds`.
//! - **Risk debate** (round-robin): Risky → Safe → Neutral, driven by `latest_speaker`. It ends
//!   once `count >= 3 * max_risk_discuss_rounds`.

use crate::deliberation::client_wrapper::{ClientWrapper, Message};
use crate::deliberation::context::RunContext;
use crate::deliberation::error::PipelineError;
use crate::deliberation::memory::{situation_memories, MemoryStore};
use crate::deliberation::roles::{render_template, InvestSide, LatestSpeaker, RiskDebater};
use crate::deliberation::state::{
    InvestDebateState, InvestDebateUpdate, PipelineState, RiskDebateState, RiskDebateUpdate,
    StateUpdate,
};
use std::sync::Arc;

/// Outcome of the pairwise router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvestRoute {
    Speak(InvestSide),
    Judge,
}

/// Outcome of the round-robin router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRoute {
    Speak(RiskDebater),
    Judge,
}

pub fn route_investment_debate(debate: &InvestDebateState, max_rounds: usize) -> InvestRoute {
    if debate.count >= 2 * max_rounds {
        return InvestRoute::Judge;
    }
    if debate.count % 2 == 0 {
        InvestRoute::Speak(InvestSide::Bull)
    } else {
        InvestRoute::Speak(InvestSide::Bear)
    }
}

pub fn route_risk_debate(debate: &RiskDebateState, max_rounds: usize) -> RiskRoute {
    if debate.count >= 3 * max_rounds {
        return RiskRoute::Judge;
    }
    match debate.latest_speaker {
        LatestSpeaker::Debater(RiskDebater::Risky) => RiskRoute::Speak(RiskDebater::Safe),
        LatestSpeaker::Debater(RiskDebater::Safe) => RiskRoute::Speak(RiskDebater::Neutral),
        _ => RiskRoute::Speak(RiskDebater::Risky),
    }
}

/// Bull or Bear researcher in the investment debate.
pub struct Researcher {
    side: InvestSide,
    client: Arc<dyn ClientWrapper>,
    memory: Arc<dyn MemoryStore>,
    system_message: String,
    memory_matches: usize,
}

impl Researcher {
    pub fn new(
        side: InvestSide,
        client: Arc<dyn ClientWrapper>,
        memory: Arc<dyn MemoryStore>,
        system_message: impl Into<String>,
        memory_matches: usize,
    ) -> Self {
        Self {
            side,
            client,
            memory,
            system_message: system_message.into(),
            memory_matches,
        }
    }

    pub fn side(&self) -> InvestSide {
        self.side
    }

    fn prompt(&self, state: &PipelineState) -> String {
        let debate = &state.investment_debate_state;
        let reports = &state.reports;
        let past_memory_str = situation_memories(self.memory.as_ref(), reports, self.memory_matches);
        let current_date = state.trade_date_str();
        let instructions = render_template(
            &self.system_message,
            &[
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
                ("past_memory_str", past_memory_str.as_str()),
            ],
        );
        format!(
            "{}\n\nResources available:\n\
             Market research report: {}\n\
             Social media sentiment report: {}\n\
             Latest world affairs news: {}\n\
             Company fundamentals report: {}\n\
             Conversation history of the debate: {}\n\
             Last opponent argument: {}\n\
             Reflections from similar situations and lessons learned: {}\n",
            instructions,
            reports.market_report,
            reports.sentiment_report,
            reports.news_report,
            reports.fundamentals_report,
            debate.history,
            debate.current_response,
            past_memory_str
        )
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let node = format!("{} Researcher", side_label(self.side));
        let messages = [Message::user(self.prompt(state))];
        let response = ctx
            .invoke_model(&node, self.client.as_ref(), &messages, None)
            .await?;
        let argument = format!("{}: {}", self.side.display_name(), response.content);

        Ok(StateUpdate::new().with_investment_debate(InvestDebateUpdate::Turn {
            side: self.side,
            argument,
        }))
    }
}

fn side_label(side: InvestSide) -> &'static str {
    match side {
        InvestSide::Bull => "Bull",
        InvestSide::Bear => "Bear",
    }
}

/// One of the three risk debaters. Risk debaters do not consult memory.
pub struct RiskAnalyst {
    debater: RiskDebater,
    client: Arc<dyn ClientWrapper>,
    system_message: String,
}

impl RiskAnalyst {
    pub fn new(
        debater: RiskDebater,
        client: Arc<dyn ClientWrapper>,
        system_message: impl Into<String>,
    ) -> Self {
        Self {
            debater,
            client,
            system_message: system_message.into(),
        }
    }

    pub fn debater(&self) -> RiskDebater {
        self.debater
    }

    fn prompt(&self, state: &PipelineState) -> String {
        let debate = &state.risk_debate_state;
        let reports = &state.reports;

        let mut opponent_args = String::new();
        for other in RiskDebater::ROTATION {
            if other == self.debater {
                continue;
            }
            let response = debate.current_response(other);
            if !response.is_empty() {
                opponent_args.push_str(&format!(
                    "Last arguments from {} analyst: {}\n",
                    other.name().to_lowercase(),
                    response
                ));
            }
        }

        let current_date = state.trade_date_str();
        let instructions = render_template(
            &self.system_message,
            &[
                ("ticker", state.company_of_interest.as_str()),
                ("current_date", current_date.as_str()),
                ("trader_plan", state.trader_investment_plan.as_str()),
            ],
        );

        format!(
            "{}\n\nTrader's Decision:\n{}\n\n\
             Market Research Report: {}\n\
             Social Media Sentiment Report: {}\n\
             Latest World Affairs Report: {}\n\
             Company Fundamentals Report: {}\n\n\
             Current conversation history: {}\n{}\n\
             If there are no responses from the other viewpoints, do not hallucinate and just \
             present your point.\n\n\
             Engage actively by addressing any specific concerns raised and refuting the weaknesses \
             in their logic. Output conversationally without any special formatting.",
            instructions,
            state.trader_investment_plan,
            reports.market_report,
            reports.sentiment_report,
            reports.news_report,
            reports.fundamentals_report,
            debate.history,
            opponent_args
        )
    }

    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let node = self.debater.display_name();
        let messages = [Message::user(self.prompt(state))];
        let response = ctx
            .invoke_model(node, self.client.as_ref(), &messages, None)
            .await?;
        let argument = format!("{}: {}", node, response.content);

        Ok(StateUpdate::new().with_risk_debate(RiskDebateUpdate::Turn {
            debater: self.debater,
            argument,
        }))
    }
}
