//! Shared pipeline state and its merge rules.
//!
//! Nodes never touch [`PipelineState`] directly. Each node reads the state it is given and
//! returns a [`StateUpdate`]; the pipeline applies it with [`PipelineState::merge`]:
//!
//! - `messages` is append-only;
//! - report and decision fields are last-writer-wins;
//! - debate sub-states only accept a typed turn or verdict, so a speaker can write nothing but
//!   its own fields and every sibling field survives the merge untouched.

use crate::deliberation::client_wrapper::Message;
use crate::deliberation::roles::{AnalystRole, InvestSide, LatestSpeaker, RiskDebater};
use chrono::NaiveDate;

/// Content of the entry appended by an analyst's clear step.
pub const CLEAR_PLACEHOLDER: &str = "Continue";

/// One entry of the shared message log.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    /// Node that produced the entry (e.g. `"Market Analyst"`, `"tools_market"`).
    pub sender: String,
    pub message: Message,
    /// Placeholder entries carry no content and are skipped by [`PipelineState::conversation`].
    pub placeholder: bool,
}

impl MessageEntry {
    pub fn new(sender: impl Into<String>, message: Message) -> Self {
        Self {
            sender: sender.into(),
            message,
            placeholder: false,
        }
    }

    pub fn placeholder(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            message: Message::user(CLEAR_PLACEHOLDER),
            placeholder: true,
        }
    }
}

/// One report per analyst role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalystReports {
    pub market_report: String,
    pub sentiment_report: String,
    pub news_report: String,
    pub fundamentals_report: String,
}

impl AnalystReports {
    pub fn get(&self, role: AnalystRole) -> &str {
        match role {
            AnalystRole::Market => &self.market_report,
            AnalystRole::Social => &self.sentiment_report,
            AnalystRole::News => &self.news_report,
            AnalystRole::Fundamentals => &self.fundamentals_report,
        }
    }

    fn slot(&mut self, role: AnalystRole) -> &mut String {
        match role {
            AnalystRole::Market => &mut self.market_report,
            AnalystRole::Social => &mut self.sentiment_report,
            AnalystRole::News => &mut self.news_report,
            AnalystRole::Fundamentals => &mut self.fundamentals_report,
        }
    }
}

/// Sub-state of the Bull/Bear debate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvestDebateState {
    pub history: String,
    pub bull_history: String,
    pub bear_history: String,
    pub current_response: String,
    pub judge_decision: String,
    /// Turns taken so far.
    pub count: usize,
}

/// What a node may change in [`InvestDebateState`].
#[derive(Debug, Clone, PartialEq)]
pub enum InvestDebateUpdate {
    /// One participant spoke. `argument` already carries the display-name prefix.
    Turn { side: InvestSide, argument: String },
    /// The research manager decided.
    Verdict { decision: String },
}

impl InvestDebateState {
    pub fn side_history(&self, side: InvestSide) -> &str {
        match side {
            InvestSide::Bull => &self.bull_history,
            InvestSide::Bear => &self.bear_history,
        }
    }

    fn apply(&mut self, update: InvestDebateUpdate) {
        match update {
            InvestDebateUpdate::Turn { side, argument } => {
                let own = match side {
                    InvestSide::Bull => &mut self.bull_history,
                    InvestSide::Bear => &mut self.bear_history,
                };
                own.push('\n');
                own.push_str(&argument);
                self.history.push('\n');
                self.history.push_str(&argument);
                self.current_response = argument;
                self.count += 1;
            }
            InvestDebateUpdate::Verdict { decision } => {
                self.current_response = decision.clone();
                self.judge_decision = decision;
            }
        }
    }
}

/// Sub-state of the Risky/Safe/Neutral debate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskDebateState {
    pub history: String,
    pub risky_history: String,
    pub safe_history: String,
    pub neutral_history: String,
    pub current_risky_response: String,
    pub current_safe_response: String,
    pub current_neutral_response: String,
    pub latest_speaker: LatestSpeaker,
    pub judge_decision: String,
    /// Turns taken so far.
    pub count: usize,
}

/// What a node may change in [`RiskDebateState`].
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDebateUpdate {
    Turn { debater: RiskDebater, argument: String },
    Verdict { decision: String },
}

impl RiskDebateState {
    pub fn debater_history(&self, debater: RiskDebater) -> &str {
        match debater {
            RiskDebater::Risky => &self.risky_history,
            RiskDebater::Safe => &self.safe_history,
            RiskDebater::Neutral => &self.neutral_history,
        }
    }

    pub fn current_response(&self, debater: RiskDebater) -> &str {
        match debater {
            RiskDebater::Risky => &self.current_risky_response,
            RiskDebater::Safe => &self.current_safe_response,
            RiskDebater::Neutral => &self.current_neutral_response,
        }
    }

    fn apply(&mut self, update: RiskDebateUpdate) {
        match update {
            RiskDebateUpdate::Turn { debater, argument } => {
                let (own_history, own_response) = match debater {
                    RiskDebater::Risky => {
                        (&mut self.risky_history, &mut self.current_risky_response)
                    }
                    RiskDebater::Safe => (&mut self.safe_history, &mut self.current_safe_response),
                    RiskDebater::Neutral => {
                        (&mut self.neutral_history, &mut self.current_neutral_response)
                    }
                };
                own_history.push('\n');
                own_history.push_str(&argument);
                self.history.push('\n');
                self.history.push_str(&argument);
                *own_response = argument;
                self.latest_speaker = LatestSpeaker::Debater(debater);
                self.count += 1;
            }
            RiskDebateUpdate::Verdict { decision } => {
                self.judge_decision = decision;
                self.latest_speaker = LatestSpeaker::Judge;
            }
        }
    }
}

/// Partial result returned by a node. Unset fields leave the state as it was.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<MessageEntry>,
    pub report: Option<(AnalystRole, String)>,
    pub investment_debate: Option<InvestDebateUpdate>,
    pub investment_plan: Option<String>,
    pub trader_investment_plan: Option<String>,
    pub risk_debate: Option<RiskDebateUpdate>,
    pub final_trade_decision: Option<String>,
    pub personalized_recommendation: Option<String>,
    pub sender: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, entry: MessageEntry) -> Self {
        self.messages.push(entry);
        self
    }

    pub fn with_report(mut self, role: AnalystRole, report: impl Into<String>) -> Self {
        self.report = Some((role, report.into()));
        self
    }

    pub fn with_investment_debate(mut self, update: InvestDebateUpdate) -> Self {
        self.investment_debate = Some(update);
        self
    }

    pub fn with_risk_debate(mut self, update: RiskDebateUpdate) -> Self {
        self.risk_debate = Some(update);
        self
    }
}

/// Everything the pipeline knows about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Subject identifier, e.g. a ticker.
    pub company_of_interest: String,
    /// As-of date of the analysis.
    pub trade_date: NaiveDate,
    pub messages: Vec<MessageEntry>,
    pub reports: AnalystReports,
    pub investment_debate_state: InvestDebateState,
    pub investment_plan: String,
    pub trader_investment_plan: String,
    pub risk_debate_state: RiskDebateState,
    pub final_trade_decision: String,
    pub personalized_recommendation: Option<String>,
    /// Display name of the last node that wrote a message on behalf of a role.
    pub sender: String,
}

impl PipelineState {
    /// Fresh state for `subject` on `trade_date`, seeded with the subject as the first message.
    pub fn new(subject: impl Into<String>, trade_date: NaiveDate) -> Self {
        let subject = subject.into();
        Self {
            messages: vec![MessageEntry::new("user", Message::user(subject.clone()))],
            company_of_interest: subject,
            trade_date,
            reports: AnalystReports::default(),
            investment_debate_state: InvestDebateState::default(),
            investment_plan: String::new(),
            trader_investment_plan: String::new(),
            risk_debate_state: RiskDebateState::default(),
            final_trade_decision: String::new(),
            personalized_recommendation: None,
            sender: String::new(),
        }
    }

    /// `YYYY-MM-DD` form of the as-of date, as shown to models and tools.
    pub fn trade_date_str(&self) -> String {
        self.trade_date.format("%Y-%m-%d").to_string()
    }

    /// Apply a node's partial result.
    pub fn merge(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some((role, report)) = update.report {
            *self.reports.slot(role) = report;
        }
        if let Some(debate) = update.investment_debate {
            self.investment_debate_state.apply(debate);
        }
        if let Some(plan) = update.investment_plan {
            self.investment_plan = plan;
        }
        if let Some(plan) = update.trader_investment_plan {
            self.trader_investment_plan = plan;
        }
        if let Some(debate) = update.risk_debate {
            self.risk_debate_state.apply(debate);
        }
        if let Some(decision) = update.final_trade_decision {
            self.final_trade_decision = decision;
        }
        if let Some(recommendation) = update.personalized_recommendation {
            self.personalized_recommendation = Some(recommendation);
        }
        if let Some(sender) = update.sender {
            self.sender = sender;
        }
    }

    /// The message log without placeholder entries.
    pub fn conversation(&self) -> impl Iterator<Item = &MessageEntry> {
        self.messages.iter().filter(|e| !e.placeholder)
    }

    /// The most recent log entry, if any.
    pub fn last_message(&self) -> Option<&MessageEntry> {
        self.messages.last()
    }
}
