//! The static set of roles in the pipeline and their configurable instructions.

use crate::deliberation::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An analytical capability role. Each one owns exactly one report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystRole {
    Market,
    Social,
    News,
    Fundamentals,
}

impl AnalystRole {
    pub const ALL: [AnalystRole; 4] = [
        AnalystRole::Market,
        AnalystRole::Social,
        AnalystRole::News,
        AnalystRole::Fundamentals,
    ];

    /// Lower-case identifier, as accepted by [`FromStr`].
    pub fn key(self) -> &'static str {
        match self {
            AnalystRole::Market => "market",
            AnalystRole::Social => "social",
            AnalystRole::News => "news",
            AnalystRole::Fundamentals => "fundamentals",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AnalystRole::Market => "Market Analyst",
            AnalystRole::Social => "Social Analyst",
            AnalystRole::News => "News Analyst",
            AnalystRole::Fundamentals => "Fundamentals Analyst",
        }
    }

    /// Name of the state field the role writes its report into.
    pub fn report_field(self) -> &'static str {
        match self {
            AnalystRole::Market => "market_report",
            AnalystRole::Social => "sentiment_report",
            AnalystRole::News => "news_report",
            AnalystRole::Fundamentals => "fundamentals_report",
        }
    }

    /// Parse a comma separated role list such as `"market, news"`.
    pub fn parse_list(list: &str) -> Result<Vec<AnalystRole>, PipelineError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for AnalystRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AnalystRole {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(AnalystRole::Market),
            "social" => Ok(AnalystRole::Social),
            "news" => Ok(AnalystRole::News),
            "fundamentals" => Ok(AnalystRole::Fundamentals),
            other => Err(PipelineError::UnknownRole(other.to_string())),
        }
    }
}

/// The two sides of the investment debate. Bull opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvestSide {
    Bull,
    Bear,
}

impl InvestSide {
    pub fn display_name(self) -> &'static str {
        match self {
            InvestSide::Bull => "Bull Analyst",
            InvestSide::Bear => "Bear Analyst",
        }
    }

    pub fn opponent(self) -> InvestSide {
        match self {
            InvestSide::Bull => InvestSide::Bear,
            InvestSide::Bear => InvestSide::Bull,
        }
    }
}

/// The three participants of the risk debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskDebater {
    Risky,
    Safe,
    Neutral,
}

impl RiskDebater {
    /// Fixed rotation order.
    pub const ROTATION: [RiskDebater; 3] =
        [RiskDebater::Risky, RiskDebater::Safe, RiskDebater::Neutral];

    pub fn name(self) -> &'static str {
        match self {
            RiskDebater::Risky => "Risky",
            RiskDebater::Safe => "Safe",
            RiskDebater::Neutral => "Neutral",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RiskDebater::Risky => "Risky Analyst",
            RiskDebater::Safe => "Safe Analyst",
            RiskDebater::Neutral => "Neutral Analyst",
        }
    }
}

/// Whoever spoke last in the risk debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatestSpeaker {
    #[default]
    Nobody,
    Debater(RiskDebater),
    /// Set by the risk judge once the debate is over.
    Judge,
}

impl fmt::Display for LatestSpeaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatestSpeaker::Nobody => Ok(()),
            LatestSpeaker::Debater(d) => f.write_str(d.name()),
            LatestSpeaker::Judge => f.write_str("Judge"),
        }
    }
}

/// Replace every `{key}` in `template` with its value. Unknown placeholders are left as is.
///
/// Substitution is a single pass over the template: braces inside a substituted value are
/// copied verbatim and never rendered.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Instruction shared by every analyst, wrapped around the role's own system message.
pub const ANALYST_INSTRUCTIONS: &str = "You are a helpful AI assistant, collaborating with other assistants. \
Use the provided tools to progress towards answering the question. If you are unable to fully answer, \
that's OK; another assistant with different tools will help where you left off. Execute what you can to \
make progress. You have access to the following tools: {tool_names}.\n{system_message}\n\
For your reference, the current date is {current_date}. The company we want to look at is {ticker}";

/// Opaque per-role instructions.
///
/// Analyst messages are inserted into [`ANALYST_INSTRUCTIONS`]. Every other message is
/// rendered with [`render_template`]. All of them may use `{ticker}` and `{current_date}`.
/// Researchers also get `{past_memory_str}` and risk debaters `{trader_plan}`. Judge, trader
/// and portfolio templates may use `{history}`, `{past_memory_str}`, `{trader_plan}` and
/// `{portfolio_summary}`.
#[derive(Debug, Clone)]
pub struct RolePrompts {
    pub market: String,
    pub social: String,
    pub news: String,
    pub fundamentals: String,
    pub bull: String,
    pub bear: String,
    pub research_manager: String,
    pub trader: String,
    pub risky: String,
    pub safe: String,
    pub neutral: String,
    pub risk_judge: String,
    pub portfolio_manager: String,
}

impl RolePrompts {
    pub fn analyst(&self, role: AnalystRole) -> &str {
        match role {
            AnalystRole::Market => &self.market,
            AnalystRole::Social => &self.social,
            AnalystRole::News => &self.news,
            AnalystRole::Fundamentals => &self.fundamentals,
        }
    }

    pub fn researcher(&self, side: InvestSide) -> &str {
        match side {
            InvestSide::Bull => &self.bull,
            InvestSide::Bear => &self.bear,
        }
    }

    pub fn risk_debater(&self, debater: RiskDebater) -> &str {
        match debater {
            RiskDebater::Risky => &self.risky,
            RiskDebater::Safe => &self.safe,
            RiskDebater::Neutral => &self.neutral,
        }
    }
}

impl Default for RolePrompts {
    fn default() -> Self {
        Self {
            market: "You are a trading assistant analysing price action and technical indicators. \
Call get_stock_data before get_indicators and write a detailed report that ends with a Markdown table."
                .into(),
            social: "You are a researcher analysing social media sentiment about the company over the \
past week. Write a detailed report that ends with a Markdown table."
                .into(),
            news: "You are a researcher collecting recent company and macroeconomic news. Write a \
detailed report that ends with a Markdown table."
                .into(),
            fundamentals: "You are a researcher analysing the company's financial statements and \
profile. Write a detailed report that ends with a Markdown table."
                .into(),
            bull: "You are a Bull Analyst advocating for investing in the stock. Build an evidence-based \
case on growth, competitive advantages and positive indicators, and rebut the bear's last argument."
                .into(),
            bear: "You are a Bear Analyst making the case against investing in the stock. Stress risks, \
weaknesses and negative indicators, and rebut the bull's last argument."
                .into(),
            research_manager: "As the portfolio manager and debate facilitator, evaluate this round of \
debate and commit to Buy, Sell or Hold with a concrete investment plan.\n\n\
Past reflections on mistakes:\n\"{past_memory_str}\"\n\nDebate History:\n{history}"
                .into(),
            trader: "You are a trading agent analysing market data to make investment decisions. \
End with 'FINAL TRANSACTION PROPOSAL: **BUY/HOLD/SELL**'. Lessons from similar situations: {past_memory_str}"
                .into(),
            risky: "As the Risky Risk Analyst, champion high-reward, high-risk opportunities in the \
trader's plan."
                .into(),
            safe: "As the Safe/Conservative Risk Analyst, protect assets and minimise volatility in the \
trader's plan."
                .into(),
            neutral: "As the Neutral Risk Analyst, weigh both the upside and the risks of the trader's plan."
                .into(),
            risk_judge: "As the Risk Management Judge, evaluate the debate between the Risky, Neutral and \
Safe analysts and decide Buy, Sell or Hold.\n\nTrader's original plan: {trader_plan}\n\n\
Past reflections: {past_memory_str}\n\nAnalysts Debate History:\n{history}"
                .into(),
            portfolio_manager: "You are a portfolio manager giving personalised advice on {ticker}.\n\n\
Portfolio:\n{portfolio_summary}\n\nResearch plan: {investment_plan}\nTrader plan: {trader_plan}\n\
Final decision: {final_decision}\n\nPast reflections: {past_memory_str}"
                .into(),
        }
    }
}
