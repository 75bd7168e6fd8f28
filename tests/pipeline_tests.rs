use async_trait::async_trait;
use chrono::NaiveDate;
use deliberation::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use deliberation::event::{DebatePhase, EventHandler, PipelineEvent};
use deliberation::memory::SituationMemory;
use deliberation::state::CLEAR_PLACEHOLDER;
use deliberation::{
    AnalystRole, PipelineBuilder, PipelineConfig, PipelineError, PortfolioService, RoleMemories,
    RolePrompts,
};
use std::error::Error;
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&str, &[Message]) -> Result<String, String> + Send + Sync>;

/// Answers every call with `"<role> output"` unless a responder overrides it, and records
/// which role made each call.
struct ScriptedClient {
    calls: Mutex<Vec<(String, Vec<Message>)>>,
    respond: Responder,
    slow_role: Option<(String, u64)>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self::with_responder(Box::new(|role, _| Ok(format!("{} output", role))))
    }

    fn with_responder(respond: Responder) -> Self {
        ScriptedClient {
            calls: Mutex::new(Vec::new()),
            respond,
            slow_role: None,
        }
    }

    fn slow(mut self, role: &str, millis: u64) -> Self {
        self.slow_role = Some((role.to_string(), millis));
        self
    }

    fn roles_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(role, _)| role.clone())
            .collect()
    }

    fn prompt_of(&self, role: &str) -> String {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, messages)| {
                messages
                    .iter()
                    .map(|m| m.content.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

fn role_of(messages: &[Message]) -> String {
    let first = messages.first().map(|m| m.content.as_str()).unwrap_or("");
    first
        .find("[role:")
        .and_then(|start| {
            let rest = &first[start + 6..];
            rest.find(']').map(|end| rest[..end].to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<&[deliberation::tool_protocol::ToolMetadata]>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let role = role_of(messages);
        self.calls
            .lock()
            .unwrap()
            .push((role.clone(), messages.to_vec()));
        if let Some((slow, millis)) = &self.slow_role {
            if *slow == role {
                tokio::time::sleep(std::time::Duration::from_millis(*millis)).await;
            }
        }
        match (self.respond)(&role, messages) {
            Ok(content) => Ok(Message::assistant(content)),
            Err(e) => Err(e.into()),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<PipelineEvent>>,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_pipeline_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn started_nodes(&self) -> Vec<(String, usize)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::NodeStarted { node, step, .. } => Some((node.clone(), *step)),
                _ => None,
            })
            .collect()
    }
}

fn position_of(events: &[PipelineEvent], name: &str) -> Option<usize> {
    events.iter().position(
        |e| matches!(e, PipelineEvent::NodeStarted { node, .. } if node == name),
    )
}

fn marked_prompts() -> RolePrompts {
    RolePrompts {
        market: "[role:market]".into(),
        social: "[role:social]".into(),
        news: "[role:news]".into(),
        fundamentals: "[role:fundamentals]".into(),
        bull: "[role:bull]".into(),
        bear: "[role:bear]".into(),
        research_manager: "[role:research_manager] {history} | {past_memory_str}".into(),
        trader: "[role:trader] {past_memory_str}".into(),
        risky: "[role:risky]".into(),
        safe: "[role:safe]".into(),
        neutral: "[role:neutral]".into(),
        risk_judge: "[role:risk_judge] {trader_plan} | {history}".into(),
        portfolio_manager: "[role:portfolio_manager] {portfolio_summary} | {final_decision}".into(),
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
}

fn two_role_config() -> PipelineConfig {
    PipelineConfig::default().with_roles(vec![AnalystRole::Market, AnalystRole::News])
}

#[tokio::test]
async fn test_end_to_end_two_roles_one_round() {
    let client = Arc::new(ScriptedClient::new());
    let pipeline = PipelineBuilder::new(two_role_config())
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .build()
        .unwrap();

    let run = pipeline.run("NVDA", date()).await.unwrap();
    let state = &run.state;

    let roles = client.roles_called();
    let count = |name: &str| roles.iter().filter(|r| r.as_str() == name).count();
    assert_eq!(count("market"), 1);
    assert_eq!(count("news"), 1);
    assert_eq!(count("bull") + count("bear"), 2);
    assert_eq!(count("research_manager"), 1);
    assert_eq!(count("trader"), 1);
    assert_eq!(count("risky") + count("safe") + count("neutral"), 3);
    assert_eq!(count("risk_judge"), 1);
    assert_eq!(count("unknown"), 0);

    assert_eq!(state.reports.market_report, "market output");
    assert_eq!(state.reports.news_report, "news output");
    assert!(state.reports.sentiment_report.is_empty());
    assert_eq!(state.investment_plan, "research_manager output");
    assert_eq!(state.trader_investment_plan, "trader output");
    assert_eq!(state.final_trade_decision, "risk_judge output");
    assert_eq!(state.investment_debate_state.count, 2);
    assert_eq!(state.investment_debate_state.judge_decision, state.investment_plan);
    assert_eq!(state.risk_debate_state.count, 3);
    assert_eq!(state.sender, "Trader");

    // 2 analysts + 2 clear steps + collector + 8 sequential nodes.
    assert_eq!(run.steps_used, 13);
    assert!(run.completed_at >= run.started_at);

    let decisions = run.decisions();
    assert!(!decisions.investment_plan.is_empty());
    assert!(!decisions.final_trade_decision.is_empty());
    assert!(decisions.personalized_recommendation.is_none());
}

#[tokio::test]
async fn test_message_log_keeps_branches_in_role_order() {
    // Market is slow, so News finishes first, but Market is listed first.
    let client = Arc::new(ScriptedClient::new().slow("market", 50));
    let pipeline = PipelineBuilder::new(two_role_config())
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .build()
        .unwrap();

    let run = pipeline.run("NVDA", date()).await.unwrap();
    let senders: Vec<&str> = run
        .state
        .messages
        .iter()
        .map(|e| e.sender.as_str())
        .collect();
    assert_eq!(
        senders,
        vec![
            "user",
            "Market Analyst",
            "Msg Clear Market",
            "News Analyst",
            "Msg Clear News",
            "Trader"
        ]
    );

    let placeholders: Vec<_> = run.state.messages.iter().filter(|e| e.placeholder).collect();
    assert_eq!(placeholders.len(), 2);
    assert!(placeholders
        .iter()
        .all(|e| e.message.content == CLEAR_PLACEHOLDER && e.message.role == Role::User));
    assert_eq!(run.state.conversation().count(), 4);
}

#[tokio::test]
async fn test_barrier_waits_for_every_analyst() {
    let client = Arc::new(ScriptedClient::new().slow("news", 80));
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(two_role_config())
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .with_event_handler(recorder.clone())
        .build()
        .unwrap();

    pipeline.run("NVDA", date()).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    let released = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::BarrierReleased { .. }))
        .unwrap();
    let first_bull = position_of(&events, "Bull Researcher").unwrap();
    for clear in ["Msg Clear Market", "Msg Clear News"] {
        let at = position_of(&events, clear).unwrap();
        assert!(at < released, "{} ran after the barrier", clear);
    }
    assert!(released < first_bull);

    // The first researcher sees both reports.
    let bull_prompt = client.prompt_of("bull");
    assert!(bull_prompt.contains("market output"));
    assert!(bull_prompt.contains("news output"));
}

#[tokio::test]
async fn test_step_numbers_are_unique_and_contiguous() {
    let client = Arc::new(ScriptedClient::new());
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(two_role_config())
        .with_quick_client(client)
        .with_prompts(marked_prompts())
        .build()
        .unwrap()
        .with_event_handler(recorder.clone());

    let run = pipeline.run("NVDA", date()).await.unwrap();
    let mut steps: Vec<usize> = recorder.started_nodes().into_iter().map(|(_, s)| s).collect();
    steps.sort_unstable();
    assert_eq!(steps, (1..=run.steps_used).collect::<Vec<_>>());

    let events = recorder.events.lock().unwrap();
    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { steps: 13, .. })
    ));
}

#[tokio::test]
async fn test_investment_debate_alternates_for_two_rounds() {
    let client = Arc::new(ScriptedClient::new());
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(
        PipelineConfig::default()
            .with_roles(vec![AnalystRole::Fundamentals])
            .with_max_debate_rounds(2),
    )
    .with_quick_client(client.clone())
    .with_prompts(marked_prompts())
    .with_event_handler(recorder.clone())
    .build()
    .unwrap();

    let run = pipeline.run("AAPL", date()).await.unwrap();

    let researchers: Vec<String> = client
        .roles_called()
        .into_iter()
        .filter(|r| r == "bull" || r == "bear")
        .collect();
    assert_eq!(researchers, vec!["bull", "bear", "bull", "bear"]);

    let debate = &run.state.investment_debate_state;
    assert_eq!(debate.count, 4);
    assert_eq!(
        debate.history,
        "\nBull Analyst: bull output\nBear Analyst: bear output\
         \nBull Analyst: bull output\nBear Analyst: bear output"
    );
    assert_eq!(
        debate.bull_history,
        "\nBull Analyst: bull output\nBull Analyst: bull output"
    );
    assert_eq!(debate.current_response, "research_manager output");

    // The bear always answers the bull's latest argument.
    assert!(client
        .prompt_of("bear")
        .contains("Last opponent argument: Bull Analyst: bull output"));

    let turns: Vec<usize> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::DebateTurn {
                phase: DebatePhase::Investment,
                round_count,
                ..
            } => Some(*round_count),
            _ => None,
        })
        .collect();
    assert_eq!(turns, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_risk_debate_rotates_and_preserves_siblings() {
    let client = Arc::new(ScriptedClient::new());
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(
        PipelineConfig::default()
            .with_roles(vec![AnalystRole::Social])
            .with_max_risk_discuss_rounds(2),
    )
    .with_quick_client(client.clone())
    .with_prompts(marked_prompts())
    .with_event_handler(recorder.clone())
    .build()
    .unwrap();

    let run = pipeline.run("AAPL", date()).await.unwrap();

    let debaters: Vec<String> = client
        .roles_called()
        .into_iter()
        .filter(|r| r == "risky" || r == "safe" || r == "neutral")
        .collect();
    assert_eq!(
        debaters,
        vec!["risky", "safe", "neutral", "risky", "safe", "neutral"]
    );

    let debate = &run.state.risk_debate_state;
    assert_eq!(debate.count, 6);
    assert_eq!(debate.current_risky_response, "Risky Analyst: risky output");
    assert_eq!(debate.current_safe_response, "Safe Analyst: safe output");
    assert_eq!(debate.current_neutral_response, "Neutral Analyst: neutral output");
    assert_eq!(
        debate.safe_history,
        "\nSafe Analyst: safe output\nSafe Analyst: safe output"
    );
    assert_eq!(debate.judge_decision, "risk_judge output");
    assert_eq!(debate.latest_speaker.to_string(), "Judge");

    // The second Risky turn sees both other debaters' last arguments.
    let risky_calls: Vec<String> = client
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(r, _)| r == "risky")
        .map(|(_, m)| m[0].content.clone())
        .collect();
    assert!(!risky_calls[0].contains("Last arguments from safe analyst"));
    assert!(risky_calls[1].contains("Last arguments from safe analyst: Safe Analyst: safe output"));
    assert!(risky_calls[1]
        .contains("Last arguments from neutral analyst: Neutral Analyst: neutral output"));

    let turns: Vec<usize> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::DebateTurn {
                phase: DebatePhase::Risk,
                round_count,
                ..
            } => Some(*round_count),
            _ => None,
        })
        .collect();
    assert_eq!(turns, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_judges_see_transcripts_and_memories() {
    let client = Arc::new(ScriptedClient::new());
    let judge_memory = Arc::new(SituationMemory::new("invest_judge"));
    judge_memory.add_situations(vec![(
        "market output".to_string(),
        "Do not chase momentum.".to_string(),
    )]);
    let memories = RoleMemories {
        invest_judge: judge_memory,
        ..RoleMemories::default()
    };

    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::Market]))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .with_memories(memories)
        .build()
        .unwrap();
    pipeline.run("TSLA", date()).await.unwrap();

    let manager = client.prompt_of("research_manager");
    assert!(manager.contains("Bull Analyst: bull output"));
    assert!(manager.contains("Do not chase momentum."));

    let trader = client.prompt_of("trader");
    assert!(trader.contains("No past memories found."));
    assert!(trader.contains("Proposed Investment Plan: research_manager output"));

    let judge = client.prompt_of("risk_judge");
    assert!(judge.starts_with("[role:risk_judge] research_manager output |"));
    assert!(judge.contains("Neutral Analyst: neutral output"));
}

struct OfflineBroker;

#[async_trait]
impl PortfolioService for OfflineBroker {
    async fn portfolio_summary(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Err("broker offline".into())
    }
}

#[tokio::test]
async fn test_portfolio_manager_runs_after_risk_judge() {
    let client = Arc::new(ScriptedClient::new());
    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::News]))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .with_portfolio_manager(Arc::new(OfflineBroker))
        .build()
        .unwrap();

    let run = pipeline.run("MSFT", date()).await.unwrap();
    assert_eq!(
        run.decisions().personalized_recommendation.as_deref(),
        Some("portfolio_manager output")
    );
    assert_eq!(client.roles_called().last().map(String::as_str), Some("portfolio_manager"));
    let prompt = client.prompt_of("portfolio_manager");
    assert!(prompt.contains("Unable to load portfolio: broker offline"));
    assert!(prompt.contains("risk_judge output"));
    // 1 analyst + clear + collector + 8 sequential nodes + portfolio manager.
    assert_eq!(run.steps_used, 12);
}

#[tokio::test]
async fn test_portfolio_manager_is_skipped_without_a_service() {
    let client = Arc::new(ScriptedClient::new());
    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::News]))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .build()
        .unwrap();
    assert!(!pipeline.graph().routing().portfolio_manager);

    let run = pipeline.run("MSFT", date()).await.unwrap();
    assert_eq!(run.decisions().personalized_recommendation, None);
    assert!(!client.roles_called().contains(&"portfolio_manager".to_string()));
    assert_eq!(run.steps_used, 11);
}

#[tokio::test]
async fn test_debate_text_reaches_the_judge_unrendered() {
    let client = Arc::new(ScriptedClient::with_responder(Box::new(|role, _| {
        if role == "bull" {
            Ok("cite {past_memory_str} and {history} here".to_string())
        } else {
            Ok(format!("{} output", role))
        }
    })));
    let judge_memory = Arc::new(SituationMemory::new("invest_judge"));
    judge_memory.add_situations(vec![("market output".to_string(), "LESSON".to_string())]);
    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::Market]))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .with_memories(RoleMemories {
            invest_judge: judge_memory,
            ..RoleMemories::default()
        })
        .build()
        .unwrap();
    pipeline.run("NVDA", date()).await.unwrap();

    let manager = client.prompt_of("research_manager");
    assert!(manager.contains("Bull Analyst: cite {past_memory_str} and {history} here"));
    assert!(!manager.contains("cite LESSON"));
    assert!(manager.ends_with("| LESSON"));
}

#[tokio::test]
async fn test_branch_failure_ends_the_fan_out_before_siblings_finish() {
    let client = Arc::new(
        ScriptedClient::with_responder(Box::new(|role, _| match role {
            "market" => Ok(r#"{"tool_call": {"name": "get_stock_data", "parameters": {}}}"#.to_string()),
            "news" => Err("upstream 503".to_string()),
            _ => Ok(format!("{} output", role)),
        }))
        .slow("market", 20),
    );
    let pipeline = PipelineBuilder::new(two_role_config().with_max_recur_limit(100))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .build()
        .unwrap();

    let err = pipeline.run("NVDA", date()).await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::ModelInvocation {
            node: "News Analyst".to_string(),
            message: "upstream 503".to_string(),
        }
    );

    // The looping market branch was aborted rather than left to drain the step budget.
    let market_calls = client
        .roles_called()
        .iter()
        .filter(|r| r.as_str() == "market")
        .count();
    assert!(market_calls < 5, "market kept running: {} calls", market_calls);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let later = client
        .roles_called()
        .iter()
        .filter(|r| r.as_str() == "market")
        .count();
    assert_eq!(later, market_calls);
}

/// Reports a fixed token count per role and keeps a shared last-usage slot like a real client.
#[derive(Default)]
struct MeteredClient {
    last: Mutex<Option<TokenUsage>>,
}

#[async_trait]
impl ClientWrapper for MeteredClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<&[deliberation::tool_protocol::ToolMetadata]>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let role = role_of(messages);
        let tokens = match role.as_str() {
            "market" => 100,
            "news" => 200,
            _ => 1,
        };
        let usage = TokenUsage {
            input_tokens: tokens,
            output_tokens: 0,
            total_tokens: tokens,
        };
        *self.last.lock().unwrap() = Some(usage.clone());
        if role == "market" {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        }
        Ok(Message::assistant(format!("{} output", role)).with_usage(usage))
    }

    fn model_name(&self) -> &str {
        "metered"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.last)
    }
}

#[tokio::test]
async fn test_token_usage_is_attributed_to_the_calling_node() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(two_role_config())
        .with_quick_client(Arc::new(MeteredClient::default()))
        .with_prompts(marked_prompts())
        .with_event_handler(recorder.clone())
        .build()
        .unwrap();
    pipeline.run("NVDA", date()).await.unwrap();

    let usage: Vec<(String, usize)> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::ModelCallCompleted {
                node, tokens_used, ..
            } if node == "Market Analyst" || node == "News Analyst" => {
                tokens_used.as_ref().map(|u| (node.clone(), u.total_tokens))
            }
            _ => None,
        })
        .collect();
    assert_eq!(usage.len(), 2);
    assert!(usage.contains(&("Market Analyst".to_string(), 100)));
    assert!(usage.contains(&("News Analyst".to_string(), 200)));
}

#[tokio::test]
async fn test_debater_instructions_are_rendered_per_run() {
    let client = Arc::new(ScriptedClient::new());
    let prompts = RolePrompts {
        bull: "[role:bull] argue for {ticker} as of {current_date}".into(),
        risky: "[role:risky] push {ticker} harder than {trader_plan}".into(),
        ..marked_prompts()
    };
    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::Market]))
        .with_quick_client(client.clone())
        .with_prompts(prompts)
        .build()
        .unwrap();
    pipeline.run("NVDA", date()).await.unwrap();

    assert!(client
        .prompt_of("bull")
        .starts_with("[role:bull] argue for NVDA as of 2024-05-10"));
    assert!(client
        .prompt_of("risky")
        .starts_with("[role:risky] push NVDA harder than trader output"));
}

#[tokio::test]
async fn test_model_error_aborts_the_run() {
    let client = Arc::new(ScriptedClient::with_responder(Box::new(|role, _| {
        if role == "bear" {
            Err("upstream 503".to_string())
        } else {
            Ok(format!("{} output", role))
        }
    })));
    let recorder = Arc::new(Recorder::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![AnalystRole::Market]))
        .with_quick_client(client.clone())
        .with_prompts(marked_prompts())
        .with_event_handler(recorder.clone())
        .build()
        .unwrap();

    let err = pipeline.run("NVDA", date()).await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::ModelInvocation {
            node: "Bear Researcher".to_string(),
            message: "upstream 503".to_string(),
        }
    );
    assert!(!err.is_configuration());
    assert!(!client.roles_called().contains(&"research_manager".to_string()));
    assert!(matches!(
        recorder.events.lock().unwrap().last(),
        Some(PipelineEvent::RunFailed { .. })
    ));
}

#[tokio::test]
async fn test_step_ceiling_stops_a_branch_that_never_finalizes() {
    let client = Arc::new(ScriptedClient::with_responder(Box::new(|role, _| {
        if role == "market" {
            Ok(r#"{"tool_call": {"name": "get_stock_data", "parameters": {}}}"#.to_string())
        } else {
            Ok(format!("{} output", role))
        }
    })));
    let pipeline = PipelineBuilder::new(
        PipelineConfig::default()
            .with_roles(vec![AnalystRole::Market, AnalystRole::News])
            .with_max_recur_limit(10),
    )
    .with_quick_client(client.clone())
    .with_prompts(marked_prompts())
    .build()
    .unwrap();

    let err = pipeline.run("NVDA", date()).await.unwrap_err();
    assert_eq!(err, PipelineError::RecursionLimitExceeded { limit: 10 });
    assert!(!matches!(err, PipelineError::ModelInvocation { .. }));
    assert!(!client.roles_called().contains(&"bull".to_string()));
}

#[test]
fn test_configuration_errors_surface_before_any_call() {
    let client = Arc::new(ScriptedClient::new());

    let err = PipelineBuilder::new(PipelineConfig::default().with_roles(vec![]))
        .with_quick_client(client.clone())
        .build()
        .err()
        .unwrap();
    assert_eq!(err, PipelineError::NoRolesSelected);
    assert!(err.is_configuration());

    let err = PipelineBuilder::new(
        PipelineConfig::default().with_roles(vec![AnalystRole::News, AnalystRole::News]),
    )
    .with_quick_client(client.clone())
    .build()
    .err()
    .unwrap();
    assert_eq!(err, PipelineError::DuplicateRole("news".to_string()));

    let err = PipelineBuilder::new(PipelineConfig::default())
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));

    assert!(client.roles_called().is_empty());
}
