//! Pipeline assembly and execution.
//!
//! [`PipelineBuilder`] collects the collaborators: model clients, per-role tool registries, role
//! memories, prompts and an optional portfolio service. It then assembles a [`Pipeline`] whose
//! graph is fixed for its lifetime. [`Pipeline::run`] executes one analysis and returns the
//! final state together with the decisions downstream code acts on.
//!
//! # Example
//!
//! ```rust,no_run
//! use deliberation::clients::openai::OpenAIClient;
//! use deliberation::{AnalystRole, PipelineBuilder, PipelineConfig};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let quick = Arc::new(OpenAIClient::new_with_model_string("sk-...", "gpt-4o-mini"));
//! let deep = Arc::new(OpenAIClient::new_with_model_string("sk-...", "o4-mini"));
//!
//! let pipeline = PipelineBuilder::new(
//!     PipelineConfig::default().with_roles(vec![AnalystRole::Market, AnalystRole::News]),
//! )
//! .with_quick_client(quick)
//! .with_deep_client(deep)
//! .build()?;
//!
//! let run = pipeline
//!     .run("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
//!     .await?;
//! println!("{}", run.decisions().final_trade_decision);
//! # Ok(())
//! # }
//! ```

use crate::deliberation::barrier;
use crate::deliberation::capability::CapabilityNode;
use crate::deliberation::client_wrapper::ClientWrapper;
use crate::deliberation::config::PipelineConfig;
use crate::deliberation::context::RunContext;
use crate::deliberation::debate::{Researcher, RiskAnalyst};
use crate::deliberation::error::PipelineError;
use crate::deliberation::event::{DebatePhase, EventHandler, PipelineEvent};
use crate::deliberation::graph::{DebateRouting, NodeId, PipelineGraph};
use crate::deliberation::judge::{ResearchManager, RiskJudge};
use crate::deliberation::memory::{MemoryStore, NoopMemory};
use crate::deliberation::roles::{AnalystRole, InvestSide, RiskDebater, RolePrompts};
use crate::deliberation::state::{PipelineState, StateUpdate};
use crate::deliberation::tool_protocol::ToolRegistry;
use crate::deliberation::trader::{PortfolioManager, PortfolioService, Trader};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Tool registries handed to each analyst. Roles without one get an empty registry.
#[derive(Clone, Default)]
pub struct RoleToolkit {
    registries: BTreeMap<AnalystRole, Arc<ToolRegistry>>,
}

impl RoleToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, role: AnalystRole, registry: Arc<ToolRegistry>) -> Self {
        self.registries.insert(role, registry);
        self
    }

    pub fn registry(&self, role: AnalystRole) -> Arc<ToolRegistry> {
        self.registries
            .get(&role)
            .cloned()
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()))
    }
}

/// One memory store per consulting role.
#[derive(Clone)]
pub struct RoleMemories {
    pub bull: Arc<dyn MemoryStore>,
    pub bear: Arc<dyn MemoryStore>,
    pub trader: Arc<dyn MemoryStore>,
    pub invest_judge: Arc<dyn MemoryStore>,
    pub risk_manager: Arc<dyn MemoryStore>,
    pub portfolio_manager: Arc<dyn MemoryStore>,
}

impl Default for RoleMemories {
    fn default() -> Self {
        let noop: Arc<dyn MemoryStore> = Arc::new(NoopMemory);
        Self {
            bull: noop.clone(),
            bear: noop.clone(),
            trader: noop.clone(),
            invest_judge: noop.clone(),
            risk_manager: noop.clone(),
            portfolio_manager: noop,
        }
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    quick_client: Option<Arc<dyn ClientWrapper>>,
    deep_client: Option<Arc<dyn ClientWrapper>>,
    prompts: RolePrompts,
    toolkit: RoleToolkit,
    memories: RoleMemories,
    portfolio: Option<Arc<dyn PortfolioService>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            quick_client: None,
            deep_client: None,
            prompts: RolePrompts::default(),
            toolkit: RoleToolkit::default(),
            memories: RoleMemories::default(),
            portfolio: None,
            event_handler: None,
        }
    }

    /// Model used by analysts, researchers, the trader and the risk debaters.
    pub fn with_quick_client(mut self, client: Arc<dyn ClientWrapper>) -> Self {
        self.quick_client = Some(client);
        self
    }

    /// Model used by both judges and the portfolio manager. Defaults to the quick client.
    pub fn with_deep_client(mut self, client: Arc<dyn ClientWrapper>) -> Self {
        self.deep_client = Some(client);
        self
    }

    pub fn with_prompts(mut self, prompts: RolePrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_tools(mut self, role: AnalystRole, registry: Arc<ToolRegistry>) -> Self {
        self.toolkit = self.toolkit.with_registry(role, registry);
        self
    }

    pub fn with_toolkit(mut self, toolkit: RoleToolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn with_memories(mut self, memories: RoleMemories) -> Self {
        self.memories = memories;
        self
    }

    /// Append the portfolio manager after the risk judge, reading account data from `portfolio`.
    /// Without a portfolio service the run ends at the risk judge.
    pub fn with_portfolio_manager(mut self, portfolio: Arc<dyn PortfolioService>) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Validate the configuration and assemble the graph. No node runs here.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        let graph = PipelineGraph::build(
            &self.config.selected_roles,
            DebateRouting {
                max_debate_rounds: self.config.max_debate_rounds,
                max_risk_discuss_rounds: self.config.max_risk_discuss_rounds,
                portfolio_manager: self.portfolio.is_some(),
            },
        )?;

        let quick = self.quick_client.ok_or_else(|| {
            PipelineError::InvalidConfig("a quick-thinking model client is required".to_string())
        })?;
        let deep = self.deep_client.unwrap_or_else(|| quick.clone());
        let prompts = self.prompts;
        let memories = self.memories;
        let matches = self.config.memory_matches;

        let analysts: BTreeMap<AnalystRole, Arc<CapabilityNode>> = graph
            .roles()
            .iter()
            .map(|role| {
                let node = CapabilityNode::new(
                    *role,
                    quick.clone(),
                    self.toolkit.registry(*role),
                    prompts.analyst(*role),
                );
                (*role, Arc::new(node))
            })
            .collect();

        let researcher = |side: InvestSide, memory: &Arc<dyn MemoryStore>| {
            Researcher::new(
                side,
                quick.clone(),
                memory.clone(),
                prompts.researcher(side),
                matches,
            )
        };
        let risk_analyst = |debater: RiskDebater| {
            RiskAnalyst::new(debater, quick.clone(), prompts.risk_debater(debater))
        };

        let portfolio_manager = self.portfolio.map(|portfolio| {
            PortfolioManager::new(
                deep.clone(),
                memories.portfolio_manager.clone(),
                portfolio,
                prompts.portfolio_manager.clone(),
                matches,
            )
        });

        log::info!(
            "pipeline ready: analysts [{}], quick model '{}', deep model '{}'",
            graph
                .roles()
                .iter()
                .map(|r| r.key())
                .collect::<Vec<_>>()
                .join(", "),
            quick.model_name(),
            deep.model_name()
        );

        Ok(Pipeline {
            bull: researcher(InvestSide::Bull, &memories.bull),
            bear: researcher(InvestSide::Bear, &memories.bear),
            research_manager: ResearchManager::new(
                deep.clone(),
                memories.invest_judge.clone(),
                prompts.research_manager.clone(),
                matches,
            ),
            trader: Trader::new(
                quick.clone(),
                memories.trader.clone(),
                prompts.trader.clone(),
                matches,
            ),
            risky: risk_analyst(RiskDebater::Risky),
            safe: risk_analyst(RiskDebater::Safe),
            neutral: risk_analyst(RiskDebater::Neutral),
            risk_judge: RiskJudge::new(
                deep.clone(),
                memories.risk_manager.clone(),
                prompts.risk_judge.clone(),
                matches,
            ),
            portfolio_manager,
            analysts,
            graph: Arc::new(graph),
            config: self.config,
            event_handler: self.event_handler,
        })
    }
}

/// The outputs downstream code acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Decisions {
    pub investment_plan: String,
    pub final_trade_decision: String,
    pub personalized_recommendation: Option<String>,
}

/// Result of one completed run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub steps_used: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn decisions(&self) -> Decisions {
        Decisions {
            investment_plan: self.state.investment_plan.clone(),
            final_trade_decision: self.state.final_trade_decision.clone(),
            personalized_recommendation: self.state.personalized_recommendation.clone(),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    graph: Arc<PipelineGraph>,
    analysts: BTreeMap<AnalystRole, Arc<CapabilityNode>>,
    bull: Researcher,
    bear: Researcher,
    research_manager: ResearchManager,
    trader: Trader,
    risky: RiskAnalyst,
    safe: RiskAnalyst,
    neutral: RiskAnalyst,
    risk_judge: RiskJudge,
    portfolio_manager: Option<PortfolioManager>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Analyse `subject` as of `trade_date`.
    pub async fn run(
        &self,
        subject: impl Into<String>,
        trade_date: NaiveDate,
    ) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ctx = Arc::new(RunContext::new(
            run_id,
            self.config.max_recur_limit,
            self.event_handler.clone(),
        ));
        let mut state = PipelineState::new(subject, trade_date);

        log::info!(
            "[{}] starting analysis of {} as of {}",
            run_id,
            state.company_of_interest,
            state.trade_date_str()
        );
        ctx.emit(PipelineEvent::RunStarted {
            run_id,
            subject: state.company_of_interest.clone(),
            trade_date: state.trade_date_str(),
            roles: self.graph.roles().iter().map(|r| r.key().to_string()).collect(),
        })
        .await;

        match self.execute(&mut state, &ctx).await {
            Ok(()) => {
                let steps_used = ctx.steps_used();
                log::info!("[{}] finished in {} steps", run_id, steps_used);
                ctx.emit(PipelineEvent::RunCompleted {
                    run_id,
                    steps: steps_used,
                })
                .await;
                Ok(PipelineRun {
                    run_id,
                    state,
                    steps_used,
                    started_at,
                    completed_at: Utc::now(),
                })
            }
            Err(e) => {
                log::error!("[{}] run failed: {}", run_id, e);
                ctx.emit(PipelineEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &Arc<RunContext>,
    ) -> Result<(), PipelineError> {
        let mut current = barrier::fan_out(&self.graph, &self.analysts, state, ctx).await?;
        while current != NodeId::End {
            ctx.enter(&current.to_string()).await?;
            let update = self.dispatch(current, state, ctx).await?;
            state.merge(update);
            self.announce(current, state, ctx).await;
            current = self.graph.next(&current, state)?;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        node: NodeId,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        match node {
            NodeId::Researcher(InvestSide::Bull) => self.bull.invoke(state, ctx).await,
            NodeId::Researcher(InvestSide::Bear) => self.bear.invoke(state, ctx).await,
            NodeId::ResearchManager => self.research_manager.invoke(state, ctx).await,
            NodeId::Trader => self.trader.invoke(state, ctx).await,
            NodeId::RiskDebater(debater) => self.risk_analyst(debater).invoke(state, ctx).await,
            NodeId::RiskJudge => self.risk_judge.invoke(state, ctx).await,
            NodeId::PortfolioManager => match &self.portfolio_manager {
                Some(manager) => manager.invoke(state, ctx).await,
                None => Err(PipelineError::ExecutionFailed(
                    "portfolio manager reached but not configured".to_string(),
                )),
            },
            other => Err(PipelineError::ExecutionFailed(format!(
                "{} only runs inside the analyst fan-out",
                other
            ))),
        }
    }

    fn risk_analyst(&self, debater: RiskDebater) -> &RiskAnalyst {
        match debater {
            RiskDebater::Risky => &self.risky,
            RiskDebater::Safe => &self.safe,
            RiskDebater::Neutral => &self.neutral,
        }
    }

    async fn announce(&self, node: NodeId, state: &PipelineState, ctx: &RunContext) {
        let event = match node {
            NodeId::Researcher(_) => PipelineEvent::DebateTurn {
                run_id: ctx.run_id,
                phase: DebatePhase::Investment,
                speaker: node.to_string(),
                round_count: state.investment_debate_state.count,
            },
            NodeId::RiskDebater(_) => PipelineEvent::DebateTurn {
                run_id: ctx.run_id,
                phase: DebatePhase::Risk,
                speaker: node.to_string(),
                round_count: state.risk_debate_state.count,
            },
            NodeId::ResearchManager => PipelineEvent::JudgeDecided {
                run_id: ctx.run_id,
                phase: DebatePhase::Investment,
                decision_length: state.investment_plan.len(),
            },
            NodeId::RiskJudge => PipelineEvent::JudgeDecided {
                run_id: ctx.run_id,
                phase: DebatePhase::Risk,
                decision_length: state.final_trade_decision.len(),
            },
            _ => return,
        };
        ctx.emit(event).await;
    }
}
