//! # Deliberation
//!
//! An async orchestration engine for multi-stage LLM deliberation. A run analyses one subject
//! (for example a ticker) as of one date and moves through a fixed graph:
//!
//! * **Analysts**: every selected [`AnalystRole`] runs concurrently on its own tokio task,
//!   looping through model calls and tool calls until it writes its report.
//! * **Barrier**: the "Analyst Collector" waits for every analyst before anything else runs.
//! * **Investment debate**: Bull and Bear researchers alternate for `max_debate_rounds`
//!   rounds, then the Research Manager writes the investment plan.
//! * **Trader**: turns the plan into a trading proposal.
//! * **Risk debate**: Risky, Safe and Neutral analysts rotate for `max_risk_discuss_rounds`
//!   rounds, then the Risk Judge writes the final trade decision.
//! * **Portfolio manager** (optional): tailors the decision to a portfolio summary.
//!
//! Every node invocation counts against one global step ceiling
//! ([`PipelineConfig::max_recur_limit`]), shared by all analyst branches.
//!
//! Models are reached through the [`ClientWrapper`] trait, tools through
//! [`tool_protocol::ToolRegistry`], and memories through [`memory::MemoryStore`]. All of them
//! are handed to the [`PipelineBuilder`] explicitly.
//!
//! ```rust,no_run
//! use deliberation::clients::openai::OpenAIClient;
//! use deliberation::tool_protocol::{ToolMetadata, ToolRegistry, ToolResult};
//! use deliberation::tool_protocols::CustomToolProtocol;
//! use deliberation::{AnalystRole, PipelineBuilder, PipelineConfig};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     deliberation::init_logger();
//!     let api_key = std::env::var("OPEN_AI_SECRET")?;
//!     let client = Arc::new(OpenAIClient::new_with_model_string(&api_key, "gpt-4.1-mini"));
//!
//!     let protocol = Arc::new(CustomToolProtocol::new());
//!     protocol
//!         .register_tool(
//!             ToolMetadata::new("get_stock_data", "Daily OHLCV rows for a ticker"),
//!             Arc::new(|params: serde_json::Value| Ok(ToolResult::text(format!("rows for {}", params["ticker"])))),
//!         )
//!         .await;
//!     let market_tools = Arc::new(ToolRegistry::from_protocol(protocol).await?);
//!
//!     let pipeline = PipelineBuilder::new(PipelineConfig::from_env()?)
//!         .with_quick_client(client)
//!         .with_tools(AnalystRole::Market, market_tools)
//!         .build()?;
//!
//!     let run = pipeline
//!         .run("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
//!         .await?;
//!     println!("{}", run.decisions().final_trade_decision);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// `RUST_LOG` wins when set. Otherwise `LOG_LEVEL` (`DEBUG`, `INFO`, `WARNING` or `ERROR`) picks
/// the level, and the default is `info`.
///
/// ```rust
/// deliberation::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        if std::env::var_os("RUST_LOG").is_none() {
            if let Ok(level) = std::env::var("LOG_LEVEL") {
                builder.parse_filters(&log_level_filter(&level));
            }
        }
        // Another logger may already be installed by the host application.
        let _ = builder.try_init();
    });
}

fn log_level_filter(level: &str) -> String {
    match level.trim().to_ascii_uppercase().as_str() {
        "WARNING" | "WARN" => "warn".to_string(),
        "DEBUG" => "debug".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        "TRACE" => "trace".to_string(),
        _ => "info".to_string(),
    }
}

// Import the top-level `deliberation` module.
pub mod deliberation;

// Re-exporting key items for easier external access.
pub use deliberation::client_wrapper;
pub use deliberation::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use deliberation::clients;
pub use deliberation::config::PipelineConfig;
pub use deliberation::error::PipelineError;
pub use deliberation::event;
pub use deliberation::event::{DebatePhase, EventHandler, PipelineEvent};
pub use deliberation::graph;
pub use deliberation::memory;
pub use deliberation::pipeline;
pub use deliberation::pipeline::{
    Decisions, Pipeline, PipelineBuilder, PipelineRun, RoleMemories, RoleToolkit,
};
pub use deliberation::roles::{AnalystRole, InvestSide, RiskDebater, RolePrompts};
pub use deliberation::state;
pub use deliberation::state::PipelineState;
pub use deliberation::tool_protocol;
pub use deliberation::tool_protocols;
pub use deliberation::trader::PortfolioService;
