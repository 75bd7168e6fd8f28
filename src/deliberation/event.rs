//! Pipeline event system.
//!
//! Implement [`EventHandler`] and attach it with
//! [`Pipeline::with_event_handler`](crate::pipeline::Pipeline::with_event_handler) to observe a
//! run as it happens: node invocations, tool calls, the barrier release, every debate turn and
//! both judge decisions.
//!
//! # Example
//!
//! ```rust,no_run
//! use deliberation::event::{EventHandler, PipelineEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_pipeline_event(&self, event: &PipelineEvent) {
//!         if let PipelineEvent::DebateTurn { speaker, round_count, .. } = event {
//!             println!("{} spoke (turn {})", speaker, round_count);
//!         }
//!     }
//! }
//! ```

use crate::deliberation::client_wrapper::TokenUsage;
use async_trait::async_trait;
use uuid::Uuid;

/// Which debate a turn or decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebatePhase {
    /// Bull vs Bear, judged by the research manager.
    Investment,
    /// Risky / Safe / Neutral, judged by the risk judge.
    Risk,
}

/// Events emitted while a pipeline runs.
///
/// ```text
/// RunStarted
///   ├─ NodeStarted (one per step, every branch)
///   ├─ ToolCallDetected / ToolExecutionCompleted (analyst tool loops)
///   ├─ BarrierReleased
///   ├─ DebateTurn × 2r, JudgeDecided (Investment)
///   ├─ DebateTurn × 3r, JudgeDecided (Risk)
/// RunCompleted | RunFailed
/// ```
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        subject: String,
        trade_date: String,
        roles: Vec<String>,
    },
    /// Fired before a node is invoked. `step` is the global step number, starting at 1.
    NodeStarted {
        run_id: Uuid,
        node: String,
        step: usize,
    },
    /// A model call completed inside a node.
    ModelCallCompleted {
        run_id: Uuid,
        node: String,
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },
    ToolCallDetected {
        run_id: Uuid,
        node: String,
        tool_name: String,
        parameters: serde_json::Value,
    },
    ToolExecutionCompleted {
        run_id: Uuid,
        node: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
    },
    /// Every selected analyst reached its clear step.
    BarrierReleased { run_id: Uuid, roles: Vec<String> },
    DebateTurn {
        run_id: Uuid,
        phase: DebatePhase,
        speaker: String,
        round_count: usize,
    },
    JudgeDecided {
        run_id: Uuid,
        phase: DebatePhase,
        decision_length: usize,
    },
    RunCompleted { run_id: Uuid, steps: usize },
    RunFailed { run_id: Uuid, error: String },
}

/// Receives [`PipelineEvent`]s. The default implementation is a no-op.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_pipeline_event(&self, _event: &PipelineEvent) {}
}
