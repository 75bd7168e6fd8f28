//! Capability nodes: one analyst role plus its tool-call loop.
//!
//! ```text
//!            ┌──────── tool calls ────────┐
//!            ▼                            │
//! Invoking ──┴─ no tool calls ─► Finalized ─► clear step
//!    ▲                                         (placeholder)
//!    └────── ExecutingTools ◄── tool calls
//! ```
//!
//! The node itself has no iteration bound; the run's step ceiling covers it.

use crate::deliberation::client_wrapper::{ClientWrapper, Message};
use crate::deliberation::context::RunContext;
use crate::deliberation::error::PipelineError;
use crate::deliberation::event::PipelineEvent;
use crate::deliberation::graph::NodeId;
use crate::deliberation::roles::{render_template, AnalystRole, ANALYST_INSTRUCTIONS};
use crate::deliberation::state::{MessageEntry, PipelineState, StateUpdate};
use crate::deliberation::tool_protocol::{parse_tool_calls, ToolCall, ToolRegistry, ToolResult};
use std::error::Error;
use std::sync::Arc;

/// Where a capability loop stands after its latest model response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Invoking,
    ExecutingTools,
    Finalized,
}

impl LoopState {
    /// State implied by the last entry of a branch's log.
    pub fn after(state: &PipelineState) -> LoopState {
        match state.last_message() {
            Some(entry) if entry.message.requests_tools() => LoopState::ExecutingTools,
            Some(_) => LoopState::Finalized,
            None => LoopState::Invoking,
        }
    }
}

pub struct CapabilityNode {
    role: AnalystRole,
    client: Arc<dyn ClientWrapper>,
    tools: Arc<ToolRegistry>,
    system_message: String,
}

impl CapabilityNode {
    pub fn new(
        role: AnalystRole,
        client: Arc<dyn ClientWrapper>,
        tools: Arc<ToolRegistry>,
        system_message: impl Into<String>,
    ) -> Self {
        Self {
            role,
            client,
            tools,
            system_message: system_message.into(),
        }
    }

    pub fn role(&self) -> AnalystRole {
        self.role
    }

    fn system_prompt(&self, state: &PipelineState) -> String {
        let tool_names = self.tools.tool_names();
        let current_date = state.trade_date_str();
        let mut prompt = render_template(
            ANALYST_INSTRUCTIONS,
            &[
                ("tool_names", tool_names.as_str()),
                ("system_message", self.system_message.as_str()),
                ("current_date", current_date.as_str()),
                ("ticker", state.company_of_interest.as_str()),
            ],
        );
        if let Some(tool_text) = self.tools.describe_tools() {
            prompt.push_str(&tool_text);
        }
        prompt
    }

    /// `Invoking`: one model call over the branch's running log.
    ///
    /// A response without tool calls finalizes the role's report.
    pub async fn invoke(
        &self,
        state: &PipelineState,
        ctx: &RunContext,
    ) -> Result<StateUpdate, PipelineError> {
        let node = self.role.display_name();
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(self.system_prompt(state)));
        messages.extend(state.messages.iter().map(|e| e.message.clone()));

        let tool_list = self.tools.list_tools();
        let tools = if tool_list.is_empty() {
            None
        } else {
            Some(tool_list.as_slice())
        };
        let response = ctx
            .invoke_model(node, self.client.as_ref(), &messages, tools)
            .await?;

        // Native tool calls win; otherwise look for the text protocol.
        let tool_calls = if response.tool_calls.is_empty() {
            parse_tool_calls(&response.content)
        } else {
            response.tool_calls
        };
        let finalized = tool_calls.is_empty();
        let content = response.content;

        let mut update = StateUpdate::new();
        update.sender = Some(node.to_string());
        if finalized {
            log::info!("{} finalized its report ({} chars)", node, content.len());
            update = update.with_report(self.role, content.clone());
        } else {
            log::debug!("{} requested {} tool call(s)", node, tool_calls.len());
        }
        Ok(update.with_message(MessageEntry::new(
            node,
            Message::assistant(content).with_tool_calls(tool_calls),
        )))
    }

    /// `ExecutingTools`: run every call requested by the last response, in order.
    ///
    /// Tool failures become error entries in the log and never abort the run.
    pub async fn execute_tools(&self, state: &PipelineState, ctx: &RunContext) -> StateUpdate {
        let node = NodeId::Tools(self.role).to_string();
        let calls: Vec<ToolCall> = state
            .last_message()
            .map(|e| e.message.tool_calls.clone())
            .unwrap_or_default();

        let mut update = StateUpdate::new();
        for call in calls {
            ctx.emit(PipelineEvent::ToolCallDetected {
                run_id: ctx.run_id,
                node: node.clone(),
                tool_name: call.name.clone(),
                parameters: call.parameters.clone(),
            })
            .await;

            let parameters = with_run_arguments(call.parameters, state);
            let result = self.tools.execute_tool(&call.name, parameters).await;
            let (text, error) = render_tool_outcome(&call.name, &result);
            if let Some(err) = &error {
                log::warn!("{}: tool '{}' failed: {}", node, call.name, err);
            }

            ctx.emit(PipelineEvent::ToolExecutionCompleted {
                run_id: ctx.run_id,
                node: node.clone(),
                tool_name: call.name.clone(),
                success: error.is_none(),
                error,
            })
            .await;
            update = update.with_message(MessageEntry::new(node.clone(), Message::tool(text)));
        }
        update
    }

    /// Clear step: append the placeholder that closes this role's branch.
    pub fn clear(&self) -> StateUpdate {
        StateUpdate::new().with_message(MessageEntry::placeholder(
            NodeId::Clear(self.role).to_string(),
        ))
    }
}

/// Fill in the subject and as-of date unless the model already chose them.
fn with_run_arguments(parameters: serde_json::Value, state: &PipelineState) -> serde_json::Value {
    match parameters {
        serde_json::Value::Object(mut map) => {
            map.entry("ticker")
                .or_insert_with(|| state.company_of_interest.clone().into());
            map.entry("curr_date")
                .or_insert_with(|| state.trade_date_str().into());
            serde_json::Value::Object(map)
        }
        serde_json::Value::Null => serde_json::json!({
            "ticker": state.company_of_interest,
            "curr_date": state.trade_date_str(),
        }),
        other => other,
    }
}

/// Log text for a tool outcome plus the error message, if it failed.
fn render_tool_outcome(
    tool_name: &str,
    result: &Result<ToolResult, Box<dyn Error + Send + Sync>>,
) -> (String, Option<String>) {
    match result {
        Ok(result) if result.success => {
            let output = match &result.output {
                serde_json::Value::String(text) => text.clone(),
                other => serde_json::to_string_pretty(other)
                    .unwrap_or_else(|_| format!("{:?}", other)),
            };
            (
                format!("Tool '{}' executed successfully. Result: {}", tool_name, output),
                None,
            )
        }
        Ok(result) => {
            let err = result
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            (
                format!("Tool '{}' failed. Error: {}", tool_name, err),
                Some(err),
            )
        }
        Err(e) => (
            format!("Tool '{}' execution error: {}", tool_name, e),
            Some(e.to_string()),
        ),
    }
}
