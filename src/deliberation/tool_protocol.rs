//! Tool layer used by the analyst tool-call loops.
//!
//! Tools are reached through a [`ToolRegistry`] that the caller builds and hands to the
//! pipeline per analyst role. Nothing here is global: two pipelines in the same process can
//! bind completely different tools to the same role.
//!
//! # Architecture
//!
//! ```text
//! CapabilityNode → ToolRegistry → ToolProtocol (trait) → [CustomToolProtocol | user-defined]
//! ```
//!
//! Models request tools with the text protocol
//! `{"tool_call": {"name": "...", "parameters": {...}}}`; [`parse_tool_calls`] extracts every
//! such object from a response.
//!
//! # Example
//!
//! ```rust
//! use deliberation::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
//!
//! let metadata = ToolMetadata::new("get_stock_data", "Daily OHLCV candles")
//!     .with_parameter(
//!         ToolParameter::new("ticker", ToolParameterType::String)
//!             .with_description("Symbol to look up")
//!             .required(),
//!     );
//! assert_eq!(metadata.parameters.len(), 1);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data from the tool
    pub output: serde_json::Value,
    /// Optional error message if execution failed
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Plain-text output, the common case for data lookups.
    pub fn text(output: impl Into<String>) -> Self {
        Self::success(serde_json::Value::String(output.into()))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Metadata about a tool, handed to the model with every tool-bound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given parameters
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Get metadata about available tools
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g., "custom")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone)]
pub enum ToolError {
    /// Requested tool is not registered in the current registry/protocol.
    NotFound(String),
    /// Tool execution completed with an application level failure.
    ExecutionFailed(String),
    /// The provided JSON parameters failed validation.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A named tool bound to the protocol that executes it.
pub struct Tool {
    metadata: ToolMetadata,
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    pub fn new(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

/// Registry for the tools one analyst role may call.
///
/// Tools are kept in name order so the instructions rendered for the model are stable from
/// run to run.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry exposing every tool the protocol advertises.
    pub async fn from_protocol(
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut registry = Self::new();
        for metadata in protocol.list_tools().await? {
            registry.add_tool(Tool::new(metadata, protocol.clone()));
        }
        Ok(registry)
    }

    /// Insert or replace a tool definition.
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|t| t.metadata.clone()).collect()
    }

    /// Comma separated tool names, in registry order.
    pub fn tool_names(&self) -> String {
        self.tools.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    /// Execute a named tool with serialized parameters.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        tool.execute(parameters).await
    }

    /// Render the text tool-call instructions appended to a system message.
    ///
    /// Returns `None` when no tool is registered, in which case the model should not be told
    /// about the protocol at all.
    pub fn describe_tools(&self) -> Option<String> {
        if self.tools.is_empty() {
            return None;
        }
        let mut out = String::from("\n\nYou have access to the following tools:\n");
        for tool in self.tools.values() {
            let metadata = &tool.metadata;
            out.push_str(&format!("- {}: {}\n", metadata.name, metadata.description));
            if !metadata.parameters.is_empty() {
                out.push_str("  Parameters:\n");
                for param in &metadata.parameters {
                    out.push_str(&format!(
                        "    - {} ({:?}{}): {}\n",
                        param.name,
                        param.param_type,
                        if param.required { ", required" } else { "" },
                        param.description.as_deref().unwrap_or("No description")
                    ));
                }
            }
        }
        out.push_str(
            "\nTo use a tool, respond with a JSON object in the following format:\n\
             {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
             You may request several tools in one response. After execution the results are \
             added to the conversation and you can continue.\n",
        );
        Some(out)
    }
}

const TOOL_CALL_MARKER: &str = "{\"tool_call\"";

/// Extract every `{"tool_call": {...}}` object from a model response, in order.
///
/// Objects are delimited by brace counting so nested parameter objects survive. Fragments
/// that are not valid JSON or lack a `name` are skipped.
pub fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = response[cursor..].find(TOOL_CALL_MARKER) {
        let start = cursor + offset;
        let mut depth = 0usize;
        let mut end = None;
        let mut in_string = false;
        let mut escaped = false;

        for (i, ch) in response[start..].char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = match end {
            Some(end) => end,
            // unterminated object, nothing more to find
            None => break,
        };

        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&response[start..end]) {
            if let Some(call) = parsed.get("tool_call") {
                if let Some(name) = call.get("name").and_then(|v| v.as_str()) {
                    calls.push(ToolCall {
                        name: name.to_string(),
                        parameters: call
                            .get("parameters")
                            .cloned()
                            .unwrap_or_else(|| serde_json::json!({})),
                    });
                }
            }
        }
        cursor = end;
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProtocol;

    #[async_trait]
    impl ToolProtocol for MockProtocol {
        async fn execute(
            &self,
            tool_name: &str,
            _parameters: serde_json::Value,
        ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
            Ok(ToolResult::success(serde_json::json!({
                "tool": tool_name,
                "result": "mock_result"
            })))
        }

        async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
            Ok(vec![
                ToolMetadata::new("get_news", "Company news"),
                ToolMetadata::new("get_indicators", "Technical indicators"),
            ])
        }

        fn protocol_name(&self) -> &str {
            "mock"
        }
    }

    #[test]
    fn test_parse_single_tool_call() {
        let response = r#"Let me check. {"tool_call": {"name": "get_news", "parameters": {"ticker": "NVDA"}}}"#;
        let calls = parse_tool_calls(response);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_news");
        assert_eq!(calls[0].parameters["ticker"], "NVDA");
    }

    #[test]
    fn test_parse_multiple_tool_calls_keeps_order() {
        let response = r#"{"tool_call": {"name": "a", "parameters": {"nested": {"x": 1}}}}
then {"tool_call": {"name": "b", "parameters": {"text": "brace } inside"}}}"#;
        let calls = parse_tool_calls(response);
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(calls[0].parameters["nested"]["x"], 1);
        assert_eq!(calls[1].parameters["text"], "brace } inside");
    }

    #[test]
    fn test_parse_ignores_plain_text_and_broken_json() {
        assert!(parse_tool_calls("Final report: BUY").is_empty());
        assert!(parse_tool_calls(r#"{"tool_call": {"name": "x""#).is_empty());
        assert!(parse_tool_calls(r#"{"tool_call": {"parameters": {}}}"#).is_empty());
    }

    #[tokio::test]
    async fn test_registry_from_protocol() {
        let registry = ToolRegistry::from_protocol(Arc::new(MockProtocol))
            .await
            .unwrap();
        assert_eq!(registry.tool_names(), "get_indicators, get_news");

        let result = registry
            .execute_tool("get_news", serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["tool"], "get_news");
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute_tool("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: missing");
        assert!(registry.describe_tools().is_none());
    }

    #[test]
    fn test_describe_tools_mentions_protocol() {
        let mut registry = ToolRegistry::new();
        registry.add_tool(Tool::new(
            ToolMetadata::new("get_stock_data", "Price history").with_parameter(
                ToolParameter::new("ticker", ToolParameterType::String).required(),
            ),
            Arc::new(MockProtocol),
        ));
        let text = registry.describe_tools().unwrap();
        assert!(text.contains("- get_stock_data: Price history"));
        assert!(text.contains("ticker (String, required)"));
        assert!(text.contains("{\"tool_call\""));
    }
}
