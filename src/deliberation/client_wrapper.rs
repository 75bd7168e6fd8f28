//! Model-invocation boundary.
//!
//! A [`ClientWrapper`] is a thin wrapper around one language-model service. It does not keep
//! track of any conversation: every node in the pipeline builds its own ordered message list
//! and hands it over together with the tools that are active for that call.

use crate::deliberation::tool_protocol::{ToolCall, ToolMetadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Mutex;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Set by the pipeline to steer the model's responses.
    System,
    /// Input handed to the model (initial request, placeholders).
    User,
    /// Text the model generated.
    Assistant,
    /// The rendered outcome of a tool invocation.
    Tool,
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message exchanged with an LLM.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
    /// Tool invocations requested by an assistant message, in the order they appeared.
    pub tool_calls: Vec<ToolCall>,
    /// Tokens spent producing this reply, when the client reports them.
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Attach the tool calls parsed out of this message.
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// `true` when the model asked for at least one tool.
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Error type returned by model clients. It must cross task boundaries during fan-out.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send an ordered list of messages to the model and return its reply.
    ///
    /// `tools` carries the schema of every tool bound for this call, or `None` when the caller
    /// does not expose tools. Clients that speak the text tool-call protocol may ignore it since
    /// the instructions are already part of the system message.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<&[ToolMetadata]>,
    ) -> Result<Message, ClientError>;

    /// Identifier of the backing model, used in logs and events.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    ///
    /// The slot is shared by every caller of this client, so concurrent calls overwrite each
    /// other. Per-call usage travels on the returned [`Message::usage`].
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    /// Clients that track token usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
