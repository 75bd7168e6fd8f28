//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat API and any
//! OpenAI-compatible endpoint, capturing token usage for every call.
//!
//! Tools reach the model through the text tool-call protocol embedded in the system message,
//! so the `tools` argument of `send_message` is not forwarded.
//!
//! # Example
//!
//! ```rust,no_run
//! use deliberation::clients::openai::OpenAIClient;
//! use deliberation::client_wrapper::{ClientWrapper, Message};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let secret_key = std::env::var("OPEN_AI_SECRET")?;
//! let client = OpenAIClient::new_with_model_string(&secret_key, "gpt-4.1-mini");
//!
//! let reply = client
//!     .send_message(&[Message::system("You are terse."), Message::user("Hi")], None)
//!     .await?;
//! println!("{}", reply.content);
//! if let Some(usage) = reply.usage {
//!     println!("{} tokens", usage.total_tokens);
//! }
//! # Ok(())
//! # }
//! ```
use std::sync::Mutex;

use async_trait::async_trait;
use openai_rust::chat;
use openai_rust2 as openai_rust;

use crate::deliberation::client_wrapper::{ClientError, ClientWrapper, Message, Role, TokenUsage};
use crate::deliberation::clients::common::{get_shared_http_client, send_and_track};
use crate::deliberation::tool_protocol::ToolMetadata;

pub struct OpenAIClient {
    client: openai_rust::Client,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client(
                secret_key,
                get_shared_http_client().clone(),
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Target a self-hosted or third-party OpenAI-compatible deployment.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_shared_http_client().clone(),
                base_url,
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        // Tool results go back as user turns; the chat API's tool role needs native call ids.
        Role::Tool => "user",
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolMetadata]>,
    ) -> Result<Message, ClientError> {
        let formatted_messages = messages
            .iter()
            .map(|msg| chat::Message {
                role: role_name(msg.role).to_owned(),
                content: msg.content.clone(),
            })
            .collect();

        let (content, usage) = send_and_track(
            &self.client,
            &self.model,
            formatted_messages,
            Some("/v1/chat/completions".to_string()),
            &self.token_usage,
        )
        .await?;

        Ok(Message::assistant(content).with_usage(usage))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
