//! Tool protocol implementations.
//!
//! [`CustomToolProtocol`] exposes plain Rust functions (sync or async) as tools. Data-vendor
//! lookups, cached files or test fixtures are all registered this way and then bound to an
//! analyst role through a [`ToolRegistry`](crate::tool_protocol::ToolRegistry).

use crate::deliberation::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(JsonValue) -> BoxFuture<'static, Result<ToolResult, Box<dyn Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// Custom function-calling tool adapter
///
/// # Example
///
/// ```rust
/// use deliberation::tool_protocols::CustomToolProtocol;
/// use deliberation::tool_protocol::{ToolMetadata, ToolResult};
/// use std::sync::Arc;
///
/// # async {
/// let protocol = CustomToolProtocol::new();
/// protocol
///     .register_tool(
///         ToolMetadata::new("get_fundamentals", "Company fundamentals"),
///         Arc::new(|params: serde_json::Value| {
///             let ticker = params["ticker"].as_str().unwrap_or("?");
///             Ok(ToolResult::text(format!("{}: P/E 31.2", ticker)))
///         }),
///     )
///     .await;
/// # };
/// ```
pub struct CustomToolProtocol {
    tools: Arc<RwLock<HashMap<String, ToolMetadata>>>,
    sync_functions: Arc<RwLock<HashMap<String, ToolFunction>>>,
    async_functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl CustomToolProtocol {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            sync_functions: Arc::new(RwLock::new(HashMap::new())),
            async_functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a synchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.async_functions.write().await.remove(&name);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.sync_functions.write().await.remove(&name);
        self.async_functions.write().await.insert(name, function);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        // Clone the handle out so the lock is not held across the tool's own await.
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(parameters).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(parameters);
        }

        Err(Box::new(ToolError::NotFound(tool_name.to_string())))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        let mut listed: Vec<ToolMetadata> = tools.values().cloned().collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}
