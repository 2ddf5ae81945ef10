use async_trait::async_trait;

use crate::errors::ToolResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// Core trait that defines a set of tools offered to a tool-calling client
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters
    async fn call(&self, tool_call: ToolCall) -> ToolResult<Vec<Content>>;
}
