use palette::errors::ToolError;
use palette::models::tool::ToolCall;
use palette::systems::System;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::convert::{to_mcp_content, to_mcp_tool};

pub const SERVER_NAME: &str = "palette-mcp";

/// Exposes the tools of one [`System`] as an MCP server.
///
/// Tool calls run one at a time in the order they arrive; requests that do not invoke a
/// tool are answered while a call is in flight.
#[derive(Clone)]
pub struct McpServer {
    system: Arc<dyn System>,
    invocation: Arc<Mutex<()>>,
}

impl McpServer {
    pub fn new(system: Arc<dyn System>) -> Self {
        Self {
            system,
            invocation: Arc::new(Mutex::new(())),
        }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = self.system.instructions();
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: (!instructions.is_empty()).then(|| instructions.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(
            self.system.tools().iter().map(to_mcp_tool).collect(),
        ))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        let call = ToolCall::new(request.name.to_string(), arguments);

        let _turn = self.invocation.lock().await;
        info!(tool = %call.name, "tool call");
        match self.system.call(call).await {
            Ok(content) => Ok(CallToolResult::success(
                content.into_iter().map(to_mcp_content).collect(),
            )),
            Err(error) => tool_error(error),
        }
    }
}

/// Failures of a tool that ran go back as an error result the caller can read; bad calls
/// are protocol errors.
fn tool_error(error: ToolError) -> Result<CallToolResult, ErrorData> {
    match error {
        ToolError::ExecutionError(message) => {
            warn!(%message, "tool call failed");
            Ok(CallToolResult::error(vec![Content::text(message)]))
        }
        ToolError::ToolNotFound(_) | ToolError::InvalidParameters(_) => {
            Err(ErrorData::invalid_params(error.to_string(), None))
        }
        other => Err(ErrorData::internal_error(other.to_string(), None)),
    }
}
