use anyhow::{bail, Context, Result};
use palette::models::content::Content;
use palette::models::tool::Tool;
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, ClientRequest, Implementation,
    PaginatedRequestParam, ProtocolVersion, RequestNoParam, ServerInfo, ServerResult,
};
use rmcp::service::RunningService;
use rmcp::transport::{IntoTransport, TokioChildProcess};
use rmcp::{ClientHandler, RoleClient};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::convert::{from_mcp_content, from_mcp_tool};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Result of a tool call, in the palette data model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<Content>,
    pub is_error: bool,
}

impl ToolOutput {
    /// Join the text items of the result
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone)]
struct PaletteClientHandler {
    info: ClientInfo,
}

impl ClientHandler for PaletteClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

/// An MCP session with a tool server, started as a child process or over any stream.
pub struct McpClient {
    service: RunningService<RoleClient, PaletteClientHandler>,
}

impl McpClient {
    /// Start `command` and complete the initialize handshake over its stdio
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        client_name: &str,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args).envs(env);
        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("Failed to start tool server '{}'", command))?;
        Self::connect(transport, client_name).await
    }

    /// Complete the initialize handshake over an already open transport
    pub async fn connect<T, E, A>(transport: T, client_name: &str) -> Result<Self>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handler = PaletteClientHandler {
            info: ClientInfo {
                protocol_version: ProtocolVersion::LATEST,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: client_name.to_string(),
                    title: None,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    icons: None,
                    website_url: None,
                },
            },
        };

        let service = rmcp::serve_client(handler, transport)
            .await
            .context("MCP handshake failed")?;
        if let Some(info) = service.peer().peer_info() {
            info!(server = %info.server_info.name, version = %info.server_info.version, "connected to tool server");
        }
        Ok(Self { service })
    }

    /// What the server reported during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.service.peer().peer_info()
    }

    pub async fn ping(&self) -> Result<()> {
        let result = self
            .service
            .send_request(ClientRequest::PingRequest(RequestNoParam::default()))
            .await?;
        match result {
            ServerResult::EmptyResult(_) => Ok(()),
            other => bail!("Unexpected ping response: {:?}", other),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .service
                .peer()
                .list_tools(Some(PaginatedRequestParam { cursor }))
                .await?;
            tools.extend(page.tools.into_iter().map(from_mcp_tool));
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    /// Invoke a tool. A tool that ran and failed comes back as `is_error`; a call the
    /// server refused is an `Err` carrying the protocol error.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => bail!("Tool arguments must be an object, got: {}", other),
        };

        debug!(tool = name, "calling tool");
        let result = self
            .service
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await?;

        Ok(ToolOutput {
            content: result.content.into_iter().filter_map(from_mcp_content).collect(),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    /// End the session, which closes the server's stdin
    pub async fn shutdown(self) -> Result<()> {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.service.cancel()).await {
            Ok(result) => {
                let reason = result?;
                debug!(?reason, "session closed");
                Ok(())
            }
            Err(_) => bail!("Tool server did not stop within {:?}", SHUTDOWN_GRACE),
        }
    }
}
