//! MCP client side of the tool boundary: spawn the scraping server as a child process, list its
//! tools once, and call them with flat `{url, ...}` arguments.

use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use std::time::Duration;
use webwhiz_core::{Error, Result, ScrapeRequest, ToolDescriptor, ToolProvider};

pub const DEFAULT_COMMAND: &str = "npx";
pub const DEFAULT_ARGS: &str = "-y @brightdata/mcp";
/// Env var the child reads its credential from.
pub const CHILD_TOKEN_VAR: &str = "API_TOKEN";

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Passed through as-is; the server decides whether it is valid.
    pub api_token: Option<String>,
}

impl McpServerConfig {
    pub fn new(command: &str, args: &str, api_token: Option<String>) -> Self {
        Self {
            command: command.trim().to_string(),
            args: args.split_whitespace().map(str::to_string).collect(),
            api_token: api_token
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct McpToolProvider {
    service: RunningService<RoleClient, ()>,
}

impl McpToolProvider {
    /// Spawn the server and finish the MCP handshake within `timeout_ms`.
    pub async fn connect(cfg: &McpServerConfig, timeout_ms: u64) -> Result<Self> {
        let transport = TokioChildProcess::new(tokio::process::Command::new(&cfg.command).configure(
            |cmd| {
                cmd.args(&cfg.args);
                if let Some(tok) = &cfg.api_token {
                    cmd.env(CHILD_TOKEN_VAR, tok);
                }
            },
        ))
        .map_err(|e| Error::Connection(format!("failed to start {:?}: {e}", cfg.command)))?;

        let service = tokio::time::timeout(Duration::from_millis(timeout_ms), ().serve(transport))
            .await
            .map_err(|_| {
                Error::Connection(format!("MCP handshake timed out after {timeout_ms}ms"))
            })?
            .map_err(|e| Error::Connection(format!("MCP handshake failed: {e}")))?;
        tracing::debug!(command = %cfg.display_command(), "tool server connected");
        Ok(Self::from_service(service))
    }

    pub fn from_service(service: RunningService<RoleClient, ()>) -> Self {
        Self { service }
    }

    pub async fn shutdown(self) {
        let _ = self.service.cancel().await;
    }
}

#[async_trait::async_trait]
impl ToolProvider for McpToolProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| Error::Connection(format!("list_tools failed: {e}")))?;
        Ok(tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.into_owned(),
                description: t.description.map(|d| d.into_owned()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, req: &ScrapeRequest) -> Result<String> {
        let r = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(req.arguments()),
            })
            .await
            .map_err(|e| Error::ToolInvocation(format!("{name}: {e}")))?;

        let text = result_text(&r);
        if r.is_error.unwrap_or(false) {
            let msg = text.trim();
            return Err(Error::ToolInvocation(if msg.is_empty() {
                format!("{name}: tool reported an error")
            } else {
                format!("{name}: {msg}")
            }));
        }
        Ok(text)
    }
}

/// Text items joined by newlines. Falls back to structured content when a tool sends no text.
pub(crate) fn result_text(r: &CallToolResult) -> String {
    let parts: Vec<&str> = r
        .content
        .iter()
        .filter_map(|c| c.as_text())
        .map(|t| t.text.as_str())
        .collect();
    if !parts.is_empty() {
        return parts.join("\n");
    }
    r.structured_content
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default()
}
