//! Runs the tool turn of a call: exposing the order desk's tools to the
//! realtime model and executing the calls it makes.

use super::provider::events::ToolDefinition;
use anyhow::{Context, Result};
use hostline_core::tools::{OrderDesk, TOOL_FAILED_RESULT, TOOL_NAMES, UNKNOWN_TOOL_RESULT};
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, JsonObject, RawContent},
    service::{RoleClient, RunningService},
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// An order desk served in-process for one call, with the client the bridge calls it through.
pub struct ToolLink {
    client: RunningService<RoleClient, ()>,
    server: JoinHandle<()>,
}

impl ToolLink {
    pub async fn start(desk: OrderDesk) -> Result<Self> {
        let (server_transport, client_transport) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            match desk.serve(server_transport).await {
                Ok(service) => {
                    let _ = service.waiting().await;
                }
                Err(e) => error!(error = ?e, "Order desk failed to start"),
            }
        });
        let client = ().serve(client_transport).await?;
        Ok(Self { client, server })
    }

    /// Tool schemas in the shape the realtime session expects.
    pub async fn definitions(&self) -> Result<Vec<ToolDefinition>> {
        self.client
            .list_all_tools()
            .await?
            .into_iter()
            .map(|t| {
                Ok(ToolDefinition::Function {
                    name: t.name.to_string(),
                    description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                    parameters: serde_json::to_value(&*t.input_schema)?,
                })
            })
            .collect()
    }

    /// Executes one tool call and returns the text to hand back to the model.
    ///
    /// Never fails: unknown tools and broken calls map to fixed sentences.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> String {
        if !TOOL_NAMES.contains(&name) {
            warn!(tool = name, "Model called an unknown tool");
            return UNKNOWN_TOOL_RESULT.to_string();
        }
        match self.call(name, arguments).await {
            Ok(text) => text,
            Err(e) => {
                error!(tool = name, error = ?e, "Tool call failed");
                TOOL_FAILED_RESULT.to_string()
            }
        }
    }

    async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let arguments = parse_arguments(arguments)?;
        let result = self
            .client
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await?;

        if result.is_error.unwrap_or(false) {
            warn!(tool = name, "Tool reported a degraded result");
        }
        let annotated_content = result
            .content
            .context("Tool call returned no content")?
            .pop()
            .context("Content list was empty")?;
        let text = match annotated_content.raw {
            RawContent::Text(text_content) => text_content.text,
            _ => anyhow::bail!("Unexpected content type from tool"),
        };
        info!(tool = name, result = %text, "Tool call completed");
        Ok(text)
    }

    pub fn shutdown(self) {
        drop(self.client);
        self.server.abort();
    }
}

/// Parses the model's JSON argument string; an empty string means no arguments.
fn parse_arguments(arguments: &str) -> Result<JsonObject> {
    if arguments.trim().is_empty() {
        return Ok(JsonObject::new());
    }
    serde_json::from_str(arguments).context("Tool arguments are not a JSON object")
}
