//! MCP surface over the engine: one MCP tool per registered tool plus `batch`.

use crate::catalog::{batch_input_schema, BATCH_DESCRIPTION};
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer};
use serde_json::{json, Value};
use std::sync::Arc;
use toolhost_engine::plan::{BatchRequest, BATCH_TOOL_NAME};
use toolhost_engine::protocol::{serialize_json, ErrorEnvelope};
use toolhost_engine::{Engine, ExecutionContext, ToolError, ToolRegistry};

const INSTRUCTIONS: &str = "Toolhost exposes sandboxed project tools. Paths are written as \
`<root-name>/<relative path>`; anything resolving outside the configured roots is refused with \
`out_of_bounds`. Paged tools (grep, find_path, code_symbols) return `next_actions` with the exact \
call for the next page. Use `batch` to run several calls sequentially or concurrently.";

#[derive(Clone)]
pub struct ToolhostService {
    engine: Engine,
    context: ExecutionContext,
    tools: Arc<Vec<Tool>>,
}

impl ToolhostService {
    pub fn new(engine: Engine, context: ExecutionContext) -> Self {
        let tools = Arc::new(mcp_tools(engine.registry()));
        Self {
            engine,
            context,
            tools,
        }
    }

    async fn run_batch(&self, input: Value) -> Result<Value, ToolError> {
        let request: BatchRequest = serde_json::from_value(input).map_err(|err| {
            ToolError::invalid_input(format!("Invalid batch request: {err}"))
        })?;
        let outcome = self.engine.batch(request.into_plan(), &self.context).await?;
        serde_json::to_value(outcome)
            .map_err(|err| ToolError::ToolFailure(format!("Failed to encode batch outcome: {err}")))
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        if name == BATCH_TOOL_NAME {
            self.run_batch(input).await
        } else {
            self.engine.call(name, input, &self.context).await
        }
    }
}

fn mcp_tools(registry: &ToolRegistry) -> Vec<Tool> {
    let mut tools: Vec<Tool> = registry
        .descriptors()
        .map(|descriptor| {
            Tool::new(
                descriptor.name.clone(),
                descriptor.description.clone(),
                Arc::new(descriptor.input_schema()),
            )
        })
        .collect();
    tools.push(Tool::new(
        BATCH_TOOL_NAME,
        BATCH_DESCRIPTION,
        Arc::new(batch_input_schema()),
    ));
    tools
}

fn success_result(value: Value) -> CallToolResult {
    let text = serialize_json(&value).unwrap_or_else(|_| value.to_string());
    let mut result = CallToolResult::success(vec![Content::text(text)]);
    if value.is_object() {
        result.structured_content = Some(value);
    }
    result
}

fn error_result(envelope: ErrorEnvelope) -> CallToolResult {
    let mut result = CallToolResult::error(vec![Content::text(envelope.to_string())]);
    result.structured_content = Some(json!({ "error": envelope }));
    result
}

impl ServerHandler for ToolhostService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "toolhost-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools.as_ref().clone()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let input = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        let result = match self.invoke(request.name.as_ref(), input).await {
            Ok(value) => success_result(value),
            Err(err) => {
                log::debug!("{} failed: {err}", request.name);
                error_result(err.to_envelope())
            }
        };
        Ok(result)
    }
}
