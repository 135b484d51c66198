use serde::Serialize;
use serde_json::{json, Map, Value};
use toolhost_engine::plan::{BatchRequest, BATCH_TOOL_NAME, MAX_PLAN_LEAVES};
use toolhost_engine::ToolRegistry;

pub const BATCH_DESCRIPTION: &str = "Run several tool calls in one request. Pass either `plan` \
(a tree of leaf/sequential/concurrent nodes) or `invocations` with `run_tools_concurrently`. \
Sequential groups stop at the first failure; concurrent groups always run every child. \
Results come back in plan order.";

/// JSON Schema for the batch entry point. MCP requires an object schema at the top level.
pub fn batch_input_schema() -> Map<String, Value> {
    let schema = schemars::schema_for!(BatchRequest);
    let mut object = match serde_json::to_value(schema) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    };
    object
        .entry("type")
        .or_insert_with(|| Value::String("object".to_string()));
    object
}

#[derive(Debug, Serialize)]
struct ToolSummary<'a> {
    name: &'a str,
    description: &'a str,
    mutates_filesystem: bool,
}

/// Tool inventory printed by `--print-tools`.
pub fn tool_inventory_json(version: &str, registry: &ToolRegistry) -> String {
    let mut tools: Vec<ToolSummary<'_>> = registry
        .descriptors()
        .map(|descriptor| ToolSummary {
            name: &descriptor.name,
            description: &descriptor.description,
            mutates_filesystem: descriptor.mutates_filesystem,
        })
        .collect();
    tools.push(ToolSummary {
        name: BATCH_TOOL_NAME,
        description: BATCH_DESCRIPTION,
        mutates_filesystem: true,
    });

    let payload = json!({
        "server": "toolhost-mcp",
        "version": version,
        "max_plan_leaves": MAX_PLAN_LEAVES,
        "tools": tools,
    });
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}
