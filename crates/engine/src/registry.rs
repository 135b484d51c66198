//! Tool descriptors, the handler contract, and the immutable registry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use crate::error::{Result, ToolError};
use crate::invocation::ExecutionContext;
use crate::sandbox::SandboxedPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Non-negative integer.
    Integer,
    Boolean,
    /// String resolved through the sandbox before the handler runs.
    Path,
    Enum(&'static [&'static str]),
    Object,
    Array,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Path => value.is_string(),
            Self::Integer => value.as_u64().is_some(),
            Self::Boolean => value.is_boolean(),
            Self::Enum(variants) => value.as_str().is_some_and(|s| variants.contains(&s)),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::String => "a string".to_string(),
            Self::Integer => "a non-negative integer".to_string(),
            Self::Boolean => "a boolean".to_string(),
            Self::Path => "a project path string".to_string(),
            Self::Enum(variants) => format!("one of {}", variants.join(", ")),
            Self::Object => "an object".to_string(),
            Self::Array => "an array".to_string(),
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::String | Self::Path => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer", "minimum": 0 }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum(variants) => json!({ "type": "string", "enum": variants }),
            Self::Object => json!({ "type": "object" }),
            Self::Array => json!({ "type": "array" }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub mutates_filesystem: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
            mutates_filesystem: false,
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn mutating(mut self) -> Self {
        self.mutates_filesystem = true;
        self
    }

    /// JSON Schema for the input object, as advertised to agents.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut schema = field.ty.json_schema();
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".to_string(), json!(field.description));
            }
            properties.insert(field.name.to_string(), schema);
            if field.required {
                required.push(json!(field.name));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), Value::Array(required));
        schema.insert("additionalProperties".to_string(), json!(false));
        schema
    }

    /// Structural validation: object shape, unknown fields, required fields, field types.
    /// Explicit `null` on an optional field is treated as absent.
    pub fn check_fields(&self, input: Value) -> Result<Map<String, Value>> {
        let mut fields = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ToolError::invalid_input(format!(
                    "Input for '{}' must be an object, got {}",
                    self.name,
                    json_type_name(&other)
                )))
            }
        };

        if let Some(unknown) = fields
            .keys()
            .find(|key| !self.fields.iter().any(|f| f.name == key.as_str()))
        {
            let allowed: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
            return Err(ToolError::invalid_input(format!(
                "Unknown field `{unknown}` for '{}' (allowed: {})",
                self.name,
                allowed.join(", ")
            )));
        }

        for field in &self.fields {
            match fields.get(field.name).filter(|value| !value.is_null()) {
                None if field.required => {
                    return Err(ToolError::invalid_input(format!(
                        "Missing required field `{}` for '{}'",
                        field.name, self.name
                    )));
                }
                Some(value) if !field.ty.accepts(value) => {
                    return Err(ToolError::invalid_input(format!(
                        "Field `{}` for '{}' must be {}",
                        field.name,
                        self.name,
                        field.ty.describe()
                    )));
                }
                _ => {}
            }
        }
        fields.retain(|_, value| !value.is_null());

        Ok(fields)
    }

    /// Validate the input and resolve every path-typed field through the sandbox.
    pub fn prepare(&self, input: Value, context: &ExecutionContext) -> Result<ToolInput> {
        let fields = self.check_fields(input)?;
        let mut paths = HashMap::new();
        for field in self.fields.iter().filter(|f| f.ty == FieldType::Path) {
            if let Some(raw) = fields.get(field.name).and_then(Value::as_str) {
                paths.insert(field.name, context.resolve(raw)?);
            }
        }
        Ok(ToolInput {
            tool: self.name.clone(),
            fields,
            paths,
            context: context.clone(),
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validated input handed to a handler. Path fields are already sandboxed.
#[derive(Debug, Clone)]
pub struct ToolInput {
    tool: String,
    fields: Map<String, Value>,
    paths: HashMap<&'static str, SandboxedPath>,
    context: ExecutionContext,
}

impl ToolInput {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn path(&self, name: &str) -> Result<&SandboxedPath> {
        self.paths
            .get(name)
            .ok_or_else(|| ToolError::invalid_input(format!("Missing path field `{name}`")))
    }

    pub fn opt_path(&self, name: &str) -> Option<&SandboxedPath> {
        self.paths.get(name)
    }

    /// Deserialize the (already type-checked) fields into a typed request.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|err| {
            ToolError::invalid_input(format!("Invalid input for '{}': {err}", self.tool))
        })
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, input: ToolInput) -> anyhow::Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn run(&self, input: ToolInput) -> anyhow::Result<Value> {
        (self.0)(input).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> anyhow::Result<&mut Self> {
        let name = descriptor.name.clone();
        if name.trim().is_empty() {
            anyhow::bail!("Tool name must not be empty");
        }
        if name == toolhost_plan::BATCH_TOOL_NAME {
            anyhow::bail!("Tool name '{name}' is reserved for the batch entry point");
        }
        if self.tools.contains_key(&name) {
            anyhow::bail!("Tool '{name}' is already registered");
        }
        self.tools.insert(
            name,
            RegisteredTool {
                descriptor,
                handler,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// Name → descriptor + handler. Immutable once built; share it behind an `Arc`.
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Descriptors sorted by tool name.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|tool| &tool.descriptor)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
