use serde_json::Value;
use std::sync::Arc;

use crate::error::ToolError;
use crate::invocation::Invocation;
use crate::registry::ToolRegistry;

pub type InvocationResult = std::result::Result<Value, ToolError>;

/// Single-invocation dispatch: lookup, input validation, sandboxing, execution.
///
/// Exactly one handler call per dispatch, and only after every path field was resolved
/// inside a project root.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, invocation: Invocation) -> InvocationResult {
        let Invocation {
            tool,
            input,
            context,
        } = invocation;

        let Some(registered) = self.registry.get(&tool) else {
            log::debug!("dispatch: unknown tool '{tool}'");
            return Err(ToolError::invalid_input(format!("Unknown tool '{tool}'")));
        };

        let input = registered.descriptor.prepare(input, &context).map_err(|err| {
            log::debug!("dispatch: rejected input for '{tool}': {err}");
            err
        })?;

        log::debug!("dispatch: running '{tool}'");
        match registered.handler.run(input).await {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = classify_handler_error(err);
                log::warn!("tool '{tool}' failed: {err}");
                Err(err)
            }
        }
    }
}

/// A `ToolError` anywhere in the chain keeps its kind; everything else is a tool failure.
pub(crate) fn classify_handler_error(err: anyhow::Error) -> ToolError {
    if let Some(tool_err) = err.downcast_ref::<ToolError>() {
        return tool_err.clone();
    }
    ToolError::ToolFailure(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn typed_errors_survive_context() {
        let err = anyhow::Error::from(ToolError::not_found("a.txt"))
            .context("while reading");
        assert_eq!(classify_handler_error(err), ToolError::not_found("a.txt"));
    }

    #[test]
    fn untyped_errors_become_failures() {
        let err = std::fs::read("/definitely/not/here")
            .context("reading config")
            .expect_err("missing file");
        match classify_handler_error(err) {
            ToolError::ToolFailure(message) => assert!(message.starts_with("reading config: ")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
