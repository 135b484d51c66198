use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::Shell;
use crate::error::ToolError;
use crate::registry::{FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistryBuilder};

const MAX_OUTPUT_BYTES: usize = 16 * 1024;

pub(super) fn register(builder: &mut ToolRegistryBuilder, shell: Arc<dyn Shell>) -> Result<()> {
    builder.register(
        ToolDescriptor::new(
            "terminal",
            "Run a shell command inside a project directory. Output is stdout and stderr combined; \
             a non-zero exit status fails the call.",
        )
        .field(FieldSpec::required("command", FieldType::String, "Command line to run"))
        .field(FieldSpec::optional(
            "cd",
            FieldType::Path,
            "Working directory (defaults to the primary project root)",
        ))
        .mutating(),
        Arc::new(TerminalTool { shell }),
    )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TerminalRequest {
    command: String,
}

/// Keep the head of oversized output, cut on a char boundary.
fn truncate_output(output: String) -> (String, bool) {
    if output.len() <= MAX_OUTPUT_BYTES {
        return (output, false);
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    (output[..cut].to_string(), true)
}

struct TerminalTool {
    shell: Arc<dyn Shell>,
}

#[async_trait]
impl ToolHandler for TerminalTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let request: TerminalRequest = input.parse()?;
        if request.command.trim().is_empty() {
            return Err(ToolError::invalid_input("command must not be empty").into());
        }
        let working_dir = match input.opt_path("cd") {
            Some(dir) => dir.clone(),
            None => input
                .context()
                .working_dir()
                .ok_or_else(|| ToolError::out_of_bounds("No project roots are configured"))?,
        };

        let result = self.shell.run(&request.command, &working_dir).await?;
        let (output, truncated) = truncate_output(result.output);

        match result.exit_code {
            Some(0) => Ok(serde_json::json!({
                "command": request.command,
                "cd": working_dir,
                "exit_code": 0,
                "output": output,
                "truncated": truncated,
            })),
            Some(code) => anyhow::bail!("`{}` exited with status {code}\n{output}", request.command),
            None => anyhow::bail!("`{}` was terminated by a signal\n{output}", request.command),
        }
    }
}
