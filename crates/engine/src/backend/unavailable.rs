use anyhow::Result;
use async_trait::async_trait;

use super::{CodeIntelligence, Diagnostics, FileOutline, Location, TextEdit};
use crate::error::ToolError;
use crate::locator::{SourcePosition, SymbolCommand};
use crate::sandbox::SandboxedPath;

const MESSAGE: &str = "no code-intelligence backend configured";

/// Placeholder used when no language server is attached. Every query fails with a tool failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCodeIntelligence;

fn unavailable<T>() -> Result<T> {
    Err(ToolError::ToolFailure(MESSAGE.to_string()).into())
}

#[async_trait]
impl CodeIntelligence for UnavailableCodeIntelligence {
    async fn query(&self, _position: &SourcePosition, _command: SymbolCommand) -> Result<Vec<Location>> {
        unavailable()
    }

    async fn outline(&self, _path: Option<&SandboxedPath>) -> Result<Vec<FileOutline>> {
        unavailable()
    }

    async fn diagnostics(&self, _path: Option<&SandboxedPath>) -> Result<Diagnostics> {
        unavailable()
    }

    async fn rename(&self, _position: &SourcePosition, _new_name: &str) -> Result<Vec<TextEdit>> {
        unavailable()
    }
}
