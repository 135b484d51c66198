use std::sync::Arc;

use crate::error::Result;
use crate::sandbox::{self, ProjectRoots, SandboxedPath};

/// Everything a tool may know about where it runs. Shared, read-only, and identical for a
/// leaf inside a batch and the same call dispatched on its own.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    roots: Arc<ProjectRoots>,
    working_dir: Option<SandboxedPath>,
}

impl ExecutionContext {
    pub fn new(roots: ProjectRoots) -> Self {
        Self {
            roots: Arc::new(roots),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: SandboxedPath) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn roots(&self) -> &ProjectRoots {
        &self.roots
    }

    /// Explicit working directory, else the primary root.
    pub fn working_dir(&self) -> Option<SandboxedPath> {
        self.working_dir
            .clone()
            .or_else(|| self.roots.primary().map(SandboxedPath::root))
    }

    pub fn resolve(&self, path: &str) -> Result<SandboxedPath> {
        sandbox::resolve(path, &self.roots)
    }
}

/// One tool call: name, raw input object, and the context it runs in.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: String,
    pub input: serde_json::Value,
    pub context: ExecutionContext,
}

impl Invocation {
    pub fn new(
        tool: impl Into<String>,
        input: serde_json::Value,
        context: ExecutionContext,
    ) -> Self {
        Self {
            tool: tool.into(),
            input,
            context,
        }
    }
}
