use serde_json::Value;
use std::sync::Arc;
use toolhost_plan::{ExecutionPlan, PlanOutcome};

use crate::backend::{
    CodeIntelligence, Fetcher, FileSystem, HttpFetcher, LocalFileSystem, ProcessShell, Shell,
    UnavailableCodeIntelligence,
};
use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, InvocationResult};
use crate::error::ToolError;
use crate::invocation::{ExecutionContext, Invocation};
use crate::orchestrator::BatchOrchestrator;
use crate::registry::{ToolDescriptor, ToolHandler, ToolRegistry};
use crate::tools::{register_builtin_tools, Backends};

/// Registry, dispatcher, and orchestrator wired to one set of backends.
#[derive(Clone)]
pub struct Engine {
    dispatcher: Dispatcher,
    orchestrator: BatchOrchestrator,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn call(&self, tool: &str, input: Value, context: &ExecutionContext) -> InvocationResult {
        self.dispatcher
            .dispatch(Invocation::new(tool, input, context.clone()))
            .await
    }

    pub async fn batch(
        &self,
        plan: ExecutionPlan,
        context: &ExecutionContext,
    ) -> Result<PlanOutcome, ToolError> {
        self.orchestrator.execute(plan, context).await
    }
}

/// Unset backends fall back to the local reference implementations.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    fs: Option<Arc<dyn FileSystem>>,
    shell: Option<Arc<dyn Shell>>,
    code: Option<Arc<dyn CodeIntelligence>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    builtins: bool,
    extra: Vec<(ToolDescriptor, Arc<dyn ToolHandler>)>,
}

impl EngineBuilder {
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    #[must_use]
    pub fn shell(mut self, shell: Arc<dyn Shell>) -> Self {
        self.shell = Some(shell);
        self
    }

    #[must_use]
    pub fn code_intelligence(mut self, code: Arc<dyn CodeIntelligence>) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Register the builtin tool set next to any custom tools.
    #[must_use]
    pub fn with_builtins(mut self) -> Self {
        self.builtins = true;
        self
    }

    #[must_use]
    pub fn tool(mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        self.extra.push((descriptor, handler));
        self
    }

    pub fn build(self) -> anyhow::Result<Engine> {
        let mut registry = ToolRegistry::builder();
        if self.builtins {
            let fetcher = match self.fetcher {
                Some(fetcher) => fetcher,
                None => Arc::new(HttpFetcher::new(&self.config)?),
            };
            let backends = Backends {
                fs: self.fs.unwrap_or_else(|| Arc::new(LocalFileSystem::new())),
                shell: self
                    .shell
                    .unwrap_or_else(|| Arc::new(ProcessShell::new(self.config.shell_timeout))),
                code: self
                    .code
                    .unwrap_or_else(|| Arc::new(UnavailableCodeIntelligence)),
                fetcher,
            };
            register_builtin_tools(&mut registry, &backends, &self.config)?;
        }
        for (descriptor, handler) in self.extra {
            registry.register(descriptor, handler)?;
        }

        let dispatcher = Dispatcher::new(Arc::new(registry.build()));
        log::debug!("engine: {} tools registered", dispatcher.registry().len());
        Ok(Engine {
            orchestrator: BatchOrchestrator::new(dispatcher.clone()),
            dispatcher,
        })
    }
}
