//! Tool invocation and orchestration core.
//!
//! Agents call named tools with JSON input. The [`Dispatcher`] validates the input against the
//! tool's [`ToolDescriptor`], resolves every path field inside a configured project root, and
//! runs the handler. The [`BatchOrchestrator`] executes trees of invocations sequentially or
//! concurrently and reports per-leaf outcomes in plan order.
//!
//! ```no_run
//! use serde_json::json;
//! use toolhost_engine::{Engine, ExecutionContext, ProjectRoot, ProjectRoots};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = Engine::builder().with_builtins().build()?;
//! let roots = ProjectRoots::single(ProjectRoot::new("/work/app")?);
//! let ctx = ExecutionContext::new(roots);
//! let out = engine.call("read_file", json!({ "path": "app/README.md" }), &ctx).await?;
//! println!("{}", out["content"]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod invocation;
pub mod locator;
pub mod orchestrator;
pub mod pagination;
pub mod registry;
pub mod sandbox;
pub mod tools;

pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, InvocationResult};
pub use engine::{Engine, EngineBuilder};
pub use error::{Result, ToolError};
pub use invocation::{ExecutionContext, Invocation};
pub use locator::{locate_in_text, SourcePosition, SymbolCommand, SymbolLocator, SymbolQuery};
pub use orchestrator::BatchOrchestrator;
pub use pagination::{
    paginate, Page, PageCollector, PageCursor, FIND_PATH_PAGE_SIZE, GREP_PAGE_SIZE,
    OUTLINE_PAGE_SIZE,
};
pub use registry::{
    handler_fn, FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistry,
    ToolRegistryBuilder,
};
pub use sandbox::{resolve, ProjectRoot, ProjectRoots, SandboxedPath};

pub use toolhost_plan as plan;
pub use toolhost_protocol as protocol;
