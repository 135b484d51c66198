//! Builtin tools.

mod code;
mod fetch;
mod files;
mod search;
mod terminal;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::{CodeIntelligence, Fetcher, FileSystem, Shell};
use crate::config::EngineConfig;
use crate::locator::SymbolLocator;
use crate::registry::ToolRegistryBuilder;

/// Backends the builtin tools are wired to.
#[derive(Clone)]
pub struct Backends {
    pub fs: Arc<dyn FileSystem>,
    pub shell: Arc<dyn Shell>,
    pub code: Arc<dyn CodeIntelligence>,
    pub fetcher: Arc<dyn Fetcher>,
}

pub fn register_builtin_tools(
    builder: &mut ToolRegistryBuilder,
    backends: &Backends,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let locator = SymbolLocator::new(backends.fs.clone(), backends.code.clone());

    files::register(builder, backends.fs.clone(), config)?;
    search::register(builder, backends.fs.clone(), config)?;
    code::register(builder, backends, locator)?;
    terminal::register(builder, backends.shell.clone())?;
    fetch::register(builder, backends.fetcher.clone())?;
    Ok(())
}

fn to_value<T: Serialize>(output: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(output)?)
}
