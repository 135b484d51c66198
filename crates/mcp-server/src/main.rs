//! Toolhost MCP Server
//!
//! Serves the toolhost engine to AI agents over MCP (stdio). Every tool works on paths inside
//! the configured project roots.
//!
//! ## Tools
//!
//! - `read_file` / `create_file` / `edit_file` - Read (optionally by line window), write, patch
//! - `list_directory` / `create_directory` / `copy_path` / `move_path` / `delete_path`
//! - `grep` - Regex search with context hunks, 20 hunks per page
//! - `find_path` - Glob search over project files, 50 paths per page
//! - `code_symbols` / `symbol_info` / `diagnostics` / `rename` - Code intelligence
//! - `terminal` - Run a shell command inside a project root
//! - `fetch` - Fetch a URL and normalize it to text
//! - `batch` - Sequential/concurrent plan of the calls above
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "toolhost": {
//!       "command": "toolhost-mcp",
//!       "args": ["--root", "/path/to/project"]
//!     }
//!   }
//! }
//! ```
//!
//! Without `--root`, roots are read from `TOOLHOST_ROOTS` (a path list) or default to the
//! current directory.

use anyhow::Result;
use rmcp::ServiceExt;
use std::env;
use std::path::PathBuf;
use toolhost_engine::{Engine, EngineConfig, ExecutionContext};

mod catalog;
mod config;
mod service;

use config::{CliCommand, ServerConfig};
use service::ToolhostService;

fn print_help() {
    println!("Toolhost MCP server");
    println!();
    println!("Usage: toolhost-mcp [--root <dir>]... | --print-tools | --version | --help");
    println!();
    println!("Flags:");
    println!("  --root <dir>   Add a project root (repeatable; the first one is primary)");
    println!("  --print-tools  Print tool inventory as JSON and exit");
    println!("  --version      Print version and exit");
    println!("  --help         Print this help and exit");
    println!();
    println!("Environment:");
    println!("  TOOLHOST_ROOTS             Project roots when no --root is given");
    println!("  TOOLHOST_SHELL_TIMEOUT_MS  Upper bound for terminal commands");
    println!("  TOOLHOST_FETCH_TIMEOUT_MS  Upper bound for fetch requests");
    println!("  RUST_LOG                   Log filter (logs go to stderr)");
}

/// Returns the roots to serve, or the exit code when the process should stop here.
fn handle_cli_args() -> Result<Vec<PathBuf>, i32> {
    let args: Vec<String> = env::args().skip(1).collect();
    match config::parse_args(&args) {
        Ok(CliCommand::Serve { roots }) => Ok(roots),
        Ok(CliCommand::PrintTools) => {
            let engine = match Engine::builder().with_builtins().build() {
                Ok(engine) => engine,
                Err(err) => {
                    eprintln!("Failed to build tool registry: {err:#}");
                    return Err(1);
                }
            };
            let payload = catalog::tool_inventory_json(env!("CARGO_PKG_VERSION"), engine.registry());
            println!("{payload}");
            Err(0)
        }
        Ok(CliCommand::Version) => {
            println!("toolhost-mcp {}", env!("CARGO_PKG_VERSION"));
            Err(0)
        }
        Ok(CliCommand::Help) => {
            print_help();
            Err(0)
        }
        Err(err) => {
            eprintln!("{err}");
            print_help();
            Err(2)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_roots = match handle_cli_args() {
        Ok(roots) => roots,
        Err(exit_code) => std::process::exit(exit_code),
    };

    // Configure logging to stderr only (stdout is for MCP protocol)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = ServerConfig::load(cli_roots)?;
    let engine = build_engine(config.engine)?;
    let context = ExecutionContext::new(config.roots);

    log::info!(
        "Starting toolhost MCP server with {} tools",
        engine.registry().len() + 1
    );

    let service = ToolhostService::new(engine, context);
    let server = service.serve(rmcp::transport::stdio()).await?;

    // Wait for shutdown
    server.waiting().await?;

    log::info!("Toolhost MCP server stopped");
    Ok(())
}

fn build_engine(config: EngineConfig) -> Result<Engine> {
    Engine::builder().config(config).with_builtins().build()
}
