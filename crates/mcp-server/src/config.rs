use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use toolhost_engine::{EngineConfig, ProjectRoot, ProjectRoots};

const ROOTS_ENV: &str = "TOOLHOST_ROOTS";

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Serve { roots: Vec<PathBuf> },
    PrintTools,
    Version,
    Help,
}

pub fn parse_args(args: &[String]) -> Result<CliCommand> {
    if let [only] = args {
        match only.as_str() {
            "--print-tools" => return Ok(CliCommand::PrintTools),
            "--version" | "-V" => return Ok(CliCommand::Version),
            "--help" | "-h" => return Ok(CliCommand::Help),
            _ => {}
        }
    }

    let mut roots = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--root" {
            let value = iter.next().context("--root requires a directory")?;
            roots.push(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--root=") {
            roots.push(PathBuf::from(value));
        } else {
            anyhow::bail!("Unknown argument: {arg}");
        }
    }
    Ok(CliCommand::Serve { roots })
}

/// Everything the server needs before it starts answering requests.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub roots: ProjectRoots,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Roots come from `--root` flags, then `TOOLHOST_ROOTS`, then the current directory.
    pub fn load(cli_roots: Vec<PathBuf>) -> Result<Self> {
        let candidates = if !cli_roots.is_empty() {
            cli_roots
        } else if let Some(raw) = env::var_os(ROOTS_ENV).filter(|v| !v.is_empty()) {
            split_roots(&raw)
        } else {
            vec![env::current_dir().context("Failed to read current directory")?]
        };

        let roots = candidates
            .iter()
            .map(|path| project_root(path))
            .collect::<Result<Vec<_>>>()?;
        let roots = ProjectRoots::new(roots)?;
        for root in roots.iter() {
            log::info!("Project root '{}' -> {}", root.name(), root.path().display());
        }

        Ok(Self {
            roots,
            engine: EngineConfig::from_env(),
        })
    }
}

fn split_roots(raw: &OsString) -> Vec<PathBuf> {
    env::split_paths(raw)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

fn project_root(path: &Path) -> Result<ProjectRoot> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Invalid project root {}", path.display()))?;
    if !canonical.is_dir() {
        anyhow::bail!("Project root {} is not a directory", canonical.display());
    }
    ProjectRoot::new(canonical)
}
