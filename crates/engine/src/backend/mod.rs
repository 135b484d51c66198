//! Seams between the engine and the outside world.
//!
//! Every tool talks to files, processes, language intelligence, and the network through one
//! of these traits. The reference implementations live next to them; tests swap in fakes.

mod fetch;
mod local_fs;
mod shell;
mod unavailable;

pub use fetch::{normalize_fetched, ContentFormat, HttpFetcher, NormalizedContent};
pub use local_fs::LocalFileSystem;
pub use shell::ProcessShell;
pub use unavailable::UnavailableCodeIntelligence;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::locator::{SourcePosition, SymbolCommand};
use crate::sandbox::SandboxedPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub len: u64,
}

/// Filesystem access. Every method receives paths that already passed the sandbox; the
/// implementation is still expected to refuse symlinks that lead outside the root.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_to_string(&self, path: &SandboxedPath) -> anyhow::Result<String>;

    /// Replace the file atomically, creating missing parent directories.
    async fn write(&self, path: &SandboxedPath, contents: &str) -> anyhow::Result<()>;

    async fn create_dir(&self, path: &SandboxedPath) -> anyhow::Result<()>;

    /// Entries sorted by name.
    async fn list_dir(&self, path: &SandboxedPath) -> anyhow::Result<Vec<DirEntry>>;

    async fn copy(&self, from: &SandboxedPath, to: &SandboxedPath) -> anyhow::Result<()>;

    async fn rename(&self, from: &SandboxedPath, to: &SandboxedPath) -> anyhow::Result<()>;

    async fn remove(&self, path: &SandboxedPath) -> anyhow::Result<()>;

    /// `None` when nothing exists at `path`.
    async fn metadata(&self, path: &SandboxedPath) -> anyhow::Result<Option<EntryMetadata>>;

    /// Every regular file below `dir`, ignore-aware, sorted by display path.
    async fn walk_files(&self, dir: &SandboxedPath) -> anyhow::Result<Vec<SandboxedPath>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellOutput {
    /// Combined stdout and stderr.
    pub output: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait Shell: Send + Sync {
    async fn run(&self, command: &str, working_dir: &SandboxedPath) -> anyhow::Result<ShellOutput>;
}

/// Zero-based line and UTF-16 column, as language servers count them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub line: u32,
    pub character: u32,
}

impl Point {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Point,
    pub end: Point,
}

/// A range in a project file. `path` is a project path (`root/relative`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub name: String,
    pub kind: String,
    pub range: TextRange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutline {
    pub path: String,
    pub symbols: Vec<OutlineNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub range: TextRange,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCount {
    pub path: String,
    pub errors: usize,
    pub warnings: usize,
}

/// Per-file detail for a single path, per-file counts for the whole project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Diagnostics {
    File { diagnostics: Vec<Diagnostic> },
    Project { files: Vec<DiagnosticCount> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub path: String,
    pub range: TextRange,
    pub new_text: String,
}

/// Language intelligence (normally a language server).
#[async_trait]
pub trait CodeIntelligence: Send + Sync {
    async fn query(
        &self,
        position: &SourcePosition,
        command: SymbolCommand,
    ) -> anyhow::Result<Vec<Location>>;

    /// Symbol outline of one file, or of every file when `path` is `None`.
    async fn outline(&self, path: Option<&SandboxedPath>) -> anyhow::Result<Vec<FileOutline>>;

    async fn diagnostics(&self, path: Option<&SandboxedPath>) -> anyhow::Result<Diagnostics>;

    /// Project-wide edit set that renames the symbol at `position`.
    async fn rename(
        &self,
        position: &SourcePosition,
        new_name: &str,
    ) -> anyhow::Result<Vec<TextEdit>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<FetchedContent>;
}
