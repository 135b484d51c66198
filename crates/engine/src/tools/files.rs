use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::to_value;
use crate::backend::{EntryKind, FileSystem};
use crate::config::EngineConfig;
use crate::error::ToolError;
use crate::registry::{FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistryBuilder};
use crate::sandbox::SandboxedPath;

pub(super) fn register(
    builder: &mut ToolRegistryBuilder,
    fs: Arc<dyn FileSystem>,
    config: &EngineConfig,
) -> Result<()> {
    builder.register(
        ToolDescriptor::new(
            "read_file",
            "Read a project file. Optional 1-based inclusive start_line/end_line select a window.",
        )
        .field(FieldSpec::required("path", FieldType::Path, "File to read, e.g. `root/src/main.rs`"))
        .field(FieldSpec::optional("start_line", FieldType::Integer, "First line (1-based)"))
        .field(FieldSpec::optional("end_line", FieldType::Integer, "Last line (1-based, inclusive)")),
        Arc::new(ReadFileTool {
            fs: fs.clone(),
            max_file_bytes: config.max_file_bytes,
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "create_file",
            "Create or overwrite a file with the given contents. Parent directories are created.",
        )
        .field(FieldSpec::required("path", FieldType::Path, "File to write"))
        .field(FieldSpec::required("contents", FieldType::String, "Full file contents"))
        .mutating(),
        Arc::new(CreateFileTool { fs: fs.clone() }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "edit_file",
            "Replace the single occurrence of old_text with new_text. Fails if old_text is missing or not unique.",
        )
        .field(FieldSpec::required("path", FieldType::Path, "File to edit"))
        .field(FieldSpec::required("old_text", FieldType::String, "Exact text to replace"))
        .field(FieldSpec::required("new_text", FieldType::String, "Replacement text"))
        .mutating(),
        Arc::new(EditFileTool { fs: fs.clone() }),
    )?;
    builder.register(
        ToolDescriptor::new("list_directory", "List a directory. Directories end with `/`.")
            .field(FieldSpec::required("path", FieldType::Path, "Directory to list")),
        Arc::new(ListDirectoryTool { fs: fs.clone() }),
    )?;
    builder.register(
        ToolDescriptor::new("create_directory", "Create a directory and any missing parents.")
            .field(FieldSpec::required("path", FieldType::Path, "Directory to create"))
            .mutating(),
        Arc::new(CreateDirectoryTool { fs: fs.clone() }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "copy_path",
            "Copy a file or directory (recursively) to a destination that does not exist yet.",
        )
        .field(FieldSpec::required("source_path", FieldType::Path, "What to copy"))
        .field(FieldSpec::required("destination_path", FieldType::Path, "Where to copy it"))
        .mutating(),
        Arc::new(TransferTool {
            fs: fs.clone(),
            mode: Transfer::Copy,
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "move_path",
            "Move or rename a file or directory to a destination that does not exist yet.",
        )
        .field(FieldSpec::required("source_path", FieldType::Path, "What to move"))
        .field(FieldSpec::required("destination_path", FieldType::Path, "New location"))
        .mutating(),
        Arc::new(TransferTool {
            fs: fs.clone(),
            mode: Transfer::Move,
        }),
    )?;
    builder.register(
        ToolDescriptor::new("delete_path", "Delete a file, or a directory with all its contents.")
            .field(FieldSpec::required("path", FieldType::Path, "What to delete"))
            .mutating(),
        Arc::new(DeletePathTool { fs }),
    )?;
    Ok(())
}

fn not_found(path: &SandboxedPath) -> anyhow::Error {
    ToolError::not_found(format!("'{path}' does not exist")).into()
}

struct ReadFileTool {
    fs: Arc<dyn FileSystem>,
    max_file_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct ReadFileRequest {
    start_line: Option<usize>,
    end_line: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ReadFileOutput {
    path: SandboxedPath,
    start_line: usize,
    end_line: usize,
    total_lines: usize,
    content: String,
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let request: ReadFileRequest = input.parse()?;

        let meta = self.fs.metadata(path).await?.ok_or_else(|| not_found(path))?;
        if meta.kind == EntryKind::Directory {
            return Err(ToolError::invalid_input(format!(
                "'{path}' is a directory; use list_directory"
            ))
            .into());
        }
        if meta.len > self.max_file_bytes {
            anyhow::bail!(
                "'{path}' is {} bytes, larger than the {} byte limit; search it with grep instead",
                meta.len,
                self.max_file_bytes
            );
        }

        let text = self.fs.read_to_string(path).await?;
        let lines: Vec<&str> = text.lines().collect();
        let total_lines = lines.len();

        if request.start_line.is_none() && request.end_line.is_none() {
            return to_value(&ReadFileOutput {
                path: path.clone(),
                start_line: 1,
                end_line: total_lines,
                total_lines,
                content: text,
            });
        }

        let start = request.start_line.unwrap_or(1).max(1);
        let end = request.end_line.unwrap_or(total_lines).min(total_lines);
        if request.end_line.is_some_and(|end| end < start) {
            return Err(ToolError::invalid_input(format!(
                "end_line must not be before start_line ({start})"
            ))
            .into());
        }
        if start > total_lines.max(1) {
            return Err(ToolError::invalid_input(format!(
                "start_line {start} is past the end of '{path}' ({total_lines} lines)"
            ))
            .into());
        }

        let content = if start > end {
            String::new()
        } else {
            lines[start - 1..end].join("\n")
        };
        to_value(&ReadFileOutput {
            path: path.clone(),
            start_line: start,
            end_line: end,
            total_lines,
            content,
        })
    }
}

struct CreateFileTool {
    fs: Arc<dyn FileSystem>,
}

#[derive(Debug, Deserialize)]
struct CreateFileRequest {
    contents: String,
}

#[async_trait]
impl ToolHandler for CreateFileTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let request: CreateFileRequest = input.parse()?;
        if path.is_root() {
            return Err(ToolError::invalid_input("Cannot write to a project root").into());
        }
        let existed = self.fs.metadata(path).await?.is_some();
        self.fs.write(path, &request.contents).await?;
        Ok(serde_json::json!({
            "path": path,
            "bytes_written": request.contents.len(),
            "created": !existed,
        }))
    }
}

struct EditFileTool {
    fs: Arc<dyn FileSystem>,
}

#[derive(Debug, Deserialize)]
struct EditFileRequest {
    old_text: String,
    new_text: String,
}

#[async_trait]
impl ToolHandler for EditFileTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let request: EditFileRequest = input.parse()?;
        if request.old_text.is_empty() {
            return Err(ToolError::invalid_input("old_text must not be empty").into());
        }

        let text = self.fs.read_to_string(path).await?;
        let mut matches = text.match_indices(&request.old_text);
        let Some((at, _)) = matches.next() else {
            return Err(ToolError::not_found(format!("old_text does not occur in '{path}'")).into());
        };
        let extra = matches.count();
        if extra > 0 {
            return Err(ToolError::ambiguous(
                extra + 1,
                format!("old_text occurs more than once in '{path}'"),
            )
            .into());
        }

        let mut edited = String::with_capacity(text.len() + request.new_text.len());
        edited.push_str(&text[..at]);
        edited.push_str(&request.new_text);
        edited.push_str(&text[at + request.old_text.len()..]);
        self.fs.write(path, &edited).await?;

        Ok(serde_json::json!({
            "path": path,
            "line": text[..at].matches('\n').count() + 1,
        }))
    }
}

struct ListDirectoryTool {
    fs: Arc<dyn FileSystem>,
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let meta = self.fs.metadata(path).await?.ok_or_else(|| not_found(path))?;
        if meta.kind != EntryKind::Directory {
            return Err(ToolError::invalid_input(format!("'{path}' is not a directory")).into());
        }
        let entries: Vec<String> = self
            .fs
            .list_dir(path)
            .await?
            .into_iter()
            .map(|entry| {
                let full = path.child(&entry.name).map_or_else(
                    |_| format!("{path}/{}", entry.name),
                    |child| child.display_path(),
                );
                match entry.kind {
                    EntryKind::Directory => format!("{full}/"),
                    EntryKind::File => full,
                }
            })
            .collect();
        Ok(serde_json::json!({ "path": path, "entries": entries }))
    }
}

struct CreateDirectoryTool {
    fs: Arc<dyn FileSystem>,
}

#[async_trait]
impl ToolHandler for CreateDirectoryTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        self.fs.create_dir(path).await?;
        Ok(serde_json::json!({ "path": path }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

struct TransferTool {
    fs: Arc<dyn FileSystem>,
    mode: Transfer,
}

#[async_trait]
impl ToolHandler for TransferTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let source = input.path("source_path")?;
        let destination = input.path("destination_path")?;
        if self.fs.metadata(source).await?.is_none() {
            return Err(not_found(source));
        }
        match self.mode {
            Transfer::Copy => self.fs.copy(source, destination).await?,
            Transfer::Move => self.fs.rename(source, destination).await?,
        }
        Ok(serde_json::json!({ "source": source, "destination": destination }))
    }
}

struct DeletePathTool {
    fs: Arc<dyn FileSystem>,
}

#[async_trait]
impl ToolHandler for DeletePathTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        if path.is_root() {
            return Err(ToolError::invalid_input(format!(
                "Refusing to delete project root '{path}'"
            ))
            .into());
        }
        let meta = self.fs.metadata(path).await?.ok_or_else(|| not_found(path))?;
        self.fs.remove(path).await?;
        Ok(serde_json::json!({ "path": path, "kind": meta.kind }))
    }
}
