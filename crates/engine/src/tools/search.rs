use anyhow::Result;
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::to_value;
use crate::backend::FileSystem;
use crate::config::EngineConfig;
use crate::error::ToolError;
use crate::pagination::{paginate, Page, PageCollector, PageCursor, FIND_PATH_PAGE_SIZE, GREP_PAGE_SIZE};
use crate::registry::{FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistryBuilder};
use crate::sandbox::SandboxedPath;
use toolhost_protocol::ToolNextAction;

const DEFAULT_CONTEXT_LINES: usize = 2;
const MAX_CONTEXT_LINES: usize = 20;

pub(super) fn register(
    builder: &mut ToolRegistryBuilder,
    fs: Arc<dyn FileSystem>,
    config: &EngineConfig,
) -> Result<()> {
    builder.register(
        ToolDescriptor::new(
            "grep",
            "Regex search over project files. Returns up to 20 hunks (matches with context) per page, \
             ordered by path and line; pass `offset` to continue.",
        )
        .field(FieldSpec::required("regex", FieldType::String, "Regular expression"))
        .field(FieldSpec::optional(
            "include_pattern",
            FieldType::String,
            "Glob restricting which files are searched, e.g. `**/*.rs`",
        ))
        .field(FieldSpec::optional("case_sensitive", FieldType::Boolean, "Defaults to false"))
        .field(FieldSpec::optional(
            "context_lines",
            FieldType::Integer,
            "Lines of context around each match (default 2, max 20)",
        ))
        .field(FieldSpec::optional("offset", FieldType::Integer, "Hunks to skip")),
        Arc::new(GrepTool {
            fs: fs.clone(),
            max_file_bytes: config.max_file_bytes,
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "find_path",
            "Find project paths matching a glob. Returns up to 50 sorted paths per page; pass `offset` to continue.",
        )
        .field(FieldSpec::required("glob", FieldType::String, "Glob, e.g. `**/*.toml`"))
        .field(FieldSpec::optional("offset", FieldType::Integer, "Paths to skip")),
        Arc::new(FindPathTool { fs }),
    )?;
    Ok(())
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|err| ToolError::invalid_input(format!("Invalid glob '{pattern}': {err}")).into())
}

/// Matches either the project path (`root/src/a.rs`) or the root-relative one (`src/a.rs`).
fn glob_matches(matcher: &GlobMatcher, path: &SandboxedPath) -> bool {
    matcher.is_match(path.display_path()) || matcher.is_match(path.relative())
}

/// Every file of every root, roots in configured order, files sorted within a root.
async fn project_files(fs: &dyn FileSystem, input: &ToolInput) -> Result<Vec<SandboxedPath>> {
    let mut files = Vec::new();
    for root in input.context().roots().iter() {
        files.extend(fs.walk_files(&SandboxedPath::root(root)).await?);
    }
    Ok(files)
}

#[derive(Debug, Clone)]
struct GrepRange {
    start_line: usize,
    end_line: usize,
    match_lines: Vec<usize>,
}

/// Merge overlapping or adjacent context windows into hunks.
fn merge_ranges(match_lines: &[usize], context: usize, last_line: usize) -> Vec<GrepRange> {
    let mut merged: Vec<GrepRange> = Vec::new();
    for &line in match_lines {
        let start_line = line.saturating_sub(context).max(1);
        let end_line = line.saturating_add(context).min(last_line);
        if let Some(last) = merged.last_mut() {
            if start_line <= last.end_line.saturating_add(1) {
                last.end_line = last.end_line.max(end_line);
                last.match_lines.push(line);
                continue;
            }
        }
        merged.push(GrepRange {
            start_line,
            end_line,
            match_lines: vec![line],
        });
    }
    merged
}

#[derive(Debug, Clone, Serialize)]
struct GrepHunk {
    path: String,
    start_line: usize,
    end_line: usize,
    match_lines: Vec<usize>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GrepRequest {
    regex: String,
    include_pattern: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
    context_lines: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Serialize)]
struct PagedOutput<T> {
    #[serde(flatten)]
    page: Page<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_actions: Vec<ToolNextAction>,
}

impl<T> PagedOutput<T> {
    fn new(page: Page<T>, tool: &str, args: &Map<String, Value>) -> Self {
        let next_actions = page.continuation(tool, args.clone()).into_iter().collect();
        Self { page, next_actions }
    }
}

struct GrepTool {
    fs: Arc<dyn FileSystem>,
    max_file_bytes: u64,
}

impl GrepTool {
    fn build_regex(request: &GrepRequest) -> Result<Regex> {
        RegexBuilder::new(&request.regex)
            .case_insensitive(!request.case_sensitive)
            .build()
            .map_err(|err| {
                ToolError::invalid_input(format!("Invalid regex '{}': {err}", request.regex)).into()
            })
    }

    async fn scan_file(
        &self,
        path: &SandboxedPath,
        regex: &Regex,
        context: usize,
        collector: &mut PageCollector<GrepHunk>,
    ) {
        match self.fs.metadata(path).await {
            Ok(Some(meta)) if meta.len <= self.max_file_bytes => {}
            _ => return,
        }
        // Unreadable and non-UTF-8 files are skipped.
        let Ok(text) = self.fs.read_to_string(path).await else {
            return;
        };
        let lines: Vec<&str> = text.lines().collect();
        let match_lines: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| regex.is_match(line))
            .map(|(idx, _)| idx + 1)
            .collect();
        if match_lines.is_empty() {
            return;
        }

        let display = path.display_path();
        for range in merge_ranges(&match_lines, context, lines.len()) {
            let flow = collector.offer_with(|| GrepHunk {
                path: display.clone(),
                start_line: range.start_line,
                end_line: range.end_line,
                content: lines[range.start_line - 1..range.end_line].join("\n"),
                match_lines: range.match_lines,
            });
            if flow.is_break() {
                return;
            }
        }
    }
}

#[async_trait]
impl ToolHandler for GrepTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let request: GrepRequest = input.parse()?;
        let regex = Self::build_regex(&request)?;
        let include = request
            .include_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(compile_glob)
            .transpose()?;
        let context = request
            .context_lines
            .unwrap_or(DEFAULT_CONTEXT_LINES)
            .min(MAX_CONTEXT_LINES);

        let mut collector = PageCollector::new(PageCursor::new(request.offset, GREP_PAGE_SIZE));
        for path in project_files(self.fs.as_ref(), &input).await? {
            if collector.is_done() {
                break;
            }
            if include.as_ref().is_some_and(|m| !glob_matches(m, &path)) {
                continue;
            }
            self.scan_file(&path, &regex, context, &mut collector).await;
        }

        to_value(&PagedOutput::new(collector.finish(), "grep", input.fields()))
    }
}

#[derive(Debug, Deserialize)]
struct FindPathRequest {
    glob: String,
    #[serde(default)]
    offset: usize,
}

struct FindPathTool {
    fs: Arc<dyn FileSystem>,
}

#[async_trait]
impl ToolHandler for FindPathTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let request: FindPathRequest = input.parse()?;
        let matcher = compile_glob(request.glob.trim())?;
        let files = project_files(self.fs.as_ref(), &input).await?;
        let page = paginate(
            files
                .iter()
                .filter(|path| glob_matches(&matcher, path))
                .map(SandboxedPath::display_path),
            PageCursor::new(request.offset, FIND_PATH_PAGE_SIZE),
        );
        to_value(&PagedOutput::new(page, "find_path", input.fields()))
    }
}
