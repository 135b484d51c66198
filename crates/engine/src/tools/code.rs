use anyhow::Result;
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{to_value, Backends};
use crate::backend::{CodeIntelligence, FileOutline, FileSystem, Location, OutlineNode, TextEdit, TextRange};
use crate::error::ToolError;
use crate::locator::{offset_at, SourcePosition, SymbolCommand, SymbolLocator, SymbolQuery};
use crate::pagination::{paginate, Page, PageCursor, OUTLINE_PAGE_SIZE};
use crate::registry::{FieldSpec, FieldType, ToolDescriptor, ToolHandler, ToolInput, ToolRegistryBuilder};
use crate::sandbox::SandboxedPath;
use toolhost_protocol::ToolNextAction;

const MAX_EXCERPT_LINE_LEN: usize = 200;

const CONTEXT_BEFORE: FieldSpec = FieldSpec::optional(
    "context_before_symbol",
    FieldType::String,
    "Text immediately before the symbol, used to pick one occurrence",
);
const CONTEXT_AFTER: FieldSpec = FieldSpec::optional(
    "context_after_symbol",
    FieldType::String,
    "Text immediately after the symbol, used to pick one occurrence",
);

pub(super) fn register(
    builder: &mut ToolRegistryBuilder,
    backends: &Backends,
    locator: SymbolLocator,
) -> Result<()> {
    builder.register(
        ToolDescriptor::new(
            "code_symbols",
            "Outline of symbols in one file, or in the whole project when `path` is omitted. \
             Optional regex filters by symbol name. Paged by 2000 symbols.",
        )
        .field(FieldSpec::optional("path", FieldType::Path, "File to outline"))
        .field(FieldSpec::optional("regex", FieldType::String, "Filter on symbol names"))
        .field(FieldSpec::optional("case_sensitive", FieldType::Boolean, "Defaults to false"))
        .field(FieldSpec::optional("offset", FieldType::Integer, "Symbols to skip")),
        Arc::new(CodeSymbolsTool {
            code: backends.code.clone(),
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "symbol_info",
            "Definition, declaration, implementation, type definition, or references of a symbol \
             identified by its text and optional surrounding context.",
        )
        .field(FieldSpec::required("path", FieldType::Path, "File containing the symbol"))
        .field(FieldSpec::required("symbol", FieldType::String, "Exact symbol text"))
        .field(CONTEXT_BEFORE)
        .field(CONTEXT_AFTER)
        .field(FieldSpec::required(
            "command",
            FieldType::Enum(SymbolCommand::NAMES),
            "What to look up",
        )),
        Arc::new(SymbolInfoTool {
            locator: locator.clone(),
            fs: backends.fs.clone(),
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "diagnostics",
            "Errors and warnings for one file, or per-file counts for the project when `path` is omitted.",
        )
        .field(FieldSpec::optional("path", FieldType::Path, "File to report on")),
        Arc::new(DiagnosticsTool {
            code: backends.code.clone(),
        }),
    )?;
    builder.register(
        ToolDescriptor::new(
            "rename",
            "Rename a symbol across the project. The symbol is identified like in symbol_info.",
        )
        .field(FieldSpec::required("path", FieldType::Path, "File containing the symbol"))
        .field(FieldSpec::required("symbol", FieldType::String, "Exact symbol text"))
        .field(CONTEXT_BEFORE)
        .field(CONTEXT_AFTER)
        .field(FieldSpec::required("new_name", FieldType::String, "New symbol name"))
        .mutating(),
        Arc::new(RenameTool {
            locator,
            code: backends.code.clone(),
            fs: backends.fs.clone(),
        }),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct OutlineEntry {
    path: String,
    name: String,
    kind: String,
    depth: usize,
    start_line: u32,
    end_line: u32,
}

/// Depth-first, pre-order walk over every symbol of every file.
struct FlattenOutline<'a> {
    stack: Vec<(&'a str, usize, &'a OutlineNode)>,
}

impl<'a> FlattenOutline<'a> {
    fn new(files: &'a [FileOutline]) -> Self {
        let mut stack = Vec::new();
        for file in files.iter().rev() {
            for node in file.symbols.iter().rev() {
                stack.push((file.path.as_str(), 0, node));
            }
        }
        Self { stack }
    }
}

impl<'a> Iterator for FlattenOutline<'a> {
    type Item = (&'a str, usize, &'a OutlineNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, depth, node) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push((path, depth + 1, child));
        }
        Some((path, depth, node))
    }
}

#[derive(Debug, Deserialize)]
struct CodeSymbolsRequest {
    regex: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Serialize)]
struct CodeSymbolsOutput {
    #[serde(flatten)]
    page: Page<OutlineEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_actions: Vec<ToolNextAction>,
}

struct CodeSymbolsTool {
    code: Arc<dyn CodeIntelligence>,
}

#[async_trait]
impl ToolHandler for CodeSymbolsTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let request: CodeSymbolsRequest = input.parse()?;
        let filter = request
            .regex
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(!request.case_sensitive)
                    .build()
                    .map_err(|err| ToolError::invalid_input(format!("Invalid regex '{pattern}': {err}")))
            })
            .transpose()?;

        let outlines = self.code.outline(input.opt_path("path")).await?;
        let page = paginate(
            FlattenOutline::new(&outlines)
                .filter(|(_, _, node)| filter.as_ref().map_or(true, |re| re.is_match(&node.name))),
            PageCursor::new(request.offset, OUTLINE_PAGE_SIZE),
        )
        .map(|(path, depth, node)| OutlineEntry {
            path: path.to_string(),
            name: node.name.clone(),
            kind: node.kind.clone(),
            depth,
            start_line: node.range.start.line + 1,
            end_line: node.range.end.line + 1,
        });

        let next_actions = page
            .continuation("code_symbols", input.fields().clone())
            .into_iter()
            .collect();
        to_value(&CodeSymbolsOutput { page, next_actions })
    }
}

#[derive(Debug, Deserialize)]
struct SymbolInfoRequest {
    symbol: String,
    context_before_symbol: Option<String>,
    context_after_symbol: Option<String>,
    command: SymbolCommand,
}

#[derive(Debug, Serialize)]
struct LocationExcerpt {
    path: String,
    range: TextRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    excerpt: Option<String>,
}

struct SymbolInfoTool {
    locator: SymbolLocator,
    fs: Arc<dyn FileSystem>,
}

impl SymbolInfoTool {
    /// Source lines of a location, each truncated. Locations outside the roots get no excerpt.
    async fn excerpt(
        &self,
        input: &ToolInput,
        location: &Location,
        cache: &mut HashMap<String, Option<String>>,
    ) -> Option<String> {
        if !cache.contains_key(&location.path) {
            let text = match input.context().resolve(&location.path) {
                Ok(path) => self.fs.read_to_string(&path).await.ok(),
                Err(_) => None,
            };
            cache.insert(location.path.clone(), text);
        }
        let text = cache.get(&location.path)?.as_deref()?;
        let start = location.range.start.line as usize;
        let end = (location.range.end.line as usize).max(start);
        let lines: Vec<String> = text
            .lines()
            .skip(start)
            .take(end - start + 1)
            .map(|line| match line.char_indices().nth(MAX_EXCERPT_LINE_LEN) {
                Some((cut, _)) => format!("{}…", &line[..cut]),
                None => line.to_string(),
            })
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

#[async_trait]
impl ToolHandler for SymbolInfoTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let request: SymbolInfoRequest = input.parse()?;
        let query = SymbolQuery {
            path: path.clone(),
            symbol: request.symbol,
            context_before: request.context_before_symbol,
            context_after: request.context_after_symbol,
            command: request.command,
        };

        let (position, locations) = self.locator.query(&query).await?;
        if locations.is_empty() {
            return Err(ToolError::not_found(format!(
                "No {} found for `{}`",
                query.command.as_str(),
                query.symbol
            ))
            .into());
        }

        let mut cache = HashMap::new();
        let mut results = Vec::with_capacity(locations.len());
        for location in &locations {
            results.push(LocationExcerpt {
                path: location.path.clone(),
                range: location.range,
                excerpt: self.excerpt(&input, location, &mut cache).await,
            });
        }

        Ok(serde_json::json!({
            "symbol": query.symbol,
            "command": query.command,
            "position": position,
            "locations": results,
        }))
    }
}

struct DiagnosticsTool {
    code: Arc<dyn CodeIntelligence>,
}

#[async_trait]
impl ToolHandler for DiagnosticsTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let diagnostics = self.code.diagnostics(input.opt_path("path")).await?;
        to_value(&diagnostics)
    }
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    symbol: String,
    context_before_symbol: Option<String>,
    context_after_symbol: Option<String>,
    new_name: String,
}

struct RenameTool {
    locator: SymbolLocator,
    code: Arc<dyn CodeIntelligence>,
    fs: Arc<dyn FileSystem>,
}

/// Apply edits to one file's text. Edits must not overlap.
fn apply_edits(path: &SandboxedPath, text: &str, edits: &[&TextEdit]) -> Result<String> {
    let mut spans = Vec::with_capacity(edits.len());
    for edit in edits {
        let start = offset_at(text, edit.range.start);
        let end = offset_at(text, edit.range.end);
        match (start, end) {
            (Some(start), Some(end)) if start <= end => spans.push((start, end, edit.new_text.as_str())),
            _ => anyhow::bail!("Rename edit range {:?} is outside '{path}'", edit.range),
        }
    }
    spans.sort_by_key(|(start, end, _)| (*start, *end));
    if spans.windows(2).any(|pair| pair[1].0 < pair[0].1) {
        anyhow::bail!("Rename produced overlapping edits in '{path}'");
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, new_text) in spans {
        out.push_str(&text[cursor..start]);
        out.push_str(new_text);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

#[async_trait]
impl ToolHandler for RenameTool {
    async fn run(&self, input: ToolInput) -> Result<Value> {
        let path = input.path("path")?;
        let request: RenameRequest = input.parse()?;
        if request.new_name.trim().is_empty() {
            return Err(ToolError::invalid_input("new_name must not be empty").into());
        }

        let position: SourcePosition = self
            .locator
            .locate(
                path,
                &request.symbol,
                request.context_before_symbol.as_deref(),
                request.context_after_symbol.as_deref(),
            )
            .await?;
        let edits = self.code.rename(&position, &request.new_name).await?;

        // Every target is sandboxed and rewritten in memory before the first write.
        let mut by_file: BTreeMap<&str, Vec<&TextEdit>> = BTreeMap::new();
        for edit in &edits {
            by_file.entry(edit.path.as_str()).or_default().push(edit);
        }
        let mut rewrites = Vec::with_capacity(by_file.len());
        for (raw, file_edits) in &by_file {
            let target = input.context().resolve(raw)?;
            let text = self.fs.read_to_string(&target).await?;
            let updated = apply_edits(&target, &text, file_edits)?;
            rewrites.push((target, updated, file_edits.len()));
        }

        let mut files = Vec::with_capacity(rewrites.len());
        for (target, updated, count) in rewrites {
            self.fs.write(&target, &updated).await?;
            files.push(serde_json::json!({ "path": target, "edits": count }));
        }

        Ok(serde_json::json!({
            "symbol": request.symbol,
            "new_name": request.new_name,
            "position": position,
            "files": files,
        }))
    }
}
