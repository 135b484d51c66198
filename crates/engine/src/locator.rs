//! Turning an agent's symbol description into one exact source position.
//!
//! Agents name a symbol by its text plus optional surrounding text rather than by line and
//! column. The locator finds every occurrence of the symbol, keeps the ones whose neighbours
//! match the context, and insists on exactly one survivor.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::{CodeIntelligence, FileSystem, Location, Point};
use crate::error::{Result, ToolError};
use crate::sandbox::SandboxedPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolCommand {
    Definition,
    Declaration,
    Implementation,
    TypeDefinition,
    References,
}

impl SymbolCommand {
    pub const NAMES: &'static [&'static str] = &[
        "definition",
        "declaration",
        "implementation",
        "type_definition",
        "references",
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Declaration => "declaration",
            Self::Implementation => "implementation",
            Self::TypeDefinition => "type_definition",
            Self::References => "references",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    pub path: SandboxedPath,
    pub symbol: String,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    pub command: SymbolCommand,
}

/// Resolved symbol: file, LSP-style point, and byte offset of the first symbol byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    pub path: SandboxedPath,
    pub point: Point,
    pub offset: usize,
}

/// Zero-based line and UTF-16 column of a byte offset.
pub fn point_at(text: &str, offset: usize) -> Point {
    let before = &text[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    let character = text[line_start..offset].encode_utf16().count();
    Point::new(
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(character).unwrap_or(u32::MAX),
    )
}

/// Byte offset of a point. `None` when the point lies outside the text or splits a character.
pub fn offset_at(text: &str, point: Point) -> Option<usize> {
    let mut line_start = 0;
    for _ in 0..point.line {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |idx| line_start + idx);

    let mut units = 0u32;
    for (idx, ch) in text[line_start..line_end].char_indices() {
        if units == point.character {
            return Some(line_start + idx);
        }
        units += u32::try_from(ch.len_utf16()).unwrap_or(2);
        if units > point.character {
            return None;
        }
    }
    (units == point.character).then_some(line_end)
}

/// Byte offset of the single occurrence of `symbol` whose surroundings match the context.
///
/// Occurrences may overlap. `NotFound` when none survive, `Ambiguous` when several do.
pub fn locate_in_text(
    text: &str,
    symbol: &str,
    context_before: Option<&str>,
    context_after: Option<&str>,
) -> Result<usize> {
    if symbol.is_empty() {
        return Err(ToolError::invalid_input("symbol must not be empty"));
    }

    let mut occurrences = 0usize;
    let mut candidates = Vec::new();
    let mut from = 0;
    while let Some(found) = text[from..].find(symbol) {
        let at = from + found;
        occurrences += 1;
        let before_ok = context_before.map_or(true, |ctx| text[..at].ends_with(ctx));
        let after_ok = context_after.map_or(true, |ctx| text[at + symbol.len()..].starts_with(ctx));
        if before_ok && after_ok {
            candidates.push(at);
        }
        let step = text[at..].chars().next().map_or(1, char::len_utf8);
        from = at + step;
    }

    match candidates.as_slice() {
        [only] => Ok(*only),
        [] if occurrences == 0 => Err(ToolError::not_found(format!(
            "`{symbol}` does not occur in the file"
        ))),
        [] => Err(ToolError::not_found(format!(
            "`{symbol}` occurs {occurrences} times but none matches the given context"
        ))),
        many => Err(ToolError::ambiguous(
            many.len(),
            format!("`{symbol}` matches more than once"),
        )),
    }
}

/// File-backed locator that forwards resolved positions to code intelligence.
#[derive(Clone)]
pub struct SymbolLocator {
    fs: Arc<dyn FileSystem>,
    code: Arc<dyn CodeIntelligence>,
}

impl SymbolLocator {
    pub fn new(fs: Arc<dyn FileSystem>, code: Arc<dyn CodeIntelligence>) -> Self {
        Self { fs, code }
    }

    pub async fn locate(
        &self,
        path: &SandboxedPath,
        symbol: &str,
        context_before: Option<&str>,
        context_after: Option<&str>,
    ) -> anyhow::Result<SourcePosition> {
        let text = self.fs.read_to_string(path).await?;
        let offset = locate_in_text(&text, symbol, context_before, context_after)?;
        Ok(SourcePosition {
            path: path.clone(),
            point: point_at(&text, offset),
            offset,
        })
    }

    /// Locate the symbol, then ask the backend for `query.command` at that position.
    pub async fn query(&self, query: &SymbolQuery) -> anyhow::Result<(SourcePosition, Vec<Location>)> {
        let position = self
            .locate(
                &query.path,
                &query.symbol,
                query.context_before.as_deref(),
                query.context_after.as_deref(),
            )
            .await?;
        let locations = self.code.query(&position, query.command).await?;
        Ok((position, locations))
    }
}
