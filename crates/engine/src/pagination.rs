//! Offset pagination over deterministic result sequences.
//!
//! A page is `items[offset .. offset + page_size]` of a sequence whose order depends only on
//! the query and the project contents. The collector looks at one item past the page to learn
//! whether more exist, but never materializes it.

use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::ControlFlow;
use toolhost_protocol::ToolNextAction;

pub const GREP_PAGE_SIZE: usize = 20;
pub const OUTLINE_PAGE_SIZE: usize = 2000;
pub const FIND_PATH_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    offset: usize,
    page_size: usize,
}

impl PageCursor {
    pub fn new(offset: usize, page_size: usize) -> Self {
        Self {
            offset,
            page_size: page_size.max(1),
        }
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    pub const fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.page_size),
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            page_size: self.page_size,
            has_more: self.has_more,
            next_offset: self.next_offset,
        }
    }

    /// Follow-up call that fetches the next page: the same arguments with `offset` advanced.
    pub fn continuation(&self, tool: &str, mut args: Map<String, Value>) -> Option<ToolNextAction> {
        let next_offset = self.next_offset?;
        args.insert("offset".to_string(), Value::from(next_offset));
        Some(ToolNextAction {
            tool: tool.to_string(),
            args: Value::Object(args),
            reason: format!("Fetch the next page (offset {next_offset})."),
        })
    }
}

/// Incremental page builder for producers that generate results lazily.
#[derive(Debug)]
pub struct PageCollector<T> {
    cursor: PageCursor,
    seen: usize,
    items: Vec<T>,
    has_more: bool,
}

impl<T> PageCollector<T> {
    pub fn new(cursor: PageCursor) -> Self {
        Self {
            cursor,
            seen: 0,
            items: Vec::new(),
            has_more: false,
        }
    }

    /// Offer the next item of the sequence. `make` runs only for items that land on the page.
    pub fn offer_with(&mut self, make: impl FnOnce() -> T) -> ControlFlow<()> {
        if self.has_more {
            return ControlFlow::Break(());
        }
        let index = self.seen;
        self.seen += 1;
        if index < self.cursor.offset {
            return ControlFlow::Continue(());
        }
        if self.items.len() == self.cursor.page_size {
            self.has_more = true;
            return ControlFlow::Break(());
        }
        self.items.push(make());
        ControlFlow::Continue(())
    }

    pub fn offer(&mut self, item: T) -> ControlFlow<()> {
        self.offer_with(|| item)
    }

    pub const fn is_done(&self) -> bool {
        self.has_more
    }

    pub fn finish(self) -> Page<T> {
        Page {
            next_offset: self.has_more.then(|| self.cursor.next().offset),
            items: self.items,
            offset: self.cursor.offset,
            page_size: self.cursor.page_size,
            has_more: self.has_more,
        }
    }
}

/// Page of an iterator. Consumes at most `offset + page_size + 1` items.
pub fn paginate<I: IntoIterator>(items: I, cursor: PageCursor) -> Page<I::Item> {
    let mut collector = PageCollector::new(cursor);
    for item in items {
        if collector.offer(item).is_break() {
            break;
        }
    }
    collector.finish()
}
