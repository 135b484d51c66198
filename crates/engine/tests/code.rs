mod common;

use anyhow::Result;
use common::{error_kind, offline_engine, FakeCodeIntelligence, Journal, Project};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use toolhost_engine::backend::{FileOutline, Location, OutlineNode, Point, TextEdit, TextRange};

const LIB: &str = "pub fn helper() -> u32 { 1 }\n\npub fn run() -> u32 {\n    helper() + helper()\n}\n";

fn range(line: u32, start: u32, end: u32) -> TextRange {
    TextRange {
        start: Point::new(line, start),
        end: Point::new(line, end),
    }
}

#[tokio::test]
async fn symbol_info_needs_context_for_repeated_symbols() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    let code = Arc::new(FakeCodeIntelligence {
        locations: vec![Location {
            path: "a/src/lib.rs".to_string(),
            range: range(0, 7, 13),
        }],
        ..Default::default()
    });
    let engine = offline_engine(code.clone(), &Journal::default())?;

    let ambiguous = engine
        .call(
            "symbol_info",
            json!({ "path": "a/src/lib.rs", "symbol": "helper", "command": "definition" }),
            &project.context,
        )
        .await
        .expect_err("three occurrences");
    assert_eq!(error_kind(&ambiguous), "ambiguous");
    assert_eq!(
        ambiguous.to_envelope().details,
        Some(json!({ "count": 3 }))
    );
    assert!(code.seen.lock().expect("seen").is_empty());

    let out = engine
        .call(
            "symbol_info",
            json!({
                "path": "a/src/lib.rs",
                "symbol": "helper",
                "context_before_symbol": "+ ",
                "command": "definition"
            }),
            &project.context,
        )
        .await?;
    assert_eq!(out["position"]["point"], json!({ "line": 3, "character": 15 }));
    assert_eq!(out["locations"][0]["path"], "a/src/lib.rs");
    assert_eq!(out["locations"][0]["excerpt"], "pub fn helper() -> u32 { 1 }");

    let seen = code.seen.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.point, Point::new(3, 15));
    assert_eq!(seen[0].1, "definition");
    Ok(())
}

#[tokio::test]
async fn symbol_info_with_no_results_is_not_found() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    let engine = offline_engine(Arc::new(FakeCodeIntelligence::default()), &Journal::default())?;

    let err = engine
        .call(
            "symbol_info",
            json!({
                "path": "a/src/lib.rs",
                "symbol": "run",
                "command": "references"
            }),
            &project.context,
        )
        .await
        .expect_err("no references");
    assert_eq!(error_kind(&err), "not_found");

    let bad_command = engine
        .call(
            "symbol_info",
            json!({ "path": "a/src/lib.rs", "symbol": "run", "command": "callers" }),
            &project.context,
        )
        .await
        .expect_err("unknown command");
    assert_eq!(error_kind(&bad_command), "invalid_input");
    Ok(())
}

#[tokio::test]
async fn rename_applies_backend_edits_across_files() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    project.write("src/main.rs", "fn main() { a::helper(); }\n")?;
    let code = Arc::new(FakeCodeIntelligence {
        edits: vec![
            TextEdit {
                path: "a/src/lib.rs".to_string(),
                range: range(0, 7, 13),
                new_text: "assist".to_string(),
            },
            TextEdit {
                path: "a/src/lib.rs".to_string(),
                range: range(3, 4, 10),
                new_text: "assist".to_string(),
            },
            TextEdit {
                path: "a/src/lib.rs".to_string(),
                range: range(3, 15, 21),
                new_text: "assist".to_string(),
            },
            TextEdit {
                path: "a/src/main.rs".to_string(),
                range: range(0, 15, 21),
                new_text: "assist".to_string(),
            },
        ],
        ..Default::default()
    });
    let engine = offline_engine(code.clone(), &Journal::default())?;

    let out = engine
        .call(
            "rename",
            json!({
                "path": "a/src/lib.rs",
                "symbol": "helper",
                "context_before_symbol": "fn ",
                "new_name": "assist"
            }),
            &project.context,
        )
        .await?;
    assert_eq!(
        out["files"],
        json!([
            { "path": "a/src/lib.rs", "edits": 3 },
            { "path": "a/src/main.rs", "edits": 1 }
        ])
    );
    assert_eq!(
        project.read("src/lib.rs")?,
        "pub fn assist() -> u32 { 1 }\n\npub fn run() -> u32 {\n    assist() + assist()\n}\n"
    );
    assert_eq!(project.read("src/main.rs")?, "fn main() { a::assist(); }\n");
    assert_eq!(code.seen.lock().expect("seen")[0].1, "rename:assist");
    Ok(())
}

#[tokio::test]
async fn rename_edit_outside_roots_aborts_before_writing() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    let code = Arc::new(FakeCodeIntelligence {
        edits: vec![
            TextEdit {
                path: "a/src/lib.rs".to_string(),
                range: range(0, 7, 13),
                new_text: "assist".to_string(),
            },
            TextEdit {
                path: "../elsewhere/lib.rs".to_string(),
                range: range(0, 0, 1),
                new_text: "x".to_string(),
            },
        ],
        ..Default::default()
    });
    let engine = offline_engine(code, &Journal::default())?;

    let err = engine
        .call(
            "rename",
            json!({
                "path": "a/src/lib.rs",
                "symbol": "helper",
                "context_before_symbol": "fn ",
                "new_name": "assist"
            }),
            &project.context,
        )
        .await
        .expect_err("escaping edit");
    assert_eq!(error_kind(&err), "out_of_bounds");
    assert_eq!(project.read("src/lib.rs")?, LIB);
    Ok(())
}

fn symbol(name: &str, line: u32, children: Vec<OutlineNode>) -> OutlineNode {
    OutlineNode {
        name: name.to_string(),
        kind: "function".to_string(),
        range: range(line, 0, 1),
        children,
    }
}

#[tokio::test]
async fn code_symbols_flattens_filters_and_pages() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    let many: Vec<OutlineNode> = (0..2005).map(|i| symbol(&format!("f{i}"), i, Vec::new())).collect();
    let code = Arc::new(FakeCodeIntelligence {
        outline: vec![
            FileOutline {
                path: "a/src/lib.rs".to_string(),
                symbols: vec![symbol("Widget", 0, vec![symbol("render", 1, Vec::new())])],
            },
            FileOutline {
                path: "a/src/big.rs".to_string(),
                symbols: many,
            },
        ],
        ..Default::default()
    });
    let engine = offline_engine(code, &Journal::default())?;

    let one_file = engine
        .call("code_symbols", json!({ "path": "a/src/lib.rs" }), &project.context)
        .await?;
    assert_eq!(
        one_file["items"],
        json!([
            { "path": "a/src/lib.rs", "name": "Widget", "kind": "function", "depth": 0, "start_line": 1, "end_line": 1 },
            { "path": "a/src/lib.rs", "name": "render", "kind": "function", "depth": 1, "start_line": 2, "end_line": 2 }
        ])
    );

    let first = engine
        .call("code_symbols", json!({}), &project.context)
        .await?;
    assert_eq!(first["items"].as_array().map(Vec::len), Some(2000));
    assert_eq!(first["has_more"], true);
    let second = engine
        .call("code_symbols", json!({ "offset": 2000 }), &project.context)
        .await?;
    assert_eq!(second["items"].as_array().map(Vec::len), Some(7));
    assert_eq!(second["has_more"], false);

    let filtered = engine
        .call("code_symbols", json!({ "regex": "^REND" }), &project.context)
        .await?;
    assert_eq!(filtered["items"][0]["name"], "render");
    assert_eq!(filtered["items"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn diagnostics_scope_follows_path() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", LIB)?;
    let engine = offline_engine(Arc::new(FakeCodeIntelligence::default()), &Journal::default())?;

    let file = engine
        .call("diagnostics", json!({ "path": "a/src/lib.rs" }), &project.context)
        .await?;
    assert_eq!(file["scope"], "file");
    let project_wide = engine.call("diagnostics", json!({}), &project.context).await?;
    assert_eq!(project_wide["scope"], "project");
    Ok(())
}
