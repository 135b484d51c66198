mod common;

use anyhow::Result;
use common::{engine, error_kind, Project};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn find_path_pages_sixty_matches_as_fifty_then_ten() -> Result<()> {
    let project = Project::new("a")?;
    for i in 0..60 {
        project.write(&format!("src/m{i:02}.rs"), "")?;
    }
    project.write("README.md", "")?;
    let engine = engine()?;

    let first = engine
        .call("find_path", json!({ "glob": "**/*.rs" }), &project.context)
        .await?;
    assert_eq!(first["items"].as_array().map(Vec::len), Some(50));
    assert_eq!(first["has_more"], true);
    assert_eq!(first["next_offset"], 50);
    assert_eq!(first["items"][0], "a/src/m00.rs");
    assert_eq!(first["next_actions"][0]["tool"], "find_path");
    assert_eq!(
        first["next_actions"][0]["args"],
        json!({ "glob": "**/*.rs", "offset": 50 })
    );

    let second = engine
        .call(
            "find_path",
            json!({ "glob": "**/*.rs", "offset": 50 }),
            &project.context,
        )
        .await?;
    assert_eq!(second["items"].as_array().map(Vec::len), Some(10));
    assert_eq!(second["has_more"], false);
    assert_eq!(second["items"][9], "a/src/m59.rs");
    assert!(second.get("next_actions").is_none());

    let again = engine
        .call(
            "find_path",
            json!({ "glob": "**/*.rs", "offset": 50 }),
            &project.context,
        )
        .await?;
    assert_eq!(again, second);
    Ok(())
}

#[tokio::test]
async fn grep_pages_hunks_by_twenty() -> Result<()> {
    let project = Project::new("a")?;
    for i in 0..25 {
        project.write(&format!("notes/n{i:02}.txt"), "intro\nTODO: fix\noutro\n")?;
    }
    let engine = engine()?;

    let first = engine
        .call("grep", json!({ "regex": "todo" }), &project.context)
        .await?;
    let items = first["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 20);
    assert_eq!(first["has_more"], true);
    assert_eq!(items[0]["path"], "a/notes/n00.txt");
    assert_eq!(items[0]["match_lines"], json!([2]));
    assert_eq!(items[0]["content"], "intro\nTODO: fix\noutro");

    let second = engine
        .call("grep", json!({ "regex": "todo", "offset": 20 }), &project.context)
        .await?;
    let rest = second["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(rest.len(), 5);
    assert_eq!(rest[0]["path"], "a/notes/n20.txt");
    assert_eq!(second["has_more"], false);

    let sensitive = engine
        .call(
            "grep",
            json!({ "regex": "todo", "case_sensitive": true }),
            &project.context,
        )
        .await?;
    assert_eq!(sensitive["items"], json!([]));
    Ok(())
}

#[tokio::test]
async fn grep_filters_by_include_pattern_and_rejects_bad_regex() -> Result<()> {
    let project = Project::new("a")?;
    project.write("src/lib.rs", "// TODO rust\n")?;
    project.write("docs/guide.md", "TODO docs\n")?;
    let engine = engine()?;

    let out = engine
        .call(
            "grep",
            json!({ "regex": "TODO", "include_pattern": "**/*.rs" }),
            &project.context,
        )
        .await?;
    let paths: Vec<&str> = out["items"]
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["path"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(paths, vec!["a/src/lib.rs"]);

    let err = engine
        .call("grep", json!({ "regex": "(unclosed" }), &project.context)
        .await
        .expect_err("bad regex");
    assert_eq!(error_kind(&err), "invalid_input");
    Ok(())
}

#[tokio::test]
async fn grep_merges_nearby_matches_into_one_hunk() -> Result<()> {
    let project = Project::new("a")?;
    project.write("f.txt", "a\nhit 1\nb\nhit 2\nc\nd\ne\nf\ng\nhit 3\n")?;
    let engine = engine()?;

    let out = engine
        .call("grep", json!({ "regex": "^hit" }), &project.context)
        .await?;
    let hunks = out["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(hunks.len(), 2);
    assert_eq!(hunks[0]["start_line"], 1);
    assert_eq!(hunks[0]["end_line"], 6);
    assert_eq!(hunks[0]["match_lines"], json!([2, 4]));
    assert_eq!(hunks[1]["start_line"], 8);
    assert_eq!(hunks[1]["end_line"], 10);
    Ok(())
}
