mod common;

use anyhow::Result;
use common::{offline_engine, with_test_tools, FakeCodeIntelligence, Journal, Project};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolhost_engine::plan::{
    BatchRequest, ExecutionPlan, GroupStatus, LeafStatus, NodeOutcome, PlanNode, MAX_PLAN_LEAVES,
};
use toolhost_engine::Engine;

fn leaf_statuses(outcome: &NodeOutcome) -> Vec<(String, LeafStatus)> {
    outcome
        .leaves()
        .into_iter()
        .map(|leaf| (leaf.tool.clone(), leaf.status))
        .collect()
}

fn sleep(ms: u64, label: &str) -> PlanNode {
    PlanNode::leaf("sleep", json!({ "ms": ms, "label": label }))
}

fn record(label: &str) -> PlanNode {
    PlanNode::leaf("record", json!({ "label": label }))
}

fn test_engine(journal: &Journal) -> Result<Engine> {
    offline_engine(Arc::new(FakeCodeIntelligence::default()), journal)
}

#[tokio::test]
async fn mixed_plan_returns_tree_in_declared_positions() -> Result<()> {
    let project = Project::new("a")?;
    project.write("x.txt", "TODO: first\n")?;
    project.write("docs/readme.md", "# docs\n")?;
    let engine = test_engine(&Journal::default())?;

    let plan = ExecutionPlan::new(PlanNode::sequential([
        PlanNode::sequential([
            PlanNode::leaf("read_file", json!({ "path": "a/x.txt" })),
            PlanNode::leaf(
                "edit_file",
                json!({ "path": "a/x.txt", "old_text": "first", "new_text": "second" }),
            ),
        ]),
        PlanNode::concurrent([
            PlanNode::leaf("grep", json!({ "regex": "TODO" })),
            PlanNode::leaf("find_path", json!({ "glob": "**/*.md" })),
        ]),
    ]));

    let outcome = engine.batch(plan, &project.context).await?;
    assert_eq!(outcome.summary.succeeded, 4);

    let NodeOutcome::Sequential { children, .. } = &outcome.result else {
        panic!("root must be sequential: {:?}", outcome.result);
    };
    assert_eq!(children.len(), 2);
    let NodeOutcome::Concurrent { children: branch, status } = &children[1] else {
        panic!("second branch must be concurrent");
    };
    assert_eq!(*status, GroupStatus::Ok);
    let tools: Vec<&str> = branch
        .iter()
        .map(|child| match child {
            NodeOutcome::Leaf(leaf) => leaf.tool.as_str(),
            _ => "group",
        })
        .collect();
    assert_eq!(tools, vec!["grep", "find_path"]);

    let NodeOutcome::Leaf(grep) = &branch[0] else {
        panic!("grep leaf");
    };
    let grep_data = grep.data.as_ref().expect("grep output");
    assert_eq!(grep_data["items"][0]["content"], "TODO: second");
    let NodeOutcome::Leaf(find) = &branch[1] else {
        panic!("find leaf");
    };
    assert_eq!(
        find.data.as_ref().expect("find output")["items"],
        json!(["a/docs/readme.md"])
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_results_keep_declared_order_regardless_of_finish_order() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::concurrent([
        sleep(150, "slow"),
        sleep(10, "fast"),
        sleep(80, "medium"),
    ]));
    let started = Instant::now();
    let outcome = engine.batch(plan, &project.context).await?;
    let elapsed = started.elapsed();

    let labels: Vec<String> = outcome
        .result
        .leaves()
        .iter()
        .map(|leaf| leaf.data.as_ref().expect("data")["label"].as_str().unwrap_or("").to_string())
        .collect();
    assert_eq!(labels, vec!["slow", "fast", "medium"]);

    let entries = journal.entries();
    let fast_end = entries.iter().position(|e| e == "end:fast").expect("fast ended");
    let slow_end = entries.iter().position(|e| e == "end:slow").expect("slow ended");
    assert!(fast_end < slow_end, "{entries:?}");
    assert!(elapsed < Duration::from_millis(240 + 1000), "ran sequentially: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn concurrent_failure_does_not_cancel_siblings() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::concurrent([
        PlanNode::leaf("fail", json!({ "message": "first branch broke" })),
        sleep(30, "survivor"),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;

    assert_eq!(
        leaf_statuses(&outcome.result),
        vec![
            ("fail".to_string(), LeafStatus::Error),
            ("sleep".to_string(), LeafStatus::Ok),
        ]
    );
    let failed = outcome.result.leaves()[0].error.clone().expect("envelope");
    assert_eq!(failed.code.as_str(), "tool_failure");
    assert_eq!(failed.message, "first branch broke");
    assert!(journal.entries().contains(&"end:survivor".to_string()));
    Ok(())
}

#[tokio::test]
async fn sequential_failure_skips_the_rest() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::sequential([
        record("one"),
        PlanNode::leaf("fail", json!({})),
        record("three"),
        PlanNode::concurrent([record("four"), record("five")]),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;

    assert_eq!(journal.entries(), vec!["one".to_string()]);
    assert_eq!(
        leaf_statuses(&outcome.result),
        vec![
            ("record".to_string(), LeafStatus::Ok),
            ("fail".to_string(), LeafStatus::Error),
            ("record".to_string(), LeafStatus::Skipped),
            ("record".to_string(), LeafStatus::Skipped),
            ("record".to_string(), LeafStatus::Skipped),
        ]
    );
    assert_eq!(outcome.summary.skipped, 3);
    let NodeOutcome::Sequential { status, children } = &outcome.result else {
        panic!("sequential root");
    };
    assert_eq!(*status, GroupStatus::Failed);
    assert!(matches!(
        children[3],
        NodeOutcome::Concurrent {
            status: GroupStatus::Skipped,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn failed_nested_sequence_does_not_stop_its_parent() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::sequential([
        PlanNode::sequential([PlanNode::leaf("fail", json!({})), record("x")]),
        record("y"),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;

    assert_eq!(journal.entries(), vec!["y".to_string()]);
    assert_eq!(
        leaf_statuses(&outcome.result),
        vec![
            ("fail".to_string(), LeafStatus::Error),
            ("record".to_string(), LeafStatus::Skipped),
            ("record".to_string(), LeafStatus::Ok),
        ]
    );
    let NodeOutcome::Sequential { children, .. } = &outcome.result else {
        panic!("sequential root");
    };
    assert!(matches!(
        children[0],
        NodeOutcome::Sequential {
            status: GroupStatus::Failed,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn failed_concurrent_group_does_not_stop_its_parent() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::sequential([
        PlanNode::concurrent([PlanNode::leaf("fail", json!({})), record("sibling")]),
        record("after"),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;

    assert_eq!(
        journal.entries(),
        vec!["sibling".to_string(), "after".to_string()]
    );
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.skipped, 0);
    assert_eq!(outcome.summary.succeeded, 2);
    Ok(())
}

#[tokio::test]
async fn sequential_inside_concurrent_aborts_only_its_branch() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::concurrent([
        PlanNode::sequential([PlanNode::leaf("fail", json!({})), record("after-fail")]),
        PlanNode::sequential([record("left"), record("right")]),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;

    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["left".to_string(), "right".to_string()]);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.skipped, 1);
    assert_eq!(outcome.summary.succeeded, 2);
    Ok(())
}

#[tokio::test]
async fn oversized_plan_is_rejected_before_anything_runs() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let mut leaves: Vec<PlanNode> = (0..MAX_PLAN_LEAVES).map(|i| record(&format!("r{i}"))).collect();
    leaves.push(PlanNode::leaf(
        "create_file",
        json!({ "path": "a/should-not-exist.txt", "contents": "x" }),
    ));
    let plan = ExecutionPlan::new(PlanNode::sequential(leaves));

    let err = engine
        .batch(plan, &project.context)
        .await
        .expect_err("too large");
    assert_eq!(err.kind().as_str(), "plan_too_large");
    assert!(journal.entries().is_empty());
    assert!(!project.root.join("should-not-exist.txt").exists());

    let empty = engine
        .batch(ExecutionPlan::new(PlanNode::concurrent(Vec::new())), &project.context)
        .await
        .expect_err("empty plan");
    assert_eq!(empty.kind().as_str(), "invalid_input");
    Ok(())
}

#[tokio::test]
async fn nested_batch_leaf_is_rejected_per_leaf() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = test_engine(&journal)?;

    let plan = ExecutionPlan::new(PlanNode::concurrent([
        PlanNode::leaf("batch", json!({ "invocations": [] })),
        record("ok"),
    ]));
    let outcome = engine.batch(plan, &project.context).await?;
    let leaves = outcome.result.leaves();
    assert_eq!(leaves[0].status, LeafStatus::Error);
    assert_eq!(
        leaves[0].error.as_ref().map(|e| e.code.as_str()),
        Some("invalid_input")
    );
    assert_eq!(leaves[1].status, LeafStatus::Ok);
    Ok(())
}

#[tokio::test]
async fn flat_request_form_maps_to_a_plan() -> Result<()> {
    let project = Project::new("a")?;
    let journal = Journal::default();
    let engine = with_test_tools(Engine::builder(), &journal).build()?;

    let request: BatchRequest = serde_json::from_value(json!({
        "invocations": [
            { "name": "record", "input": { "label": "x" } },
            { "name": "record", "input": { "label": "y" } }
        ]
    }))?;
    let outcome = engine.batch(request.into_plan(), &project.context).await?;
    assert!(matches!(outcome.result, NodeOutcome::Sequential { .. }));
    assert_eq!(journal.entries(), vec!["x".to_string(), "y".to_string()]);
    Ok(())
}

#[tokio::test]
async fn batched_leaf_matches_single_dispatch() -> Result<()> {
    let project = Project::new("a")?;
    project.write("notes.txt", "alpha\nbeta\n")?;
    let engine = test_engine(&Journal::default())?;
    let input = json!({ "path": "a/notes.txt", "start_line": 2 });

    let single = engine.call("read_file", input.clone(), &project.context).await?;
    let outcome = engine
        .batch(
            ExecutionPlan::new(PlanNode::sequential([PlanNode::leaf("read_file", input)])),
            &project.context,
        )
        .await?;
    assert_eq!(outcome.result.leaves()[0].data.as_ref(), Some(&single));

    let bad = engine
        .batch(
            ExecutionPlan::new(PlanNode::sequential([PlanNode::leaf(
                "read_file",
                json!({ "path": "../escape" }),
            )])),
            &project.context,
        )
        .await?;
    let direct = engine
        .call("read_file", json!({ "path": "../escape" }), &project.context)
        .await
        .expect_err("escape");
    assert_eq!(bad.result.leaves()[0].error.as_ref(), Some(&direct.to_envelope()));
    Ok(())
}
