//! Execution plans for batched tool calls.
//!
//! A plan is a tree of [`PlanNode`]s: leaves are single tool invocations, inner nodes group
//! children either sequentially or concurrently. Executing a plan yields a [`NodeOutcome`]
//! tree of exactly the same shape, so callers correlate outputs by position.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolhost_protocol::ErrorEnvelope;

/// Upper bound on the number of leaves a single plan may carry.
pub const MAX_PLAN_LEAVES: usize = 32;

/// Name of the batch entry point. Leaves may not invoke it.
pub const BATCH_TOOL_NAME: &str = "batch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNode {
    /// A single tool invocation.
    Leaf {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Children run one after another; the first failure skips the rest of this node.
    Sequential { children: Vec<PlanNode> },
    /// Children run independently; every outcome is recorded.
    Concurrent { children: Vec<PlanNode> },
}

impl PlanNode {
    pub fn leaf(tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self::Leaf {
            tool: tool.into(),
            input,
        }
    }

    pub fn sequential(children: impl IntoIterator<Item = PlanNode>) -> Self {
        Self::Sequential {
            children: children.into_iter().collect(),
        }
    }

    pub fn concurrent(children: impl IntoIterator<Item = PlanNode>) -> Self {
        Self::Concurrent {
            children: children.into_iter().collect(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Sequential { children } | Self::Concurrent { children } => {
                children.iter().map(Self::leaf_count).sum()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Execution plan has no tool invocations")]
    Empty,

    #[error("Execution plan has {leaves} invocations (max {max})")]
    TooLarge { leaves: usize, max: usize },
}

/// A validated-on-demand plan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ExecutionPlan {
    pub root: PlanNode,
}

impl ExecutionPlan {
    pub fn new(root: PlanNode) -> Self {
        Self { root }
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaf_count()
    }

    /// Structural pre-check. Runs before anything executes, so a rejected plan has no effects.
    pub fn check(&self) -> Result<usize, PlanError> {
        let leaves = self.leaf_count();
        if leaves == 0 {
            return Err(PlanError::Empty);
        }
        if leaves > MAX_PLAN_LEAVES {
            return Err(PlanError::TooLarge {
                leaves,
                max: MAX_PLAN_LEAVES,
            });
        }
        Ok(leaves)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlatInvocation {
    /// Tool name
    pub name: String,
    /// Tool input object
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Input accepted by the batch entry point.
///
/// The tree form carries an explicit plan. The flat form is a list of invocations plus a
/// single concurrency flag and is lifted into one sequential or concurrent node.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BatchRequest {
    Plan {
        plan: PlanNode,
    },
    Flat {
        invocations: Vec<FlatInvocation>,
        #[serde(default)]
        run_tools_concurrently: bool,
    },
}

impl BatchRequest {
    pub fn into_plan(self) -> ExecutionPlan {
        match self {
            Self::Plan { plan } => ExecutionPlan::new(plan),
            Self::Flat {
                invocations,
                run_tools_concurrently,
            } => {
                let leaves = invocations
                    .into_iter()
                    .map(|inv| PlanNode::leaf(inv.name, inv.input));
                if run_tools_concurrently {
                    ExecutionPlan::new(PlanNode::concurrent(leaves))
                } else {
                    ExecutionPlan::new(PlanNode::sequential(leaves))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    Ok,
    Error,
    /// Not executed because an earlier sequential sibling failed.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeafOutcome {
    pub tool: String,
    pub status: LeafStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl LeafOutcome {
    pub fn ok(tool: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            status: LeafStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(tool: impl Into<String>, error: ErrorEnvelope) -> Self {
        Self {
            tool: tool.into(),
            status: LeafStatus::Error,
            data: None,
            error: Some(error),
        }
    }

    pub fn skipped(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status: LeafStatus::Skipped,
            data: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOutcome {
    Leaf(LeafOutcome),
    Sequential {
        status: GroupStatus,
        children: Vec<NodeOutcome>,
    },
    Concurrent {
        status: GroupStatus,
        children: Vec<NodeOutcome>,
    },
}

impl NodeOutcome {
    /// Outcome for a node that never ran, mirroring the node's shape.
    pub fn skipped(node: &PlanNode) -> Self {
        match node {
            PlanNode::Leaf { tool, .. } => Self::Leaf(LeafOutcome::skipped(tool.clone())),
            PlanNode::Sequential { children } => Self::Sequential {
                status: GroupStatus::Skipped,
                children: children.iter().map(Self::skipped).collect(),
            },
            PlanNode::Concurrent { children } => Self::Concurrent {
                status: GroupStatus::Skipped,
                children: children.iter().map(Self::skipped).collect(),
            },
        }
    }

    pub fn group_status(children: &[NodeOutcome]) -> GroupStatus {
        if children.iter().any(NodeOutcome::is_failure) {
            GroupStatus::Failed
        } else {
            GroupStatus::Ok
        }
    }

    /// A node failed when it (or any descendant) executed and reported an error.
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.status == LeafStatus::Error,
            Self::Sequential { status, .. } | Self::Concurrent { status, .. } => {
                *status == GroupStatus::Failed
            }
        }
    }

    pub fn leaves(&self) -> Vec<&LeafOutcome> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafOutcome>) {
        match self {
            Self::Leaf(leaf) => out.push(leaf),
            Self::Sequential { children, .. } | Self::Concurrent { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutcomeSummary {
    pub leaves: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanOutcome {
    pub summary: OutcomeSummary,
    pub result: NodeOutcome,
}

impl PlanOutcome {
    pub fn new(result: NodeOutcome) -> Self {
        let mut summary = OutcomeSummary::default();
        for leaf in result.leaves() {
            summary.leaves += 1;
            match leaf.status {
                LeafStatus::Ok => summary.succeeded += 1,
                LeafStatus::Error => summary.failed += 1,
                LeafStatus::Skipped => summary.skipped += 1,
            }
        }
        Self { summary, result }
    }
}
