//! Execution of composite plans (the batch tool).
//!
//! Sequential children run strictly in order and stop at the first failing leaf; the rest of
//! the sequence is reported as skipped. A nested group that failed reports it in its own status
//! and does not stop its parent. Concurrent children all start, all run to completion, and are
//! reported in declared order regardless of finish order. The leaf limit is checked before
//! anything runs.

use std::future::Future;
use std::pin::Pin;

use toolhost_plan::{
    ExecutionPlan, LeafOutcome, LeafStatus, NodeOutcome, PlanNode, PlanOutcome, BATCH_TOOL_NAME,
};

use crate::dispatcher::Dispatcher;
use crate::error::ToolError;
use crate::invocation::{ExecutionContext, Invocation};

type NodeFuture = Pin<Box<dyn Future<Output = NodeOutcome> + Send + 'static>>;

#[derive(Clone)]
pub struct BatchOrchestrator {
    dispatcher: Dispatcher,
}

impl BatchOrchestrator {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Fails as a whole only when the plan is rejected up front (empty, too large); otherwise
    /// every leaf reports its own result.
    pub async fn execute(
        &self,
        plan: ExecutionPlan,
        context: &ExecutionContext,
    ) -> Result<PlanOutcome, ToolError> {
        let leaves = plan.check()?;
        log::debug!("batch: executing plan with {leaves} invocations");
        let result = run_node(self.dispatcher.clone(), plan.root, context.clone()).await;
        let outcome = PlanOutcome::new(result);
        log::debug!(
            "batch: {} succeeded, {} failed, {} skipped",
            outcome.summary.succeeded,
            outcome.summary.failed,
            outcome.summary.skipped
        );
        Ok(outcome)
    }
}

fn run_node(dispatcher: Dispatcher, node: PlanNode, context: ExecutionContext) -> NodeFuture {
    Box::pin(async move {
        match node {
            PlanNode::Leaf { tool, input } => run_leaf(&dispatcher, tool, input, context).await,
            PlanNode::Sequential { children } => {
                let mut outcomes = Vec::with_capacity(children.len());
                let mut pending = children.into_iter();
                while let Some(child) = pending.next() {
                    let outcome = run_node(dispatcher.clone(), child, context.clone()).await;
                    // A failed child group has already reported its failure in its own status.
                    let failed = matches!(
                        &outcome,
                        NodeOutcome::Leaf(leaf) if leaf.status == LeafStatus::Error
                    );
                    outcomes.push(outcome);
                    if failed {
                        outcomes.extend(pending.by_ref().map(|rest| NodeOutcome::skipped(&rest)));
                        break;
                    }
                }
                NodeOutcome::Sequential {
                    status: NodeOutcome::group_status(&outcomes),
                    children: outcomes,
                }
            }
            PlanNode::Concurrent { children } => {
                let handles: Vec<_> = children
                    .into_iter()
                    .map(|child| {
                        let shape = child.clone();
                        let task = tokio::spawn(run_node(dispatcher.clone(), child, context.clone()));
                        (shape, task)
                    })
                    .collect();

                let mut outcomes = Vec::with_capacity(handles.len());
                for (shape, task) in handles {
                    let outcome = match task.await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            log::warn!("batch: concurrent branch aborted: {err}");
                            failed_outcome(&shape, &format!("task aborted: {err}"))
                        }
                    };
                    outcomes.push(outcome);
                }
                NodeOutcome::Concurrent {
                    status: NodeOutcome::group_status(&outcomes),
                    children: outcomes,
                }
            }
        }
    })
}

async fn run_leaf(
    dispatcher: &Dispatcher,
    tool: String,
    input: serde_json::Value,
    context: ExecutionContext,
) -> NodeOutcome {
    if tool == BATCH_TOOL_NAME {
        let err = ToolError::invalid_input(
            "Nested batch calls are not supported; nest sequential/concurrent nodes instead",
        );
        return NodeOutcome::Leaf(LeafOutcome::error(tool, err.to_envelope()));
    }
    let invocation = Invocation::new(tool.clone(), input, context);
    match dispatcher.dispatch(invocation).await {
        Ok(data) => NodeOutcome::Leaf(LeafOutcome::ok(tool, data)),
        Err(err) => NodeOutcome::Leaf(LeafOutcome::error(tool, err.to_envelope())),
    }
}

/// Outcome for a branch whose task died: every leaf in its shape reports the failure.
fn failed_outcome(node: &PlanNode, message: &str) -> NodeOutcome {
    match node {
        PlanNode::Leaf { tool, .. } => NodeOutcome::Leaf(LeafOutcome::error(
            tool.clone(),
            ToolError::ToolFailure(message.to_string()).to_envelope(),
        )),
        PlanNode::Sequential { children } => NodeOutcome::Sequential {
            status: toolhost_plan::GroupStatus::Failed,
            children: children.iter().map(|c| failed_outcome(c, message)).collect(),
        },
        PlanNode::Concurrent { children } => NodeOutcome::Concurrent {
            status: toolhost_plan::GroupStatus::Failed,
            children: children.iter().map(|c| failed_outcome(c, message)).collect(),
        },
    }
}
