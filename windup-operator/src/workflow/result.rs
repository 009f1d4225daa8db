//! Per-node and aggregate outcome of one reconciliation pass.

use super::node::NodeId;
use crate::error::OperatorError;
use crate::resources::{ManagedResource, ResourceKind};
use std::fmt;

/// What the apply step did to the stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    /// An inactive node removed an object it had created earlier.
    Deleted,
    /// An inactive node found nothing to remove.
    Absent,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Deleted => "deleted",
            ApplyOutcome::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Where a node ended up in the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Applied, and ready if a postcondition is declared.
    Ready,
    /// Applied but the readiness postcondition does not hold yet.
    NotReady,
    /// The apply failed.
    Failed(String),
    /// Skipped because this dependency failed or was blocked.
    Blocked(NodeId),
    /// Skipped because this dependency is not ready yet.
    Waiting(NodeId),
    /// Not part of this pass.
    Inactive,
}

impl NodeState {
    /// Whether dependents may proceed.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, NodeState::Ready | NodeState::Inactive)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NodeState::Failed(_))
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Ready => f.write_str("ready"),
            NodeState::NotReady => f.write_str("not ready"),
            NodeState::Failed(msg) => write!(f, "failed: {}", msg),
            NodeState::Blocked(dep) => write!(f, "blocked by {}", dep),
            NodeState::Waiting(dep) => write!(f, "waiting for {}", dep),
            NodeState::Inactive => f.write_str("inactive"),
        }
    }
}

/// Outcome of one node.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub id: NodeId,
    pub kind: ResourceKind,
    /// Name of the managed object.
    pub name: String,
    /// `None` when the node was never applied.
    pub outcome: Option<ApplyOutcome>,
    pub state: NodeState,
    /// The object as stored after the apply.
    pub resource: Option<ManagedResource>,
}

/// Aggregate of every node report for one pass, in topological order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowResult {
    reports: Vec<NodeReport>,
}

impl WorkflowResult {
    pub(crate) fn new(reports: Vec<NodeReport>) -> Self {
        Self { reports }
    }

    pub fn reports(&self) -> &[NodeReport] {
        &self.reports
    }

    pub fn report(&self, id: NodeId) -> Option<&NodeReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn state(&self, id: NodeId) -> Option<&NodeState> {
        self.report(id).map(|r| &r.state)
    }

    pub fn outcome(&self, id: NodeId) -> Option<ApplyOutcome> {
        self.report(id).and_then(|r| r.outcome)
    }

    /// Whether every node is ready or inactive.
    pub fn all_ready(&self) -> bool {
        self.reports.iter().all(|r| r.state.is_satisfied())
    }

    /// Nodes whose apply failed.
    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.reports.iter().filter(|r| r.state.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Nodes applied but not ready, or held back waiting for one.
    pub fn pending(&self) -> impl Iterator<Item = &NodeReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.state, NodeState::NotReady | NodeState::Waiting(_)))
    }

    /// Nodes whose apply wrote to the store.
    pub fn changed(&self) -> impl Iterator<Item = &NodeReport> {
        self.reports.iter().filter(|r| {
            matches!(
                r.outcome,
                Some(ApplyOutcome::Created | ApplyOutcome::Updated | ApplyOutcome::Deleted)
            )
        })
    }

    /// The terminal error of the pass, if any node failed.
    pub fn error(&self) -> Option<OperatorError> {
        let mut failures = self.failures();
        let first = failures.next()?;
        let NodeState::Failed(cause) = &first.state else {
            return None;
        };

        let others: Vec<&str> = failures.map(|r| r.id.as_str()).collect();
        let cause = if others.is_empty() {
            cause.clone()
        } else {
            format!("{} (also failed: {})", cause, others.join(", "))
        };

        Some(OperatorError::ReconcileError {
            kind: first.kind.to_string(),
            name: first.name.clone(),
            cause,
        })
    }
}
