//! Kubernetes controller for Windup resources.
//!
//! - [`WindupController`]: runs the dependent-resource workflow for one
//!   instance and records the outcome in its status
//!
//! # Usage with kube-runtime
//!
//! ```ignore
//! use windup_operator::controller::{WindupController, error_policy};
//!
//! Controller::new(windups, watcher_config)
//!     .run(|windup, ctx| async move {
//!         WindupController::new(ctx).reconcile(windup).await.map(Into::into)
//!     }, error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

pub mod conditions;
mod windup;

pub use windup::{WindupController, error_policy, validate_spec};

use crate::config::OperatorConfig;
use crate::error::OperatorResult;
use crate::store::ResourceStore;
use crate::workflow::{DependencyGraph, WorkflowOrchestrator, windup_workflow};
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

/// Shared context for the controller.
pub struct ControllerContext {
    /// Store the workflow reads and writes.
    pub store: Arc<dyn ResourceStore>,
    /// Process-wide configuration.
    pub config: Arc<OperatorConfig>,
    /// Orchestrator over the validated workflow graph.
    pub orchestrator: WorkflowOrchestrator,
}

impl ControllerContext {
    /// Create a context running the Windup workflow.
    ///
    /// Fails when the workflow graph is invalid.
    pub fn new(store: Arc<dyn ResourceStore>, config: Arc<OperatorConfig>) -> OperatorResult<Self> {
        let graph = windup_workflow()?;
        Ok(Self::with_graph(store, config, graph))
    }

    /// Create a context over an already validated graph.
    pub fn with_graph(
        store: Arc<dyn ResourceStore>,
        config: Arc<OperatorConfig>,
        graph: DependencyGraph,
    ) -> Self {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(graph),
            Arc::clone(&store),
            config.max_concurrent_applies,
        );
        Self {
            store,
            config,
            orchestrator,
        }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl From<ReconcileAction> for Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Action::requeue(duration),
            ReconcileAction::Done => Action::await_change(),
        }
    }
}
