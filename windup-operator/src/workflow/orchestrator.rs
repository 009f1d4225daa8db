//! Executes the dependency graph for one instance.

use super::graph::DependencyGraph;
use super::node::{NodeId, ResourceNode};
use super::result::{ApplyOutcome, NodeReport, NodeState, WorkflowResult};
use crate::context::SharedContext;
use crate::crd::Windup;
use crate::error::OperatorResult;
use crate::readiness;
use crate::resources::ManagedResource;
use crate::store::ResourceStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

/// Runs reconciliation passes over a fixed graph.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    graph: Arc<DependencyGraph>,
    store: Arc<dyn ResourceStore>,
    max_concurrent_applies: usize,
}

/// Decision for a node whose dependencies have all settled.
enum Gate {
    Proceed,
    Skip(NodeState),
}

impl WorkflowOrchestrator {
    pub fn new(
        graph: Arc<DependencyGraph>,
        store: Arc<dyn ResourceStore>,
        max_concurrent_applies: usize,
    ) -> Self {
        Self {
            graph,
            store,
            max_concurrent_applies: max_concurrent_applies.max(1),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Run one pass and report every node.
    ///
    /// Nodes whose dependencies are satisfied are applied concurrently, up to
    /// `max_concurrent_applies` at a time. A failed node blocks its transitive
    /// dependents; a node that is not ready yet holds its dependents back until
    /// a later pass. Applies already started always run to completion.
    /// Node failures never escape: they are recorded in the result.
    #[instrument(
        skip_all,
        fields(
            name = %ctx.name,
            namespace = %ctx.namespace,
            nodes = self.graph.len(),
        )
    )]
    pub async fn reconcile(&self, cr: Arc<Windup>, ctx: Arc<SharedContext>) -> WorkflowResult {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_applies));
        let mut tasks: JoinSet<NodeReport> = JoinSet::new();
        let mut task_nodes: HashMap<tokio::task::Id, NodeId> = HashMap::new();
        let mut spawned: HashSet<NodeId> = HashSet::new();
        let mut settled: HashMap<NodeId, NodeReport> = HashMap::new();

        loop {
            // Settle skipped nodes until nothing changes, spawning every node
            // that can run.
            let mut progressed = true;
            while progressed {
                progressed = false;

                for node in self.graph.nodes() {
                    if spawned.contains(&node.id) || settled.contains_key(&node.id) {
                        continue;
                    }

                    if !node.is_active(&cr.spec) {
                        spawned.insert(node.id);
                        let handle = tasks.spawn(Self::remove_inactive(
                            node.clone(),
                            Arc::clone(&ctx),
                            Arc::clone(&self.store),
                            Arc::clone(&semaphore),
                        ));
                        task_nodes.insert(handle.id(), node.id);
                        continue;
                    }

                    if !node.depends_on.iter().all(|d| settled.contains_key(d)) {
                        continue;
                    }

                    match gate(node, &settled) {
                        Gate::Proceed => {
                            spawned.insert(node.id);
                            let handle = tasks.spawn(Self::apply_node(
                                node.clone(),
                                Arc::clone(&cr),
                                Arc::clone(&ctx),
                                Arc::clone(&self.store),
                                Arc::clone(&semaphore),
                            ));
                            task_nodes.insert(handle.id(), node.id);
                        }
                        Gate::Skip(state) => {
                            tracing::debug!(node = %node.id, state = %state, "Skipping node");
                            settled.insert(
                                node.id,
                                NodeReport {
                                    id: node.id,
                                    kind: node.kind,
                                    name: node.object_name(&ctx),
                                    outcome: None,
                                    state,
                                    resource: None,
                                },
                            );
                            progressed = true;
                        }
                    }
                }
            }

            if tasks.is_empty() {
                break;
            }

            match tasks.join_next_with_id().await {
                Some(Ok((task_id, report))) => {
                    task_nodes.remove(&task_id);
                    self.log_blocked(&report);
                    settled.insert(report.id, report);
                }
                Some(Err(join_error)) => {
                    let Some(node_id) = task_nodes.remove(&join_error.id()) else {
                        continue;
                    };
                    let reason = if join_error.is_panic() {
                        "apply task panicked"
                    } else {
                        "apply task was cancelled"
                    };
                    tracing::error!(node = %node_id, error = reason, "Task join error");

                    // The builder may be what panicked, so the name comes from the node.
                    if let Some(node) = self.graph.node(node_id) {
                        let report = NodeReport {
                            id: node_id,
                            kind: node.kind,
                            name: node.object_name(&ctx),
                            outcome: None,
                            state: NodeState::Failed(reason.to_string()),
                            resource: None,
                        };
                        self.log_blocked(&report);
                        settled.insert(node_id, report);
                    }
                }
                None => break,
            }
        }

        let reports: Vec<NodeReport> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|n| settled.remove(&n.id))
            .collect();

        let result = WorkflowResult::new(reports);
        tracing::debug!(
            ready = result.all_ready(),
            changed = result.changed().count(),
            failed = result.failures().count(),
            "Workflow pass finished"
        );
        result
    }

    fn log_blocked(&self, report: &NodeReport) {
        if !report.state.is_failed() {
            return;
        }
        let blocked = self.graph.transitive_dependents(report.id);
        if !blocked.is_empty() {
            tracing::warn!(
                node = %report.id,
                blocked = ?blocked.iter().map(NodeId::as_str).collect::<Vec<_>>(),
                "Failed node blocks its dependents for this pass"
            );
        }
    }

    async fn apply_node(
        node: ResourceNode,
        cr: Arc<Windup>,
        ctx: Arc<SharedContext>,
        store: Arc<dyn ResourceStore>,
        semaphore: Arc<Semaphore>,
    ) -> NodeReport {
        let _permit = semaphore.acquire().await;

        let desired = (node.desired)(&cr, &ctx);
        let name = desired.name().to_string();

        match Self::apply_desired(&node, &cr, &ctx, store.as_ref(), desired).await {
            Ok((outcome, resource)) => {
                let state = if node.ready_postcondition && !readiness::is_ready(&resource) {
                    NodeState::NotReady
                } else {
                    NodeState::Ready
                };

                match outcome {
                    ApplyOutcome::Unchanged => {
                        tracing::debug!(node = %node.id, kind = %node.kind, name = %name, state = %state, "Resource up to date");
                    }
                    _ => {
                        tracing::info!(node = %node.id, kind = %node.kind, name = %name, outcome = %outcome, state = %state, "Applied resource");
                    }
                }

                NodeReport {
                    id: node.id,
                    kind: node.kind,
                    name,
                    outcome: Some(outcome),
                    state,
                    resource: Some(resource),
                }
            }
            Err(e) => {
                tracing::warn!(
                    node = %node.id,
                    kind = %node.kind,
                    name = %name,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to apply resource"
                );
                NodeReport {
                    id: node.id,
                    kind: node.kind,
                    name,
                    outcome: None,
                    state: NodeState::Failed(e.to_string()),
                    resource: None,
                }
            }
        }
    }

    /// Create when absent, update conditionally when the matcher disagrees,
    /// otherwise leave the object alone.
    async fn apply_desired(
        node: &ResourceNode,
        cr: &Windup,
        ctx: &SharedContext,
        store: &dyn ResourceStore,
        mut desired: ManagedResource,
    ) -> OperatorResult<(ApplyOutcome, ManagedResource)> {
        let observed = store.get(node.kind, &ctx.namespace, desired.name()).await?;

        match observed {
            None => {
                let created = store.create(&desired).await?;
                Ok((ApplyOutcome::Created, created))
            }
            Some(observed) if (node.matches)(&observed, cr, ctx) => {
                Ok((ApplyOutcome::Unchanged, observed))
            }
            Some(observed) => {
                desired.set_resource_version(observed.resource_version().map(String::from));
                let updated = store.apply(&desired).await?;
                Ok((ApplyOutcome::Updated, updated))
            }
        }
    }

    /// Remove what an inactive node created in an earlier pass.
    ///
    /// Objects that do not carry the instance labels are left alone.
    async fn remove_inactive(
        node: ResourceNode,
        ctx: Arc<SharedContext>,
        store: Arc<dyn ResourceStore>,
        semaphore: Arc<Semaphore>,
    ) -> NodeReport {
        let _permit = semaphore.acquire().await;

        let name = node.object_name(&ctx);
        let report = |outcome: Option<ApplyOutcome>, state: NodeState| NodeReport {
            id: node.id,
            kind: node.kind,
            name: name.clone(),
            outcome,
            state,
            resource: None,
        };

        let observed = match store.get(node.kind, &ctx.namespace, &name).await {
            Ok(observed) => observed,
            Err(e) => return report(None, NodeState::Failed(e.to_string())),
        };

        match observed {
            Some(observed) if observed.has_labels(&ctx.labels) => {
                match store.delete(node.kind, &ctx.namespace, &name).await {
                    Ok(()) => {
                        tracing::info!(node = %node.id, kind = %node.kind, name = %name, "Deleted inactive resource");
                        report(Some(ApplyOutcome::Deleted), NodeState::Inactive)
                    }
                    Err(e) => {
                        tracing::warn!(node = %node.id, name = %name, error = %e, "Failed to delete inactive resource");
                        report(None, NodeState::Failed(e.to_string()))
                    }
                }
            }
            Some(_) => {
                tracing::debug!(node = %node.id, name = %name, "Inactive resource not managed by this instance, leaving it");
                report(Some(ApplyOutcome::Absent), NodeState::Inactive)
            }
            None => report(Some(ApplyOutcome::Absent), NodeState::Inactive),
        }
    }
}

/// Decide whether a node with settled dependencies may run.
///
/// A failed or blocked dependency blocks the node; otherwise a dependency
/// that is not ready, or is itself waiting, makes it wait.
fn gate(node: &ResourceNode, settled: &HashMap<NodeId, NodeReport>) -> Gate {
    let mut waiting_on = None;

    for dep in &node.depends_on {
        let Some(report) = settled.get(dep) else {
            continue;
        };
        match &report.state {
            NodeState::Failed(_) => return Gate::Skip(NodeState::Blocked(*dep)),
            NodeState::Blocked(root) => return Gate::Skip(NodeState::Blocked(*root)),
            NodeState::NotReady => {
                waiting_on.get_or_insert(*dep);
            }
            NodeState::Waiting(root) => {
                waiting_on.get_or_insert(*root);
            }
            NodeState::Ready | NodeState::Inactive => {}
        }
    }

    match waiting_on {
        Some(dep) => Gate::Skip(NodeState::Waiting(dep)),
        None => Gate::Proceed,
    }
}
