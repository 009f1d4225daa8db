//! Resource nodes: one managed object and how to build, match and gate it.

use crate::context::SharedContext;
use crate::crd::{Windup, WindupSpec};
use crate::resources::{ManagedResource, ResourceKind};
use std::fmt;

/// Identifier of a node in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(&'static str);

impl NodeId {
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Builds the desired object for a node.
pub type DesiredFn = fn(&Windup, &SharedContext) -> ManagedResource;
/// Decides whether an observed object already satisfies the desired state.
pub type MatchFn = fn(&ManagedResource, &Windup, &SharedContext) -> bool;
/// Decides whether a node takes part in the pass at all.
pub type ActivationFn = fn(&WindupSpec) -> bool;

/// A named unit of work in the workflow.
#[derive(Clone)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: ResourceKind,
    /// Appended to the instance name to name the managed object.
    pub suffix: &'static str,
    pub desired: DesiredFn,
    pub matches: MatchFn,
    pub depends_on: Vec<NodeId>,
    /// Dependents wait until the object is ready, not merely applied.
    pub ready_postcondition: bool,
    /// When present and false, the node is skipped and any object it created
    /// earlier is removed.
    pub activation: Option<ActivationFn>,
}

impl ResourceNode {
    pub fn new(
        id: NodeId,
        kind: ResourceKind,
        suffix: &'static str,
        desired: DesiredFn,
        matches: MatchFn,
    ) -> Self {
        Self {
            id,
            kind,
            suffix,
            desired,
            matches,
            depends_on: Vec::new(),
            ready_postcondition: false,
            activation: None,
        }
    }

    /// Add dependencies.
    pub fn depends_on(mut self, deps: &[NodeId]) -> Self {
        self.depends_on.extend_from_slice(deps);
        self
    }

    /// Require dependents to wait for readiness.
    pub fn with_ready_postcondition(mut self) -> Self {
        self.ready_postcondition = true;
        self
    }

    /// Take part in a pass only when `activation` holds.
    pub fn with_activation(mut self, activation: ActivationFn) -> Self {
        self.activation = Some(activation);
        self
    }

    /// Name of the managed object, known without building it.
    pub fn object_name(&self, ctx: &SharedContext) -> String {
        ctx.resource_name(self.suffix)
    }

    /// Whether the node takes part in a pass for `spec`.
    pub fn is_active(&self, spec: &WindupSpec) -> bool {
        self.activation.is_none_or(|active| active(spec))
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("suffix", &self.suffix)
            .field("depends_on", &self.depends_on)
            .field("ready_postcondition", &self.ready_postcondition)
            .field("conditional", &self.activation.is_some())
            .finish()
    }
}
