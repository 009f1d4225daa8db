//! Dependent-resource workflow for a Windup instance.
//!
//! The graph is fixed: it is declared here, validated once at startup and
//! walked by the [`WorkflowOrchestrator`] on every pass.
//!
//! ```text
//! db-secret ──┬──────────────► db-deployment* ──► db-service* ──┬─► web-deployment* ──► web-service* ──┬─► web-ingress*
//! db-pvc ─────┘                                                 │                                       └─► web-ingress-secure*
//! web-pvc ──────────────────────────────────────────────────────┤
//! basic-auth-secret ────────────────────────────────────────────┘
//!                                              db-service*, db-secret ──► executor-deployment*
//! ```
//!
//! Nodes marked `*` carry a readiness postcondition.

mod graph;
mod node;
mod orchestrator;
mod result;

pub use graph::DependencyGraph;
pub use node::{ActivationFn, DesiredFn, MatchFn, NodeId, ResourceNode};
pub use orchestrator::WorkflowOrchestrator;
pub use result::{ApplyOutcome, NodeReport, NodeState, WorkflowResult};

use crate::error::OperatorResult;
use crate::resources::{self, ResourceKind, deployment, ingress, pvc, secret, service};

pub const DB_SECRET: NodeId = NodeId::new("db-secret");
pub const BASIC_AUTH_SECRET: NodeId = NodeId::new("basic-auth-secret");
pub const DB_PVC: NodeId = NodeId::new("db-pvc");
pub const WEB_PVC: NodeId = NodeId::new("web-pvc");
pub const DB_DEPLOYMENT: NodeId = NodeId::new("db-deployment");
pub const DB_SERVICE: NodeId = NodeId::new("db-service");
pub const WEB_DEPLOYMENT: NodeId = NodeId::new("web-deployment");
pub const EXECUTOR_DEPLOYMENT: NodeId = NodeId::new("executor-deployment");
pub const WEB_SERVICE: NodeId = NodeId::new("web-service");
pub const WEB_INGRESS: NodeId = NodeId::new("web-ingress");
pub const WEB_INGRESS_SECURE: NodeId = NodeId::new("web-ingress-secure");

/// Every node of the Windup workflow, in declaration order.
pub fn windup_nodes() -> Vec<ResourceNode> {
    vec![
        ResourceNode::new(
            DB_SECRET,
            ResourceKind::Secret,
            resources::DB_SECRET_SUFFIX,
            secret::desired_db_secret,
            secret::matches_db_secret,
        ),
        ResourceNode::new(
            BASIC_AUTH_SECRET,
            ResourceKind::Secret,
            resources::BASIC_AUTH_SECRET_SUFFIX,
            secret::desired_basic_auth_secret,
            secret::matches_basic_auth_secret,
        )
        .with_activation(secret::basic_auth_secret_active),
        ResourceNode::new(
            DB_PVC,
            ResourceKind::PersistentVolumeClaim,
            resources::DB_PVC_SUFFIX,
            pvc::desired_db_pvc,
            pvc::matches_db_pvc,
        ),
        ResourceNode::new(
            WEB_PVC,
            ResourceKind::PersistentVolumeClaim,
            resources::WEB_PVC_SUFFIX,
            pvc::desired_web_pvc,
            pvc::matches_web_pvc,
        ),
        ResourceNode::new(
            DB_DEPLOYMENT,
            ResourceKind::Deployment,
            resources::DB_DEPLOYMENT_SUFFIX,
            deployment::desired_db_deployment,
            deployment::matches_db_deployment,
        )
        .depends_on(&[DB_SECRET, DB_PVC])
        .with_ready_postcondition(),
        ResourceNode::new(
            DB_SERVICE,
            ResourceKind::Service,
            resources::DB_SERVICE_SUFFIX,
            service::desired_db_service,
            service::matches_db_service,
        )
        .depends_on(&[DB_DEPLOYMENT])
        .with_ready_postcondition(),
        ResourceNode::new(
            WEB_DEPLOYMENT,
            ResourceKind::Deployment,
            resources::WEB_DEPLOYMENT_SUFFIX,
            deployment::desired_web_deployment,
            deployment::matches_web_deployment,
        )
        .depends_on(&[DB_SERVICE, DB_SECRET, WEB_PVC, BASIC_AUTH_SECRET])
        .with_ready_postcondition(),
        ResourceNode::new(
            EXECUTOR_DEPLOYMENT,
            ResourceKind::Deployment,
            resources::EXECUTOR_DEPLOYMENT_SUFFIX,
            deployment::desired_executor_deployment,
            deployment::matches_executor_deployment,
        )
        .depends_on(&[DB_SERVICE, DB_SECRET])
        .with_ready_postcondition(),
        ResourceNode::new(
            WEB_SERVICE,
            ResourceKind::Service,
            resources::WEB_SERVICE_SUFFIX,
            service::desired_web_service,
            service::matches_web_service,
        )
        .depends_on(&[WEB_DEPLOYMENT])
        .with_ready_postcondition(),
        ResourceNode::new(
            WEB_INGRESS,
            ResourceKind::Ingress,
            resources::WEB_INGRESS_SUFFIX,
            ingress::desired_web_ingress,
            ingress::matches_web_ingress,
        )
        .depends_on(&[WEB_SERVICE])
        .with_ready_postcondition()
        .with_activation(ingress::web_ingress_active),
        ResourceNode::new(
            WEB_INGRESS_SECURE,
            ResourceKind::Ingress,
            resources::WEB_INGRESS_SECURE_SUFFIX,
            ingress::desired_web_ingress_secure,
            ingress::matches_web_ingress_secure,
        )
        .depends_on(&[WEB_SERVICE])
        .with_ready_postcondition()
        .with_activation(ingress::web_ingress_secure_active),
    ]
}

/// Build and validate the Windup workflow graph.
pub fn windup_workflow() -> OperatorResult<DependencyGraph> {
    DependencyGraph::new(windup_nodes())
}
