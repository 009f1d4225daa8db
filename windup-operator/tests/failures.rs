//! Failure handling, conflicts and deactivated resources.

mod common;

use common::{NAMESPACE, TestOperator, windup};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;
use std::sync::Arc;
use windup_operator::OperatorError;
use windup_operator::config::OperatorConfig;
use windup_operator::context::SharedContext;
use windup_operator::controller::{ControllerContext, ReconcileAction, WindupController};
use windup_operator::controller::conditions::{
    CONDITION_READY, REASON_FAILED, REASON_INVALID_SPEC, find_condition,
};
use windup_operator::crd::{ConditionStatus, HttpSpec, OidcSpec, Windup, WindupSpec};
use windup_operator::resources::{DB_SECRET_SUFFIX, ManagedResource, ResourceKind, secret};
use windup_operator::store::{MemoryStore, ResourceStore};
use windup_operator::workflow::{
    ApplyOutcome, DB_DEPLOYMENT, DB_SERVICE, DependencyGraph, EXECUTOR_DEPLOYMENT, NodeId,
    NodeState, ResourceNode, WEB_DEPLOYMENT, WEB_INGRESS, WEB_INGRESS_SECURE, WEB_PVC,
    WEB_SERVICE,
};

fn tls_spec() -> WindupSpec {
    WindupSpec {
        http: Some(HttpSpec {
            tls_secret: Some("windup-tls".to_string()),
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn failed_database_blocks_dependents_but_not_siblings() {
    let op = TestOperator::new(WindupSpec::default());
    op.store
        .fail_writes(ResourceKind::Deployment, "demo-postgresql", "exceeded quota");

    let result = op.pass().await;

    assert!(matches!(result.state(DB_DEPLOYMENT), Some(NodeState::Failed(_))));
    for blocked in [DB_SERVICE, WEB_DEPLOYMENT, EXECUTOR_DEPLOYMENT, WEB_SERVICE, WEB_INGRESS] {
        assert_eq!(
            result.state(blocked),
            Some(&NodeState::Blocked(DB_DEPLOYMENT)),
            "{}",
            blocked
        );
    }
    assert_eq!(result.outcome(WEB_PVC), Some(ApplyOutcome::Created));
    assert!(op.object_exists(ResourceKind::PersistentVolumeClaim, "demo-web-pvc"));

    let error = result.error().expect("pass failed");
    assert!(error.to_string().contains("demo-postgresql"));
    assert!(error.to_string().contains("exceeded quota"));
    assert!(error.is_transient());
}

#[tokio::test]
async fn failure_is_reported_in_status_and_recovers() {
    let op = TestOperator::new(WindupSpec::default());
    op.store
        .fail_writes(ResourceKind::Deployment, "demo-postgresql", "exceeded quota");

    let err = op.reconcile().await.expect_err("database deployment fails");
    assert!(matches!(err, OperatorError::ReconcileError { .. }));

    let status = op.store.status(NAMESPACE, "demo").expect("status written");
    let ready = find_condition(&status.conditions, CONDITION_READY).expect("ready condition");
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason.as_deref(), Some(REASON_FAILED));
    assert!(ready.message.as_deref().unwrap_or_default().contains("exceeded quota"));

    op.store.clear_failures();
    let result = op.converge().await;
    assert!(result.all_ready());
    assert_eq!(op.reconcile().await.expect("ready"), ReconcileAction::Done);
}

#[tokio::test]
async fn conflict_fails_the_node_until_the_next_pass() {
    let mut op = TestOperator::new(WindupSpec::default());
    op.converge().await;

    op.update_spec(WindupSpec {
        executor_instances: 2,
        ..Default::default()
    });
    op.store
        .conflict_next_writes(ResourceKind::Deployment, "demo-executor", 1);

    let result = op.pass().await;
    assert!(matches!(
        result.state(EXECUTOR_DEPLOYMENT),
        Some(NodeState::Failed(_))
    ));
    assert_eq!(result.outcome(WEB_DEPLOYMENT), Some(ApplyOutcome::Unchanged));
    assert!(result.error().is_some_and(|e| e.is_transient()));

    let result = op.pass().await;
    assert_eq!(
        result.outcome(EXECUTOR_DEPLOYMENT),
        Some(ApplyOutcome::Updated)
    );
    assert!(!result.has_failures());
}

#[tokio::test]
async fn enabling_tls_swaps_the_ingress_variant() {
    let mut op = TestOperator::new(WindupSpec::default());
    op.converge().await;
    assert!(op.object_exists(ResourceKind::Ingress, "demo-web-ingress"));

    op.update_spec(tls_spec());
    let result = op.pass().await;

    assert_eq!(result.outcome(WEB_INGRESS), Some(ApplyOutcome::Deleted));
    assert_eq!(result.state(WEB_INGRESS), Some(&NodeState::Inactive));
    assert_eq!(result.outcome(WEB_DEPLOYMENT), Some(ApplyOutcome::Updated));
    assert_eq!(result.outcome(WEB_SERVICE), Some(ApplyOutcome::Updated));
    assert_eq!(
        result.outcome(WEB_INGRESS_SECURE),
        Some(ApplyOutcome::Created)
    );
    assert!(!op.object_exists(ResourceKind::Ingress, "demo-web-ingress"));

    op.store.mark_all_ready(NAMESPACE);
    assert_eq!(op.reconcile().await.expect("ready"), ReconcileAction::Done);
    let status = op.store.status(NAMESPACE, "demo").expect("status written");
    assert_eq!(status.url.as_deref(), Some("https://192.0.2.10"));
}

#[tokio::test]
async fn unmanaged_objects_are_not_deleted() {
    let op = TestOperator::new(WindupSpec::default());
    op.store.insert(ManagedResource::from(Ingress {
        metadata: ObjectMeta {
            name: Some("demo-web-ingress-secure".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }));

    let result = op.pass().await;

    assert_eq!(
        result.outcome(WEB_INGRESS_SECURE),
        Some(ApplyOutcome::Absent)
    );
    assert!(op.object_exists(ResourceKind::Ingress, "demo-web-ingress-secure"));
}

#[tokio::test]
async fn invalid_spec_writes_nothing() {
    let op = TestOperator::new(WindupSpec {
        oidc: Some(OidcSpec {
            enabled: true,
            ..Default::default()
        }),
        ..Default::default()
    });

    let err = op.reconcile().await.expect_err("spec is invalid");
    assert!(matches!(err, OperatorError::ValidationError(_)));
    assert!(!err.is_transient());
    assert!(op.store.is_empty());

    let status = op.store.status(NAMESPACE, "demo").expect("status written");
    let ready = find_condition(&status.conditions, CONDITION_READY).expect("ready condition");
    assert_eq!(ready.reason.as_deref(), Some(REASON_INVALID_SPEC));
}

#[tokio::test]
async fn disabling_tls_restores_the_plain_ingress() {
    let mut op = TestOperator::new(tls_spec());
    op.converge().await;
    assert!(op.object_exists(ResourceKind::Ingress, "demo-web-ingress-secure"));

    op.update_spec(WindupSpec::default());
    let result = op.pass().await;

    assert_eq!(
        result.outcome(WEB_INGRESS_SECURE),
        Some(ApplyOutcome::Deleted)
    );
    assert_eq!(result.outcome(WEB_DEPLOYMENT), Some(ApplyOutcome::Updated));
    assert_eq!(result.outcome(WEB_SERVICE), Some(ApplyOutcome::Updated));
    assert_eq!(result.outcome(WEB_INGRESS), Some(ApplyOutcome::Created));

    let web = op
        .store
        .object(ResourceKind::Deployment, NAMESPACE, "demo-web")
        .and_then(|r| r.as_deployment().cloned())
        .and_then(|d| d.spec)
        .and_then(|s| s.template.spec)
        .expect("web pod spec");
    let env = web.containers[0].env.clone().unwrap_or_default();
    assert!(!env.iter().any(|e| e.name.starts_with("QUARKUS_HTTP_SSL_")));
    assert!(
        web.volumes
            .unwrap_or_default()
            .iter()
            .all(|v| v.name != "windup-tls-certificates")
    );

    // Once the cluster catches up the plain shape is stable.
    op.store.mark_all_ready(NAMESPACE);
    let result = op.pass().await;
    assert!(result.all_ready());
    assert_eq!(result.changed().count(), 0);
}

const BROKEN: NodeId = NodeId::new("broken");
const AFTER_BROKEN: NodeId = NodeId::new("after-broken");

fn broken_builder(_cr: &Windup, _ctx: &SharedContext) -> ManagedResource {
    panic!("builder bug");
}

fn never_matches(_observed: &ManagedResource, _cr: &Windup, _ctx: &SharedContext) -> bool {
    false
}

#[tokio::test]
async fn panicking_builder_fails_its_node_only() {
    let graph = DependencyGraph::new(vec![
        ResourceNode::new(
            BROKEN,
            ResourceKind::Secret,
            "-broken",
            broken_builder,
            never_matches,
        ),
        ResourceNode::new(
            AFTER_BROKEN,
            ResourceKind::Secret,
            DB_SECRET_SUFFIX,
            secret::desired_db_secret,
            secret::matches_db_secret,
        )
        .depends_on(&[BROKEN]),
    ])
    .expect("valid graph");
    let store = Arc::new(MemoryStore::new());
    let ctx = Arc::new(ControllerContext::with_graph(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        Arc::new(OperatorConfig::default()),
        graph,
    ));
    let cr = Arc::new(windup(WindupSpec::default()));
    let shared = Arc::new(
        SharedContext::new(&cr, Arc::clone(&ctx.config)).expect("namespaced instance"),
    );

    let result = ctx.orchestrator.reconcile(Arc::clone(&cr), shared).await;

    let broken = result.report(BROKEN).expect("broken node reported");
    assert_eq!(broken.name, "demo-broken");
    assert!(matches!(broken.state, NodeState::Failed(_)));
    assert_eq!(
        result.state(AFTER_BROKEN),
        Some(&NodeState::Blocked(BROKEN))
    );
    assert!(store.is_empty());

    let err = WindupController::new(ctx)
        .reconcile(cr)
        .await
        .expect_err("node failure surfaces");
    assert!(err.to_string().contains("demo-broken"));
}
