//! Common test utilities for windup-operator tests.

#![allow(dead_code)]

use std::sync::Arc;
use windup_operator::config::OperatorConfig;
use windup_operator::context::SharedContext;
use windup_operator::controller::{ControllerContext, ReconcileAction, WindupController};
use windup_operator::crd::{Windup, WindupSpec};
use windup_operator::error::OperatorResult;
use windup_operator::resources::ResourceKind;
use windup_operator::store::{MemoryStore, ResourceStore};
use windup_operator::workflow::WorkflowResult;

pub const NAMESPACE: &str = "apps";
pub const NAME: &str = "demo";

/// Upper bound on passes needed to bring a fresh instance up.
pub const MAX_PASSES: usize = 10;

/// Build a Windup instance as the API server would hand it out.
pub fn windup(spec: WindupSpec) -> Windup {
    let mut cr = Windup::new(NAME, spec);
    cr.metadata.namespace = Some(NAMESPACE.to_string());
    cr.metadata.uid = Some("5d1c2a7e-0000-4000-8000-000000000001".to_string());
    cr.metadata.generation = Some(1);
    cr
}

/// One Windup instance reconciled against an in-memory store.
pub struct TestOperator {
    pub store: Arc<MemoryStore>,
    pub ctx: Arc<ControllerContext>,
    pub windup: Arc<Windup>,
}

impl TestOperator {
    pub fn new(spec: WindupSpec) -> Self {
        Self::with_config(spec, OperatorConfig::default())
    }

    pub fn with_config(spec: WindupSpec, config: OperatorConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let ctx = ControllerContext::new(
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            Arc::new(config),
        )
        .expect("windup workflow is valid");

        Self {
            store,
            ctx: Arc::new(ctx),
            windup: Arc::new(windup(spec)),
        }
    }

    /// Replace the spec, as a user editing the resource would.
    pub fn update_spec(&mut self, spec: WindupSpec) {
        let mut cr = (*self.windup).clone();
        cr.spec = spec;
        cr.metadata.generation = cr.metadata.generation.map(|g| g + 1);
        self.windup = Arc::new(cr);
    }

    /// Copy the last written status into the instance, as the next watch
    /// event would deliver it.
    pub fn sync_status(&mut self) {
        let mut cr = (*self.windup).clone();
        cr.status = self.store.status(NAMESPACE, NAME);
        self.windup = Arc::new(cr);
    }

    /// Run one workflow pass.
    pub async fn pass(&self) -> WorkflowResult {
        let shared = SharedContext::new(&self.windup, Arc::clone(&self.ctx.config))
            .expect("namespaced instance");
        self.ctx
            .orchestrator
            .reconcile(Arc::clone(&self.windup), Arc::new(shared))
            .await
    }

    /// Run one full controller reconcile, status included.
    pub async fn reconcile(&self) -> OperatorResult<ReconcileAction> {
        WindupController::new(Arc::clone(&self.ctx))
            .reconcile(Arc::clone(&self.windup))
            .await
    }

    /// Alternate passes with the cluster catching up until everything is ready.
    pub async fn converge(&self) -> WorkflowResult {
        for _ in 0..MAX_PASSES {
            let result = self.pass().await;
            if result.all_ready() {
                return result;
            }
            self.store.mark_all_ready(NAMESPACE);
        }
        panic!("instance did not become ready in {} passes", MAX_PASSES);
    }

    pub fn object_exists(&self, kind: ResourceKind, name: &str) -> bool {
        self.store.object(kind, NAMESPACE, name).is_some()
    }
}
