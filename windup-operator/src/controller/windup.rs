//! Windup controller.
//!
//! Drives one Windup instance through the dependent-resource workflow and
//! reflects the outcome in its status conditions.

use super::conditions::{
    CONDITION_PROGRESSING, CONDITION_READY, REASON_FAILED, REASON_INVALID_SPEC, REASON_READY,
    REASON_RECONCILING, REASON_WAITING, upsert_condition,
};
use super::{ControllerContext, ReconcileAction};
use crate::context::SharedContext;
use crate::crd::{ConditionStatus, SecretKeyRef, Windup, WindupSpec, WindupStatus};
use crate::error::{OperatorError, OperatorResult};
use crate::resources::ingress::exposed_url;
use crate::workflow::{NodeState, WEB_INGRESS, WEB_INGRESS_SECURE, WorkflowResult};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;

/// Controller for Windup resources.
#[derive(Clone)]
pub struct WindupController {
    ctx: Arc<ControllerContext>,
}

impl WindupController {
    /// Create a new Windup controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile a Windup resource.
    ///
    /// 1. Validates the spec
    /// 2. Runs the workflow over every managed resource
    /// 3. Records Ready/Progressing conditions
    ///
    /// Returns `Done` once everything is ready, a short requeue while
    /// resources are still coming up, and the first node error otherwise.
    pub async fn reconcile(&self, windup: Arc<Windup>) -> OperatorResult<ReconcileAction> {
        let name = windup.name_any();
        let namespace = windup
            .namespace()
            .ok_or_else(|| OperatorError::InvalidConfig("Windup must be namespaced".into()))?;

        tracing::info!(
            name = %name,
            namespace = %namespace,
            executors = windup.spec.executor_instances,
            "Reconciling Windup"
        );

        if let Err(e) = validate_spec(&windup.spec) {
            tracing::warn!(name = %name, error = %e, "Invalid Windup spec");
            self.record_failure(&windup, REASON_INVALID_SPEC, &e).await;
            return Err(e);
        }

        let shared = Arc::new(SharedContext::new(&windup, Arc::clone(&self.ctx.config))?);
        let result = self
            .ctx
            .orchestrator
            .reconcile(Arc::clone(&windup), shared)
            .await;

        if let Some(e) = result.error() {
            tracing::warn!(name = %name, error = %e, "Windup reconciliation failed");
            self.record_failure(&windup, REASON_FAILED, &e).await;
            return Err(e);
        }

        if result.all_ready() {
            let url = exposed_url_of(&windup.spec, &result);
            let message = match url.as_deref() {
                Some(url) => format!("Windup is ready at {}", url),
                None => "Windup is ready".to_string(),
            };
            match url.as_deref() {
                Some(url) => {
                    tracing::info!(name = %name, url = %url, "App is exposed and ready to be used")
                }
                None => tracing::info!(name = %name, "App is ready"),
            }

            let mut status = self.base_status(&windup);
            upsert_condition(
                &mut status.conditions,
                CONDITION_READY,
                ConditionStatus::True,
                REASON_READY,
                message,
                &now(),
            );
            upsert_condition(
                &mut status.conditions,
                CONDITION_PROGRESSING,
                ConditionStatus::False,
                REASON_READY,
                "All resources are ready",
                &now(),
            );
            status.url = url;
            self.update_status(&windup, &status).await?;
            return Ok(ReconcileAction::Done);
        }

        let pending: Vec<String> = result
            .pending()
            .map(|r| match &r.state {
                NodeState::Waiting(dep) => format!("{} (waiting for {})", r.id, dep),
                _ => r.id.to_string(),
            })
            .collect();
        let delay = self.ctx.config.requeue_delay;
        tracing::info!(
            name = %name,
            pending = ?pending,
            "App is not ready yet, rescheduling reconciliation after {}s",
            delay.as_secs()
        );

        let mut status = self.base_status(&windup);
        upsert_condition(
            &mut status.conditions,
            CONDITION_READY,
            ConditionStatus::False,
            REASON_WAITING,
            format!("Waiting for: {}", pending.join(", ")),
            &now(),
        );
        upsert_condition(
            &mut status.conditions,
            CONDITION_PROGRESSING,
            ConditionStatus::True,
            REASON_RECONCILING,
            "Resources are being applied",
            &now(),
        );
        self.update_status(&windup, &status).await?;

        Ok(ReconcileAction::Requeue(delay))
    }

    /// Existing status carrying the generation this pass observed.
    fn base_status(&self, windup: &Windup) -> WindupStatus {
        let mut status = windup.status.clone().unwrap_or_default();
        status.observed_generation = windup.metadata.generation;
        status
    }

    /// Record a failure. A status write error is logged, not returned, so the
    /// original error reaches the error policy.
    async fn record_failure(&self, windup: &Windup, reason: &str, error: &OperatorError) {
        let mut status = self.base_status(windup);
        upsert_condition(
            &mut status.conditions,
            CONDITION_READY,
            ConditionStatus::False,
            reason,
            error.to_string(),
            &now(),
        );
        upsert_condition(
            &mut status.conditions,
            CONDITION_PROGRESSING,
            ConditionStatus::False,
            reason,
            "Reconciliation stopped on error",
            &now(),
        );

        if let Err(e) = self.update_status(windup, &status).await {
            tracing::warn!(name = %windup.name_any(), error = %e, "Failed to record failure status");
        }
    }

    /// Patch the status unless it already says the same thing.
    ///
    /// `lastUpdated` only moves with a real change: a status write is a watch
    /// event of its own.
    async fn update_status(&self, windup: &Windup, status: &WindupStatus) -> OperatorResult<()> {
        if windup
            .status
            .as_ref()
            .is_some_and(|current| same_status(current, status))
        {
            tracing::debug!(name = %windup.name_any(), "Status unchanged, skipping write");
            return Ok(());
        }

        let mut status = status.clone();
        status.last_updated = Some(now());
        self.ctx.store.patch_status(windup, &status).await
    }
}

fn same_status(current: &WindupStatus, next: &WindupStatus) -> bool {
    let strip = |s: &WindupStatus| WindupStatus {
        last_updated: None,
        ..s.clone()
    };
    strip(current) == strip(next)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// URL of whichever ingress variant is active and ready.
fn exposed_url_of(spec: &WindupSpec, result: &WorkflowResult) -> Option<String> {
    [WEB_INGRESS, WEB_INGRESS_SECURE]
        .into_iter()
        .filter_map(|id| result.report(id))
        .filter(|r| r.state == NodeState::Ready)
        .find_map(|r| {
            r.resource
                .as_ref()
                .and_then(|res| res.as_ingress())
                .and_then(|ingress| exposed_url(spec, ingress))
        })
}

/// Reject specs that enable a feature without the settings it needs.
pub fn validate_spec(spec: &WindupSpec) -> OperatorResult<()> {
    if spec.executor_instances < 0 {
        return Err(OperatorError::ValidationError(
            "executorInstances must not be negative".into(),
        ));
    }

    if spec.data_size.trim().is_empty() {
        return Err(OperatorError::ValidationError(
            "dataSize must not be empty".into(),
        ));
    }

    if let Some(oidc) = spec.oidc.as_ref().filter(|o| o.enabled) {
        if oidc.server_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
            return Err(OperatorError::ValidationError(
                "oidc.serverUrl is required when OIDC is enabled".into(),
            ));
        }
    }

    let references: [(&str, Option<&SecretKeyRef>); 4] = [
        (
            "db.usernameSecret",
            spec.database.as_ref().and_then(|d| d.username_secret.as_ref()),
        ),
        (
            "db.passwordSecret",
            spec.database.as_ref().and_then(|d| d.password_secret.as_ref()),
        ),
        (
            "oidc.credentialsSecret",
            spec.oidc.as_ref().and_then(|o| o.credentials_secret.as_ref()),
        ),
        (
            "basicAuth.sessionEncryptionKeySecret",
            spec.basic_auth
                .as_ref()
                .and_then(|b| b.session_encryption_key_secret.as_ref()),
        ),
    ];
    for (field, reference) in references {
        if let Some(reference) = reference {
            if reference.name.trim().is_empty() || reference.key.trim().is_empty() {
                return Err(OperatorError::ValidationError(format!(
                    "{} needs both a name and a key",
                    field
                )));
            }
        }
    }

    if spec.image_pull_secrets.iter().any(|s| s.name.trim().is_empty()) {
        return Err(OperatorError::ValidationError(
            "imagePullSecrets entries need a name".into(),
        ));
    }

    Ok(())
}

/// Handle errors during reconciliation.
pub fn error_policy(
    windup: Arc<Windup>,
    error: &OperatorError,
    ctx: Arc<ControllerContext>,
) -> Action {
    tracing::error!(
        name = %windup.name_any(),
        error = %error,
        transient = error.is_transient(),
        "Reconciliation error"
    );
    Action::requeue(ctx.config.error_requeue_delay)
}
