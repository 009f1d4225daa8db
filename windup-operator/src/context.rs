//! Read-only data shared by every builder during one reconciliation pass.

use crate::config::OperatorConfig;
use crate::crd::Windup;
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label naming the instance.
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label naming the component within the instance.
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Label naming the managing controller.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label grouping every Windup-managed object.
pub const LABEL_CLUSTER: &str = "windup-operator/cluster";
/// Value of [`LABEL_MANAGED_BY`].
pub const MANAGER_NAME: &str = "windup-operator";

/// Per-pass context, built once and never mutated.
#[derive(Debug, Clone)]
pub struct SharedContext {
    /// Instance name.
    pub name: String,
    /// Instance namespace.
    pub namespace: String,
    /// Labels carried by every managed object.
    pub labels: BTreeMap<String, String>,
    /// Controller owner reference pointing at the instance.
    pub owner: Option<OwnerReference>,
    /// Process-wide configuration.
    pub config: Arc<OperatorConfig>,
}

impl SharedContext {
    /// Build the context for one instance.
    pub fn new(cr: &Windup, config: Arc<OperatorConfig>) -> OperatorResult<Self> {
        let name = cr.name_any();
        let namespace = cr.namespace().ok_or_else(|| {
            OperatorError::ValidationError(format!("Windup {} has no namespace", name))
        })?;

        let labels = BTreeMap::from([
            (LABEL_NAME.to_string(), name.clone()),
            (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
            (LABEL_CLUSTER.to_string(), "windup".to_string()),
        ]);

        Ok(Self {
            owner: cr.controller_owner_ref(&()),
            name,
            namespace,
            labels,
            config,
        })
    }

    /// Name of a managed object: `<instance>-<suffix>`.
    pub fn resource_name(&self, suffix: &str) -> String {
        resource_name(&self.name, suffix)
    }

    /// Labels for one component: the shared set plus the component label.
    pub fn component_labels(&self, component: &str) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert(LABEL_COMPONENT.to_string(), component.to_string());
        labels
    }

    /// Pod selector for one component.
    pub fn selector(&self, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_NAME.to_string(), self.name.clone()),
            (LABEL_COMPONENT.to_string(), component.to_string()),
        ])
    }
}

/// Derive a managed object name from the instance name and a fixed suffix.
pub fn resource_name(instance: &str, suffix: &str) -> String {
    format!("{}{}", instance, suffix)
}
