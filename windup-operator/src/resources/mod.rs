//! Desired-state builders and matchers for every managed resource.
//!
//! Each builder is a pure function of the Windup spec and the shared context.
//! Each matcher compares only the fields the operator owns, so that fields
//! written by the API server or other controllers never trigger an update.

pub mod deployment;
pub mod ingress;
pub mod pvc;
pub mod secret;
pub mod service;

use crate::context::SharedContext;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;

/// Suffix of the database credential secret.
pub const DB_SECRET_SUFFIX: &str = "-db-secret";
/// Suffix of the basic-auth session key secret.
pub const BASIC_AUTH_SECRET_SUFFIX: &str = "-basic-auth";
/// Suffix of the database volume claim.
pub const DB_PVC_SUFFIX: &str = "-postgresql-pvc";
/// Suffix of the reports volume claim.
pub const WEB_PVC_SUFFIX: &str = "-web-pvc";
/// Suffix of the database deployment.
pub const DB_DEPLOYMENT_SUFFIX: &str = "-postgresql";
/// Suffix of the database service.
pub const DB_SERVICE_SUFFIX: &str = "-postgresql";
/// Suffix of the web console deployment.
pub const WEB_DEPLOYMENT_SUFFIX: &str = "-web";
/// Suffix of the executor deployment.
pub const EXECUTOR_DEPLOYMENT_SUFFIX: &str = "-executor";
/// Suffix of the web console service.
pub const WEB_SERVICE_SUFFIX: &str = "-web";
/// Suffix of the plain ingress.
pub const WEB_INGRESS_SUFFIX: &str = "-web-ingress";
/// Suffix of the TLS ingress.
pub const WEB_INGRESS_SECURE_SUFFIX: &str = "-web-ingress-secure";

/// Component label of the database tier.
pub const COMPONENT_DATABASE: &str = "postgresql";
/// Component label of the web console.
pub const COMPONENT_WEB: &str = "web";
/// Component label of the executor.
pub const COMPONENT_EXECUTOR: &str = "executor";

/// Kubernetes kind of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Secret,
    PersistentVolumeClaim,
    Deployment,
    Service,
    Ingress,
}

impl ResourceKind {
    /// Kind name as used by the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired or observed managed object.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedResource {
    Secret(Secret),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Deployment(Deployment),
    Service(Service),
    Ingress(Ingress),
}

macro_rules! with_resource {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            ManagedResource::Secret($r) => $body,
            ManagedResource::PersistentVolumeClaim($r) => $body,
            ManagedResource::Deployment($r) => $body,
            ManagedResource::Service($r) => $body,
            ManagedResource::Ingress($r) => $body,
        }
    };
}

impl ManagedResource {
    /// Kind of the wrapped object.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedResource::Secret(_) => ResourceKind::Secret,
            ManagedResource::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            ManagedResource::Deployment(_) => ResourceKind::Deployment,
            ManagedResource::Service(_) => ResourceKind::Service,
            ManagedResource::Ingress(_) => ResourceKind::Ingress,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        with_resource!(self, r => &r.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        with_resource!(self, r => &mut r.metadata)
    }

    /// Object name, empty if unset.
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    /// Set the version a write is conditioned on.
    pub fn set_resource_version(&mut self, version: Option<String>) {
        self.metadata_mut().resource_version = version;
    }

    /// Whether the object carries every label in `expected`.
    pub fn has_labels(&self, expected: &BTreeMap<String, String>) -> bool {
        labels_include(self.metadata().labels.as_ref(), expected)
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            ManagedResource::Secret(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pvc(&self) -> Option<&PersistentVolumeClaim> {
        match self {
            ManagedResource::PersistentVolumeClaim(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            ManagedResource::Deployment(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            ManagedResource::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ingress(&self) -> Option<&Ingress> {
        match self {
            ManagedResource::Ingress(i) => Some(i),
            _ => None,
        }
    }
}

impl From<Secret> for ManagedResource {
    fn from(value: Secret) -> Self {
        ManagedResource::Secret(value)
    }
}

impl From<PersistentVolumeClaim> for ManagedResource {
    fn from(value: PersistentVolumeClaim) -> Self {
        ManagedResource::PersistentVolumeClaim(value)
    }
}

impl From<Deployment> for ManagedResource {
    fn from(value: Deployment) -> Self {
        ManagedResource::Deployment(value)
    }
}

impl From<Service> for ManagedResource {
    fn from(value: Service) -> Self {
        ManagedResource::Service(value)
    }
}

impl From<Ingress> for ManagedResource {
    fn from(value: Ingress) -> Self {
        ManagedResource::Ingress(value)
    }
}

/// Metadata shared by every managed object: name, namespace, labels, owner.
pub(crate) fn object_meta(ctx: &SharedContext, suffix: &str, component: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(ctx.resource_name(suffix)),
        namespace: Some(ctx.namespace.clone()),
        labels: Some(ctx.component_labels(component)),
        owner_references: ctx.owner.clone().map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// Whether the observed object has the derived name for `suffix`.
pub(crate) fn has_name(observed: &ManagedResource, ctx: &SharedContext, suffix: &str) -> bool {
    observed.name() == ctx.resource_name(suffix)
}

fn labels_include(
    actual: Option<&BTreeMap<String, String>>,
    expected: &BTreeMap<String, String>,
) -> bool {
    let empty = BTreeMap::new();
    let actual = actual.unwrap_or(&empty);
    expected.iter().all(|(k, v)| actual.get(k) == Some(v))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_subset_ignores_foreign_labels() {
        let mut secret = Secret::default();
        secret.metadata.labels = Some(BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("injected".to_string(), "x".to_string()),
        ]));
        let resource = ManagedResource::from(secret);

        let expected = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert!(resource.has_labels(&expected));

        let other = BTreeMap::from([("a".to_string(), "2".to_string())]);
        assert!(!resource.has_labels(&other));
    }

    #[test]
    fn resource_version_round_trips_through_metadata() {
        let mut resource = ManagedResource::from(Service::default());
        assert_eq!(resource.kind(), ResourceKind::Service);
        resource.set_resource_version(Some("42".into()));
        assert_eq!(resource.resource_version(), Some("42"));
    }
}
