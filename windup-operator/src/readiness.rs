//! Readiness of observed resources.
//!
//! Pure functions of the latest snapshot. Waiting for a resource to become
//! ready is done by requeueing the pass, never by polling here.

use crate::resources::ManagedResource;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;

/// Whether an observed resource is functionally ready.
pub fn is_ready(observed: &ManagedResource) -> bool {
    match observed {
        ManagedResource::Secret(_) => true,
        ManagedResource::PersistentVolumeClaim(pvc) => pvc_ready(pvc),
        ManagedResource::Deployment(deployment) => deployment_ready(deployment),
        ManagedResource::Service(service) => service_ready(service),
        ManagedResource::Ingress(ingress) => ingress_ready(ingress),
    }
}

/// Ready replicas have caught up with the desired count.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready >= desired
}

/// A cluster address is assigned. `LoadBalancer` services also need an
/// external address.
pub fn service_ready(service: &Service) -> bool {
    let Some(spec) = service.spec.as_ref() else {
        return false;
    };

    if spec.type_.as_deref() == Some("LoadBalancer") {
        return service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| e.ip.is_some() || e.hostname.is_some())
            });
    }

    spec.cluster_ip
        .as_deref()
        .is_some_and(|ip| !ip.is_empty())
}

/// The ingress controller published an address.
pub fn ingress_ready(ingress: &Ingress) -> bool {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|entries| {
            entries.iter().any(|e| {
                e.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                    || e.hostname.as_deref().is_some_and(|h| !h.is_empty())
            })
        })
}

pub fn pvc_ready(pvc: &PersistentVolumeClaim) -> bool {
    pvc.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Bound")
}
