//! In-memory [`ResourceStore`] with resource versions and failure injection.

use super::ResourceStore;
use crate::crd::{Windup, WindupStatus};
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{ManagedResource, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::PersistentVolumeClaimStatus;
use k8s_openapi::api::networking::v1::{
    IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

type ObjectKey = (ResourceKind, String, String);

/// Kind of write recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Apply,
    Delete,
}

/// One successful write, in the order the store accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub op: WriteOp,
    pub kind: ResourceKind,
    pub name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, ManagedResource>,
    statuses: BTreeMap<(String, String), WindupStatus>,
    failures: HashMap<(ResourceKind, String), String>,
    conflicts: HashMap<(ResourceKind, String), usize>,
    writes: Vec<StoreWrite>,
    status_writes: usize,
    next_version: u64,
}

impl State {
    fn bump(&mut self, resource: &mut ManagedResource) {
        self.next_version += 1;
        resource.set_resource_version(Some(self.next_version.to_string()));
    }

    fn check_injected(&mut self, kind: ResourceKind, name: &str) -> OperatorResult<()> {
        let key = (kind, name.to_string());
        if let Some(message) = self.failures.get(&key) {
            return Err(OperatorError::ReconcileError {
                kind: kind.to_string(),
                name: name.to_string(),
                cause: message.clone(),
            });
        }
        if let Some(remaining) = self.conflicts.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(OperatorError::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: "the object has been modified".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory store.
///
/// Mirrors the API server rules the reconciler relies on: every write bumps
/// the resource version, conditional writes with a stale version conflict, and
/// applies keep fields owned by the cluster (status, assigned cluster IP).
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create or apply of `kind/name` fail with `message`.
    pub fn fail_writes(&self, kind: ResourceKind, name: &str, message: &str) {
        self.state
            .lock()
            .failures
            .insert((kind, name.to_string()), message.to_string());
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.conflicts.clear();
    }

    /// Make the next `count` writes of `kind/name` fail with a conflict.
    pub fn conflict_next_writes(&self, kind: ResourceKind, name: &str, count: usize) {
        self.state
            .lock()
            .conflicts
            .insert((kind, name.to_string()), count);
    }

    /// Store an object directly, as another client would.
    pub fn insert(&self, resource: ManagedResource) -> ManagedResource {
        let mut state = self.state.lock();
        let mut resource = resource;
        state.bump(&mut resource);
        let key = key_of(&resource);
        state.objects.insert(key, resource.clone());
        resource
    }

    /// Read an object without going through the trait.
    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ManagedResource> {
        self.state
            .lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutate a stored object in place, as another client would. Bumps the
    /// resource version. Returns false when the object does not exist.
    pub fn modify<F>(&self, kind: ResourceKind, namespace: &str, name: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut ManagedResource),
    {
        let mut state = self.state.lock();
        let key = (kind, namespace.to_string(), name.to_string());
        let Some(mut resource) = state.objects.get(&key).cloned() else {
            return false;
        };
        mutate(&mut resource);
        state.bump(&mut resource);
        state.objects.insert(key, resource);
        true
    }

    /// Simulate the cluster catching up on one object: deployments report
    /// all replicas ready, claims bind, services get a cluster IP and
    /// ingresses get a load-balancer address.
    pub fn mark_ready(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.modify(kind, namespace, name, make_ready)
    }

    /// Simulate the cluster catching up on every object in `namespace`.
    pub fn mark_all_ready(&self, namespace: &str) {
        let keys: Vec<ObjectKey> = self
            .state
            .lock()
            .objects
            .keys()
            .filter(|(_, ns, _)| ns == namespace)
            .cloned()
            .collect();
        for (kind, ns, name) in keys {
            self.mark_ready(kind, &ns, &name);
        }
    }

    /// Successful writes so far, in order.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Number of status patches accepted so far.
    pub fn status_writes(&self) -> usize {
        self.state.lock().status_writes
    }

    /// Last status written for an instance.
    pub fn status(&self, namespace: &str, name: &str) -> Option<WindupStatus> {
        self.state
            .lock()
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

fn key_of(resource: &ManagedResource) -> ObjectKey {
    (
        resource.kind(),
        resource.namespace().unwrap_or_default().to_string(),
        resource.name().to_string(),
    )
}

fn make_ready(resource: &mut ManagedResource) {
    match resource {
        ManagedResource::Secret(_) => {}
        ManagedResource::PersistentVolumeClaim(pvc) => {
            pvc.status = Some(PersistentVolumeClaimStatus {
                phase: Some("Bound".to_string()),
                ..Default::default()
            });
        }
        ManagedResource::Deployment(deployment) => {
            let replicas = deployment
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(1);
            deployment.status = Some(DeploymentStatus {
                replicas: Some(replicas),
                ready_replicas: Some(replicas),
                available_replicas: Some(replicas),
                ..Default::default()
            });
        }
        ManagedResource::Service(service) => {
            if let Some(spec) = service.spec.as_mut() {
                spec.cluster_ip.get_or_insert_with(|| "10.96.0.10".to_string());
            }
        }
        ManagedResource::Ingress(ingress) => {
            ingress.status = Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![IngressLoadBalancerIngress {
                        ip: Some("192.0.2.10".to_string()),
                        ..Default::default()
                    }]),
                }),
            });
        }
    }
}

/// Carry cluster-owned fields from the stored object into an applied one.
fn preserve_cluster_fields(stored: &ManagedResource, applied: &mut ManagedResource) {
    match (stored, applied) {
        (ManagedResource::PersistentVolumeClaim(old), ManagedResource::PersistentVolumeClaim(new)) => {
            new.status = old.status.clone();
        }
        (ManagedResource::Deployment(old), ManagedResource::Deployment(new)) => {
            new.status = old.status.clone();
        }
        (ManagedResource::Service(old), ManagedResource::Service(new)) => {
            new.status = old.status.clone();
            let assigned = old.spec.as_ref().and_then(|s| s.cluster_ip.clone());
            if let Some(spec) = new.spec.as_mut() {
                if spec.cluster_ip.is_none() {
                    spec.cluster_ip = assigned;
                }
            }
        }
        (ManagedResource::Ingress(old), ManagedResource::Ingress(new)) => {
            new.status = old.status.clone();
        }
        _ => {}
    }
}

fn missing_namespace(resource: &ManagedResource) -> OperatorError {
    OperatorError::InvalidConfig(format!("{} {} has no namespace", resource.kind(), resource.name()))
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<ManagedResource>> {
        Ok(self.object(kind, namespace, name))
    }

    async fn create(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource> {
        if desired.namespace().is_none() {
            return Err(missing_namespace(desired));
        }
        let mut state = self.state.lock();
        state.check_injected(desired.kind(), desired.name())?;

        let key = key_of(desired);
        if state.objects.contains_key(&key) {
            return Err(OperatorError::Conflict {
                kind: desired.kind().to_string(),
                name: desired.name().to_string(),
                message: "already exists".to_string(),
            });
        }

        let mut created = desired.clone();
        state.bump(&mut created);
        state.objects.insert(key, created.clone());
        state.writes.push(StoreWrite {
            op: WriteOp::Create,
            kind: desired.kind(),
            name: desired.name().to_string(),
        });
        Ok(created)
    }

    async fn apply(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource> {
        if desired.namespace().is_none() {
            return Err(missing_namespace(desired));
        }
        let mut state = self.state.lock();
        state.check_injected(desired.kind(), desired.name())?;

        let key = key_of(desired);
        let stored = state.objects.get(&key).cloned();
        if let (Some(expected), Some(stored)) = (desired.resource_version(), stored.as_ref()) {
            if stored.resource_version() != Some(expected) {
                return Err(OperatorError::Conflict {
                    kind: desired.kind().to_string(),
                    name: desired.name().to_string(),
                    message: format!(
                        "resourceVersion {} does not match {}",
                        expected,
                        stored.resource_version().unwrap_or_default()
                    ),
                });
            }
        }

        let mut applied = desired.clone();
        if let Some(stored) = stored.as_ref() {
            preserve_cluster_fields(stored, &mut applied);
        }
        state.bump(&mut applied);
        state.objects.insert(key, applied.clone());
        state.writes.push(StoreWrite {
            op: WriteOp::Apply,
            kind: desired.kind(),
            name: desired.name().to_string(),
        });
        Ok(applied)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> OperatorResult<()> {
        let mut state = self.state.lock();
        let removed = state
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()));
        if removed.is_some() {
            state.writes.push(StoreWrite {
                op: WriteOp::Delete,
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn patch_status(&self, instance: &Windup, status: &WindupStatus) -> OperatorResult<()> {
        let namespace = instance.namespace().unwrap_or_default();
        let mut state = self.state.lock();
        state.status_writes += 1;
        state
            .statuses
            .insert((namespace, instance.name_any()), status.clone());
        Ok(())
    }
}
