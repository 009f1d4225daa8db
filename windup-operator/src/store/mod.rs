//! Access to the resource store the operator reconciles against.
//!
//! [`KubeStore`] talks to the Kubernetes API. [`MemoryStore`] keeps objects
//! in memory with the same versioning rules and is used by the tests.

mod kube;
mod memory;

pub use self::kube::KubeStore;
pub use self::memory::{MemoryStore, StoreWrite, WriteOp};

use crate::crd::{Windup, WindupStatus};
use crate::error::OperatorResult;
use crate::resources::{ManagedResource, ResourceKind};
use async_trait::async_trait;

/// CRUD operations on managed resources plus the instance status.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an object. `None` when it does not exist.
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<ManagedResource>>;

    /// Create an object that does not exist yet, owned by the same field
    /// manager as later applies.
    async fn create(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource>;

    /// Apply the desired state to an existing object.
    ///
    /// When `desired` carries a resource version the write is conditional on
    /// it and fails with [`OperatorError::Conflict`](crate::OperatorError::Conflict)
    /// if the stored object has moved on.
    async fn apply(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> OperatorResult<()>;

    /// Replace the status of a Windup instance.
    async fn patch_status(&self, instance: &Windup, status: &WindupStatus) -> OperatorResult<()>;
}
