//! Kubernetes API implementation of [`ResourceStore`].

use super::ResourceStore;
use crate::crd::{Windup, WindupStatus};
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{ManagedResource, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    /// Create a store writing with the given server-side apply field manager.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> OperatorResult<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    /// Create through server-side apply rather than a POST.
    ///
    /// A POST records its fields under an Update entry that later applies do
    /// not own, so fields dropped from the desired object would never be
    /// pruned.
    async fn create_typed<K>(&self, object: &K) -> OperatorResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        self.apply_typed(object).await
    }

    /// Server-side apply. A resourceVersion in `object` turns the apply into a
    /// conditional write.
    async fn apply_typed<K>(&self, object: &K) -> OperatorResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let namespace = namespace_of(object)?;
        let name = object.name_any();
        self.api::<K>(&namespace)
            .patch(&name, &apply_params(&self.field_manager), &Patch::Apply(object))
            .await
            .map_err(|e| write_error(e, K::kind(&()).as_ref(), &name))
    }

    async fn delete_typed<K>(&self, namespace: &str, name: &str) -> OperatorResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn namespace_of<K: Resource>(object: &K) -> OperatorResult<String> {
    object.namespace().ok_or_else(|| {
        OperatorError::InvalidConfig(format!("{} has no namespace", object.name_any()))
    })
}

/// Every create and update goes through this one field manager.
fn apply_params(field_manager: &str) -> PatchParams {
    PatchParams::apply(field_manager).force()
}

/// Map a write failure, turning 409 into a conflict.
fn write_error(err: kube::Error, kind: &str, name: &str) -> OperatorError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => OperatorError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            message: resp.message,
        },
        other => other.into(),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<ManagedResource>> {
        Ok(match kind {
            ResourceKind::Secret => self
                .get_typed::<Secret>(namespace, name)
                .await?
                .map(Into::into),
            ResourceKind::PersistentVolumeClaim => self
                .get_typed::<PersistentVolumeClaim>(namespace, name)
                .await?
                .map(Into::into),
            ResourceKind::Deployment => self
                .get_typed::<Deployment>(namespace, name)
                .await?
                .map(Into::into),
            ResourceKind::Service => self
                .get_typed::<Service>(namespace, name)
                .await?
                .map(Into::into),
            ResourceKind::Ingress => self
                .get_typed::<Ingress>(namespace, name)
                .await?
                .map(Into::into),
        })
    }

    async fn create(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource> {
        Ok(match desired {
            ManagedResource::Secret(r) => self.create_typed(r).await?.into(),
            ManagedResource::PersistentVolumeClaim(r) => self.create_typed(r).await?.into(),
            ManagedResource::Deployment(r) => self.create_typed(r).await?.into(),
            ManagedResource::Service(r) => self.create_typed(r).await?.into(),
            ManagedResource::Ingress(r) => self.create_typed(r).await?.into(),
        })
    }

    async fn apply(&self, desired: &ManagedResource) -> OperatorResult<ManagedResource> {
        Ok(match desired {
            ManagedResource::Secret(r) => self.apply_typed(r).await?.into(),
            ManagedResource::PersistentVolumeClaim(r) => self.apply_typed(r).await?.into(),
            ManagedResource::Deployment(r) => self.apply_typed(r).await?.into(),
            ManagedResource::Service(r) => self.apply_typed(r).await?.into(),
            ManagedResource::Ingress(r) => self.apply_typed(r).await?.into(),
        })
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> OperatorResult<()> {
        match kind {
            ResourceKind::Secret => self.delete_typed::<Secret>(namespace, name).await,
            ResourceKind::PersistentVolumeClaim => {
                self.delete_typed::<PersistentVolumeClaim>(namespace, name)
                    .await
            }
            ResourceKind::Deployment => self.delete_typed::<Deployment>(namespace, name).await,
            ResourceKind::Service => self.delete_typed::<Service>(namespace, name).await,
            ResourceKind::Ingress => self.delete_typed::<Ingress>(namespace, name).await,
        }
    }

    async fn patch_status(&self, instance: &Windup, status: &WindupStatus) -> OperatorResult<()> {
        let namespace = namespace_of(instance)?;
        let windups: Api<Windup> = Api::namespaced(self.client.clone(), &namespace);

        windups
            .patch_status(
                &instance.name_any(),
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await?;

        Ok(())
    }
}
