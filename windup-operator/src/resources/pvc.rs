//! Persistent volume claims for the database and the reports volume.

use super::{
    COMPONENT_DATABASE, COMPONENT_WEB, DB_PVC_SUFFIX, ManagedResource, WEB_PVC_SUFFIX, has_name,
    object_meta,
};
use crate::context::SharedContext;
use crate::crd::Windup;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Size of the database claim when `db.size` is not set.
pub const DEFAULT_DB_SIZE: &str = "1G";

fn claim(ctx: &SharedContext, suffix: &str, component: &str, size: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: object_meta(ctx, suffix, component),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn requested_storage(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.as_str())
}

fn db_size(cr: &Windup) -> String {
    cr.spec
        .database
        .as_ref()
        .and_then(|db| db.size.clone())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DB_SIZE.to_string())
}

fn claim_matches(
    observed: &ManagedResource,
    ctx: &SharedContext,
    suffix: &str,
    component: &str,
    size: &str,
) -> bool {
    let Some(pvc) = observed.as_pvc() else {
        return false;
    };
    has_name(observed, ctx, suffix)
        && observed.has_labels(&ctx.component_labels(component))
        && requested_storage(pvc) == Some(size)
}

/// Database storage, sized by `db.size`.
pub fn desired_db_pvc(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    claim(ctx, DB_PVC_SUFFIX, COMPONENT_DATABASE, &db_size(cr)).into()
}

pub fn matches_db_pvc(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    claim_matches(observed, ctx, DB_PVC_SUFFIX, COMPONENT_DATABASE, &db_size(cr))
}

/// Reports storage, sized by `dataSize`.
pub fn desired_web_pvc(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    claim(ctx, WEB_PVC_SUFFIX, COMPONENT_WEB, &cr.spec.data_size).into()
}

pub fn matches_web_pvc(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    claim_matches(observed, ctx, WEB_PVC_SUFFIX, COMPONENT_WEB, &cr.spec.data_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DatabaseSpec, WindupSpec};
    use crate::resources::test_support::{context, windup};

    #[test]
    fn sizes_follow_spec_with_defaults() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);

        let db = desired_db_pvc(&cr, &ctx);
        let web = desired_web_pvc(&cr, &ctx);

        assert_eq!(db.name(), "demo-postgresql-pvc");
        assert_eq!(requested_storage(db.as_pvc().expect("pvc")), Some("1G"));
        assert_eq!(web.name(), "demo-web-pvc");
        assert_eq!(requested_storage(web.as_pvc().expect("pvc")), Some("1G"));
    }

    #[test]
    fn resized_claim_no_longer_matches() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let observed = desired_db_pvc(&cr, &ctx);
        assert!(matches_db_pvc(&observed, &cr, &ctx));

        let grown = windup(WindupSpec {
            database: Some(DatabaseSpec {
                size: Some("10Gi".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(!matches_db_pvc(&observed, &grown, &context(&grown)));
    }

    #[test]
    fn status_written_by_the_cluster_is_ignored() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let mut observed = desired_web_pvc(&cr, &ctx);
        if let ManagedResource::PersistentVolumeClaim(pvc) = &mut observed {
            pvc.status = Some(k8s_openapi::api::core::v1::PersistentVolumeClaimStatus {
                phase: Some("Bound".into()),
                ..Default::default()
            });
            if let Some(spec) = pvc.spec.as_mut() {
                spec.volume_name = Some("pv-0001".into());
                spec.storage_class_name = Some("standard".into());
            }
        }
        assert!(matches_web_pvc(&observed, &cr, &ctx));
    }
}
