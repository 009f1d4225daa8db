//! Workload deployments: database, web console and executor.

use super::secret::{DB_DATABASE_KEY, DB_PASSWORD_KEY, DB_USERNAME_KEY};
use super::{
    COMPONENT_DATABASE, COMPONENT_EXECUTOR, COMPONENT_WEB, DB_DEPLOYMENT_SUFFIX, DB_PVC_SUFFIX,
    DB_SECRET_SUFFIX, EXECUTOR_DEPLOYMENT_SUFFIX, ManagedResource, WEB_DEPLOYMENT_SUFFIX,
    WEB_PVC_SUFFIX, object_meta,
};
use crate::configurator::{DATABASE_PORT, DistConfigurator};
use crate::context::SharedContext;
use crate::crd::{ResourceLimits, SecretKeyRef, Windup};
use crate::options::OptionMapper;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ExecAction, HTTPGetAction, LocalObjectReference,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// HTTP port of the web console.
pub const WEB_HTTP_PORT: i32 = 8080;
/// HTTPS port of the web console, opened when TLS is configured.
pub const WEB_HTTPS_PORT: i32 = 8443;

const DB_DATA_VOLUME: &str = "windup-db-data";
const DB_DATA_PATH: &str = "/var/lib/pgsql/data";
const REPORTS_VOLUME: &str = "windup-reports";
const REPORTS_PATH: &str = "/opt/windup/data";

struct Workload<'a> {
    suffix: &'a str,
    component: &'a str,
    replicas: i32,
    strategy: Option<&'a str>,
    container: Container,
    volumes: Vec<Volume>,
}

fn deployment(cr: &Windup, ctx: &SharedContext, workload: Workload<'_>) -> Deployment {
    let image_pull_secrets: Vec<LocalObjectReference> = cr
        .spec
        .image_pull_secrets
        .iter()
        .map(|s| LocalObjectReference {
            name: s.name.clone().into(),
        })
        .collect();

    Deployment {
        metadata: object_meta(ctx, workload.suffix, workload.component),
        spec: Some(DeploymentSpec {
            replicas: Some(workload.replicas),
            selector: LabelSelector {
                match_labels: Some(ctx.selector(workload.component)),
                ..Default::default()
            },
            strategy: workload.strategy.map(|t| DeploymentStrategy {
                type_: Some(t.to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(ctx.component_labels(workload.component)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![workload.container],
                    volumes: non_empty(workload.volumes),
                    image_pull_secrets: non_empty(image_pull_secrets),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

fn resource_requirements(limits: Option<&ResourceLimits>) -> Option<ResourceRequirements> {
    let limits = limits?;
    let pair = |cpu: &Option<String>, mem: &Option<String>| {
        let mut map = BTreeMap::new();
        if let Some(cpu) = cpu.as_ref().filter(|v| !v.trim().is_empty()) {
            map.insert("cpu".to_string(), Quantity(cpu.clone()));
        }
        if let Some(mem) = mem.as_ref().filter(|v| !v.trim().is_empty()) {
            map.insert("memory".to_string(), Quantity(mem.clone()));
        }
        non_empty_map(map)
    };

    let requests = pair(&limits.cpu_request, &limits.mem_request);
    let limits = pair(&limits.cpu_limit, &limits.mem_limit);
    if requests.is_none() && limits.is_none() {
        return None;
    }
    Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

fn non_empty_map(map: BTreeMap<String, Quantity>) -> Option<BTreeMap<String, Quantity>> {
    if map.is_empty() { None } else { Some(map) }
}

fn pvc_volume(name: &str, claim: String) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim,
            read_only: Some(false),
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn port(name: &str, number: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: number,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn database_image(cr: &Windup, ctx: &SharedContext) -> String {
    cr.spec
        .images
        .as_ref()
        .and_then(|i| i.database.clone())
        .unwrap_or_else(|| ctx.config.database_image.clone())
}

fn web_image(cr: &Windup, ctx: &SharedContext) -> String {
    cr.spec
        .images
        .as_ref()
        .and_then(|i| i.web.clone())
        .unwrap_or_else(|| ctx.config.web_image.clone())
}

fn executor_image(cr: &Windup, ctx: &SharedContext) -> String {
    cr.spec
        .images
        .as_ref()
        .and_then(|i| i.executor.clone())
        .unwrap_or_else(|| ctx.config.executor_image.clone())
}

fn database_env(ctx: &SharedContext) -> Vec<EnvVar> {
    let secret = ctx.resource_name(DB_SECRET_SUFFIX);
    OptionMapper::new("database", Some(ctx))
        .map_fixed("POSTGRESQL_USER", SecretKeyRef::new(&secret, DB_USERNAME_KEY))
        .map_fixed("POSTGRESQL_PASSWORD", SecretKeyRef::new(&secret, DB_PASSWORD_KEY))
        .map_fixed("POSTGRESQL_DATABASE", SecretKeyRef::new(&secret, DB_DATABASE_KEY))
        .into_env_vars()
}

/// PostgreSQL, one replica with a Recreate strategy over its claim.
pub fn desired_db_deployment(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let resources = cr.spec.resources.as_ref().and_then(|r| r.database.as_ref());
    let container = Container {
        name: "postgresql".to_string(),
        image: Some(database_image(cr, ctx)),
        image_pull_policy: Some(ctx.config.image_pull_policy.clone()),
        env: Some(database_env(ctx)),
        ports: Some(vec![port("tcp", DATABASE_PORT)]),
        volume_mounts: Some(vec![mount(DB_DATA_VOLUME, DB_DATA_PATH)]),
        resources: resource_requirements(resources),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    "psql -h 127.0.0.1 -U $POSTGRESQL_USER -q -d $POSTGRESQL_DATABASE -c 'SELECT 1'"
                        .to_string(),
                ]),
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..Default::default()
    };

    deployment(
        cr,
        ctx,
        Workload {
            suffix: DB_DEPLOYMENT_SUFFIX,
            component: COMPONENT_DATABASE,
            replicas: 1,
            strategy: Some("Recreate"),
            container,
            volumes: vec![pvc_volume(DB_DATA_VOLUME, ctx.resource_name(DB_PVC_SUFFIX))],
        },
    )
    .into()
}

pub fn matches_db_deployment(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    matches_deployment(observed, &desired_db_deployment(cr, ctx))
}

/// Web console, configured by the [`DistConfigurator`].
pub fn desired_web_deployment(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let dist = DistConfigurator::new(cr, ctx);
    let resources = cr.spec.resources.as_ref().and_then(|r| r.web.as_ref());

    let mut ports = vec![port("http", WEB_HTTP_PORT)];
    if cr.spec.is_tls_configured() {
        ports.push(port("https", WEB_HTTPS_PORT));
    }

    let mut mounts = dist.volume_mounts().to_vec();
    mounts.push(mount(REPORTS_VOLUME, REPORTS_PATH));
    let mut volumes = dist.volumes().to_vec();
    volumes.push(pvc_volume(REPORTS_VOLUME, ctx.resource_name(WEB_PVC_SUFFIX)));

    let container = Container {
        name: "windup-web".to_string(),
        image: Some(web_image(cr, ctx)),
        image_pull_policy: Some(ctx.config.image_pull_policy.clone()),
        env: Some(dist.env_vars().to_vec()),
        ports: Some(ports),
        volume_mounts: Some(mounts),
        resources: resource_requirements(resources),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/q/health/ready".to_string()),
                port: IntOrString::Int(WEB_HTTP_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..Default::default()
    };

    deployment(
        cr,
        ctx,
        Workload {
            suffix: WEB_DEPLOYMENT_SUFFIX,
            component: COMPONENT_WEB,
            replicas: 1,
            strategy: Some("Recreate"),
            container,
            volumes,
        },
    )
    .into()
}

pub fn matches_web_deployment(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    matches_deployment(observed, &desired_web_deployment(cr, ctx))
}

/// Analysis executor, scaled by `executorInstances`.
pub fn desired_executor_deployment(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let dist = DistConfigurator::new(cr, ctx);
    let resources = cr.spec.resources.as_ref().and_then(|r| r.executor.as_ref());

    let container = Container {
        name: "windup-executor".to_string(),
        image: Some(executor_image(cr, ctx)),
        image_pull_policy: Some(ctx.config.image_pull_policy.clone()),
        env: Some(dist.env_vars().to_vec()),
        volume_mounts: Some(dist.volume_mounts().to_vec()),
        resources: resource_requirements(resources),
        ..Default::default()
    };

    deployment(
        cr,
        ctx,
        Workload {
            suffix: EXECUTOR_DEPLOYMENT_SUFFIX,
            component: COMPONENT_EXECUTOR,
            replicas: cr.spec.executor_instances,
            strategy: None,
            container,
            volumes: dist.volumes().to_vec(),
        },
    )
    .into()
}

pub fn matches_executor_deployment(
    observed: &ManagedResource,
    cr: &Windup,
    ctx: &SharedContext,
) -> bool {
    matches_deployment(observed, &desired_executor_deployment(cr, ctx))
}

/// Compare the fields this operator writes on a deployment.
///
/// Random or defaulted content is tolerated: probes, protocols, termination
/// settings and anything the API server fills in are not compared.
fn matches_deployment(observed: &ManagedResource, desired: &ManagedResource) -> bool {
    let (Some(actual), Some(wanted)) = (observed.as_deployment(), desired.as_deployment()) else {
        return false;
    };
    if observed.name() != desired.name() {
        return false;
    }
    if let Some(labels) = desired.metadata().labels.as_ref() {
        if !observed.has_labels(labels) {
            return false;
        }
    }

    let (Some(actual), Some(wanted)) = (actual.spec.as_ref(), wanted.spec.as_ref()) else {
        return false;
    };
    if actual.replicas.unwrap_or(1) != wanted.replicas.unwrap_or(1)
        || actual.selector.match_labels != wanted.selector.match_labels
    {
        return false;
    }
    if let Some(strategy) = wanted.strategy.as_ref().and_then(|s| s.type_.as_deref()) {
        let observed = actual.strategy.as_ref().and_then(|s| s.type_.as_deref());
        if observed != Some(strategy) {
            return false;
        }
    }

    let (Some(actual), Some(wanted)) = (actual.template.spec.as_ref(), wanted.template.spec.as_ref())
    else {
        return false;
    };
    if or_empty(&actual.image_pull_secrets) != or_empty(&wanted.image_pull_secrets)
        || volume_identities(&actual.volumes) != volume_identities(&wanted.volumes)
    {
        return false;
    }

    wanted.containers.iter().all(|w| {
        actual
            .containers
            .iter()
            .find(|a| a.name == w.name)
            .is_some_and(|a| container_matches(a, w))
    })
}

fn container_matches(actual: &Container, wanted: &Container) -> bool {
    actual.image == wanted.image
        && env_identities(&actual.env) == env_identities(&wanted.env)
        && mount_identities(&actual.volume_mounts) == mount_identities(&wanted.volume_mounts)
        && port_numbers(&actual.ports) == port_numbers(&wanted.ports)
        && requirements(&actual.resources) == requirements(&wanted.resources)
}

fn or_empty<T>(items: &Option<Vec<T>>) -> &[T] {
    items.as_deref().unwrap_or_default()
}

type EnvIdentity<'a> = (&'a str, Option<&'a str>, Option<&'a SecretKeySelector>);

fn env_identities(env: &Option<Vec<EnvVar>>) -> Vec<EnvIdentity<'_>> {
    or_empty(env)
        .iter()
        .map(|e| {
            (
                e.name.as_str(),
                e.value.as_deref(),
                e.value_from.as_ref().and_then(|v| v.secret_key_ref.as_ref()),
            )
        })
        .collect()
}

fn mount_identities(mounts: &Option<Vec<VolumeMount>>) -> Vec<(&str, &str)> {
    or_empty(mounts)
        .iter()
        .map(|m| (m.name.as_str(), m.mount_path.as_str()))
        .collect()
}

fn port_numbers(ports: &Option<Vec<ContainerPort>>) -> Vec<i32> {
    or_empty(ports).iter().map(|p| p.container_port).collect()
}

fn requirements(
    resources: &Option<ResourceRequirements>,
) -> (Option<&BTreeMap<String, Quantity>>, Option<&BTreeMap<String, Quantity>>) {
    match resources {
        Some(r) => (r.requests.as_ref(), r.limits.as_ref()),
        None => (None, None),
    }
}

/// Volume name plus the identity of its source.
fn volume_identities(
    volumes: &Option<Vec<Volume>>,
) -> Vec<(&str, Option<&str>, Option<&str>, bool)> {
    or_empty(volumes)
        .iter()
        .map(|v| {
            (
                v.name.as_str(),
                v.secret.as_ref().and_then(|s| s.secret_name.as_deref()),
                v.persistent_volume_claim
                    .as_ref()
                    .map(|p| p.claim_name.as_str()),
                v.empty_dir.is_some(),
            )
        })
        .collect()
}
