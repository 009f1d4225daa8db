//! Cluster services in front of the database and the web console.

use super::deployment::{WEB_HTTP_PORT, WEB_HTTPS_PORT};
use super::{
    COMPONENT_DATABASE, COMPONENT_WEB, DB_SERVICE_SUFFIX, ManagedResource, WEB_SERVICE_SUFFIX,
    has_name, object_meta,
};
use crate::configurator::DATABASE_PORT;
use crate::context::SharedContext;
use crate::crd::Windup;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn service(ctx: &SharedContext, suffix: &str, component: &str, ports: Vec<ServicePort>) -> Service {
    Service {
        metadata: object_meta(ctx, suffix, component),
        spec: Some(ServiceSpec {
            selector: Some(ctx.selector(component)),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn web_ports(cr: &Windup) -> Vec<ServicePort> {
    let mut ports = vec![service_port("http", WEB_HTTP_PORT)];
    if cr.spec.is_tls_configured() {
        ports.push(service_port("https", WEB_HTTPS_PORT));
    }
    ports
}

/// Ports and selector decide a match; cluster IP, session affinity and other
/// defaults belong to the API server.
fn service_matches(observed: &ManagedResource, desired: &ManagedResource) -> bool {
    let (Some(actual), Some(wanted)) = (observed.as_service(), desired.as_service()) else {
        return false;
    };
    let (Some(actual), Some(wanted)) = (actual.spec.as_ref(), wanted.spec.as_ref()) else {
        return false;
    };

    let ports = |spec: &ServiceSpec| -> Vec<(i32, Option<IntOrString>)> {
        spec.ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| (p.port, p.target_port.clone()))
            .collect()
    };

    observed.name() == desired.name()
        && desired
            .metadata()
            .labels
            .as_ref()
            .is_none_or(|labels| observed.has_labels(labels))
        && actual.selector == wanted.selector
        && ports(actual) == ports(wanted)
}

/// Database service on 5432.
pub fn desired_db_service(_cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    service(
        ctx,
        DB_SERVICE_SUFFIX,
        COMPONENT_DATABASE,
        vec![service_port("tcp", DATABASE_PORT)],
    )
    .into()
}

pub fn matches_db_service(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    has_name(observed, ctx, DB_SERVICE_SUFFIX)
        && service_matches(observed, &desired_db_service(cr, ctx))
}

/// Web console service on 8080, plus 8443 with TLS.
pub fn desired_web_service(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    service(ctx, WEB_SERVICE_SUFFIX, COMPONENT_WEB, web_ports(cr)).into()
}

pub fn matches_web_service(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    has_name(observed, ctx, WEB_SERVICE_SUFFIX)
        && service_matches(observed, &desired_web_service(cr, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::WindupSpec;
    use crate::resources::test_support::{context, windup};

    #[test]
    fn database_service_targets_postgres() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let desired = desired_db_service(&cr, &ctx);

        assert_eq!(desired.name(), "demo-postgresql");
        let spec = desired.as_service().and_then(|s| s.spec.as_ref()).expect("spec");
        assert_eq!(spec.ports.as_ref().map(|p| p[0].port), Some(5432));
        assert_eq!(
            spec.selector
                .as_ref()
                .and_then(|s| s.get("app.kubernetes.io/component"))
                .map(String::as_str),
            Some("postgresql")
        );
    }

    #[test]
    fn assigned_cluster_ip_does_not_break_match() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let mut observed = desired_web_service(&cr, &ctx);
        if let ManagedResource::Service(svc) = &mut observed {
            if let Some(spec) = svc.spec.as_mut() {
                spec.cluster_ip = Some("10.96.0.12".into());
                spec.type_ = Some("ClusterIP".into());
                spec.session_affinity = Some("None".into());
            }
        }

        assert!(matches_web_service(&observed, &cr, &ctx));
        assert!(!matches_db_service(&observed, &cr, &ctx));
    }
}
