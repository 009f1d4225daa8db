//! Ingress exposing the web console, plain or TLS-secured.

use super::deployment::{WEB_HTTP_PORT, WEB_HTTPS_PORT};
use super::{
    COMPONENT_WEB, ManagedResource, WEB_INGRESS_SECURE_SUFFIX, WEB_INGRESS_SUFFIX,
    WEB_SERVICE_SUFFIX, has_name, object_meta,
};
use crate::context::SharedContext;
use crate::crd::{Windup, WindupSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use std::collections::BTreeMap;

const BACKEND_PROTOCOL_ANNOTATION: &str = "nginx.ingress.kubernetes.io/backend-protocol";

fn rule(cr: &Windup, ctx: &SharedContext, port: i32) -> IngressRule {
    IngressRule {
        host: cr.spec.hostname().map(str::to_string),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: ctx.resource_name(WEB_SERVICE_SUFFIX),
                        port: Some(ServiceBackendPort {
                            number: Some(port),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    }
}

/// Rules, TLS and the annotations this operator sets decide a match. Status and
/// annotations added by ingress controllers do not.
fn ingress_matches(observed: &ManagedResource, desired: &ManagedResource) -> bool {
    let (Some(actual), Some(wanted)) = (observed.as_ingress(), desired.as_ingress()) else {
        return false;
    };
    let (Some(actual), Some(wanted)) = (actual.spec.as_ref(), wanted.spec.as_ref()) else {
        return false;
    };

    observed.name() == desired.name()
        && desired
            .metadata()
            .labels
            .as_ref()
            .is_none_or(|labels| observed.has_labels(labels))
        && actual.rules == wanted.rules
        && actual.tls == wanted.tls
        && owned_annotations_match(observed, desired)
}

fn owned_annotations_match(observed: &ManagedResource, desired: &ManagedResource) -> bool {
    let Some(wanted) = desired.metadata().annotations.as_ref() else {
        return true;
    };
    let actual = observed.metadata().annotations.as_ref();
    wanted
        .iter()
        .all(|(key, value)| actual.and_then(|a| a.get(key)) == Some(value))
}

/// Plain HTTP ingress to the web service.
pub fn desired_web_ingress(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    Ingress {
        metadata: object_meta(ctx, WEB_INGRESS_SUFFIX, COMPONENT_WEB),
        spec: Some(IngressSpec {
            rules: Some(vec![rule(cr, ctx, WEB_HTTP_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
    .into()
}

pub fn matches_web_ingress(observed: &ManagedResource, cr: &Windup, ctx: &SharedContext) -> bool {
    has_name(observed, ctx, WEB_INGRESS_SUFFIX)
        && ingress_matches(observed, &desired_web_ingress(cr, ctx))
}

/// TLS ingress terminating with the configured secret and re-encrypting to 8443.
pub fn desired_web_ingress_secure(cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let mut metadata = object_meta(ctx, WEB_INGRESS_SECURE_SUFFIX, COMPONENT_WEB);
    metadata.annotations = Some(BTreeMap::from([(
        BACKEND_PROTOCOL_ANNOTATION.to_string(),
        "HTTPS".to_string(),
    )]));

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: Some(vec![rule(cr, ctx, WEB_HTTPS_PORT)]),
            tls: Some(vec![IngressTLS {
                hosts: cr.spec.hostname().map(|h| vec![h.to_string()]),
                secret_name: cr.spec.tls_secret().map(str::to_string),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
    .into()
}

pub fn matches_web_ingress_secure(
    observed: &ManagedResource,
    cr: &Windup,
    ctx: &SharedContext,
) -> bool {
    has_name(observed, ctx, WEB_INGRESS_SECURE_SUFFIX)
        && ingress_matches(observed, &desired_web_ingress_secure(cr, ctx))
}

pub fn web_ingress_active(spec: &WindupSpec) -> bool {
    spec.is_ingress_enabled() && !spec.is_tls_configured()
}

pub fn web_ingress_secure_active(spec: &WindupSpec) -> bool {
    spec.is_ingress_enabled() && spec.is_tls_configured()
}

/// URL the console is reachable at through `ingress`.
///
/// The configured hostname wins; otherwise the first load-balancer address.
pub fn exposed_url(spec: &WindupSpec, ingress: &Ingress) -> Option<String> {
    let scheme = if spec.is_tls_configured() { "https" } else { "http" };

    let rule_host = ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .and_then(|rules| rules.iter().find_map(|r| r.host.clone()));

    let lb_host = || {
        ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|entries| {
                entries
                    .iter()
                    .find_map(|e| e.hostname.clone().or_else(|| e.ip.clone()))
            })
    };

    rule_host
        .or_else(lb_host)
        .filter(|h| !h.is_empty())
        .map(|host| format!("{}://{}", scheme, host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{HostnameSpec, HttpSpec, IngressSpec as WindupIngressSpec};
    use crate::resources::test_support::{context, windup};
    use k8s_openapi::api::networking::v1::{
        IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
    };

    fn with_hostname(tls: Option<&str>) -> WindupSpec {
        WindupSpec {
            hostname: Some(HostnameSpec {
                hostname: Some("windup.example.com".into()),
            }),
            http: tls.map(|secret| HttpSpec {
                tls_secret: Some(secret.into()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn exactly_one_variant_is_active() {
        let plain = with_hostname(None);
        assert!(web_ingress_active(&plain));
        assert!(!web_ingress_secure_active(&plain));

        let secure = with_hostname(Some("demo-tls"));
        assert!(!web_ingress_active(&secure));
        assert!(web_ingress_secure_active(&secure));

        let disabled = WindupSpec {
            ingress: Some(WindupIngressSpec { enabled: false }),
            ..Default::default()
        };
        assert!(!web_ingress_active(&disabled));
        assert!(!web_ingress_secure_active(&disabled));
    }

    #[test]
    fn secure_ingress_references_tls_secret_and_https_backend() {
        let cr = windup(with_hostname(Some("demo-tls")));
        let ctx = context(&cr);
        let desired = desired_web_ingress_secure(&cr, &ctx);
        let spec = desired.as_ingress().and_then(|i| i.spec.as_ref()).expect("spec");

        let tls = &spec.tls.as_ref().expect("tls")[0];
        assert_eq!(tls.secret_name.as_deref(), Some("demo-tls"));
        assert_eq!(tls.hosts, Some(vec!["windup.example.com".to_string()]));
        let backend = spec.rules.as_ref().expect("rules")[0]
            .http
            .as_ref()
            .and_then(|h| h.paths[0].backend.service.as_ref())
            .expect("backend");
        assert_eq!(backend.name, "demo-web");
        assert_eq!(backend.port.as_ref().and_then(|p| p.number), Some(8443));
    }

    #[test]
    fn exposed_url_prefers_hostname_then_load_balancer() {
        let spec = with_hostname(None);
        let cr = windup(spec.clone());
        let ctx = context(&cr);
        let desired = desired_web_ingress(&cr, &ctx);
        let ingress = desired.as_ingress().expect("ingress");
        assert_eq!(
            exposed_url(&spec, ingress).as_deref(),
            Some("http://windup.example.com")
        );

        let bare = WindupSpec::default();
        let cr = windup(bare.clone());
        let mut ingress = desired_web_ingress(&cr, &context(&cr))
            .as_ingress()
            .cloned()
            .expect("ingress");
        assert_eq!(exposed_url(&bare, &ingress), None);

        ingress.status = Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![IngressLoadBalancerIngress {
                    ip: Some("203.0.113.7".into()),
                    ..Default::default()
                }]),
            }),
        });
        assert_eq!(
            exposed_url(&bare, &ingress).as_deref(),
            Some("http://203.0.113.7")
        );
    }

    #[test]
    fn removed_backend_protocol_is_restored() {
        let cr = windup(with_hostname(Some("windup-tls")));
        let ctx = context(&cr);
        let mut observed = desired_web_ingress_secure(&cr, &ctx);
        assert!(matches_web_ingress_secure(&observed, &cr, &ctx));

        observed
            .metadata_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert("kubernetes.io/ingress.class".into(), "nginx".into());
        assert!(matches_web_ingress_secure(&observed, &cr, &ctx));

        if let Some(annotations) = observed.metadata_mut().annotations.as_mut() {
            annotations.remove(BACKEND_PROTOCOL_ANNOTATION);
        }
        assert!(!matches_web_ingress_secure(&observed, &cr, &ctx));
    }

    #[test]
    fn hostname_change_requires_update() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let observed = desired_web_ingress(&cr, &ctx);
        assert!(matches_web_ingress(&observed, &cr, &ctx));

        let renamed = windup(with_hostname(None));
        assert!(!matches_web_ingress(&observed, &renamed, &context(&renamed)));
    }
}
