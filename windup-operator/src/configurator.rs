//! Environment, volumes and mounts for the Windup application containers.

use crate::context::SharedContext;
use crate::crd::{SecretKeyRef, Windup, WindupSpec};
use crate::options::OptionMapper;
use crate::resources::secret::{
    BASIC_AUTH_ENCRYPTION_KEY, DB_PASSWORD_KEY, DB_USERNAME_KEY, DATABASE_NAME,
};
use crate::resources::{BASIC_AUTH_SECRET_SUFFIX, DB_SECRET_SUFFIX, DB_SERVICE_SUFFIX};
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, EnvVar, SecretVolumeSource, Volume, VolumeMount,
};

/// Mount path of the TLS certificate volume.
pub const CERTIFICATES_FOLDER: &str = "/mnt/certificates";
/// Mount path of the shared workspace volume.
pub const WORKSPACE_FOLDER: &str = "/mnt/workspace";
/// Name of the TLS certificate volume.
pub const TLS_VOLUME_NAME: &str = "windup-tls-certificates";
/// Name of the workspace volume.
pub const WORKSPACE_VOLUME_NAME: &str = "windup-workspace";
/// Port the PostgreSQL service listens on.
pub const DATABASE_PORT: i32 = 5432;

/// Environment bindings and volumes for one instance.
#[derive(Debug, Clone, Default)]
pub struct DistConfigurator {
    env_vars: Vec<EnvVar>,
    volumes: Vec<Volume>,
    volume_mounts: Vec<VolumeMount>,
    unset_options: Vec<String>,
}

impl DistConfigurator {
    /// Compose every configuration category for the instance.
    pub fn new(cr: &Windup, ctx: &SharedContext) -> Self {
        let mut configurator = Self::default();
        let spec = &cr.spec;

        configurator.configure_http(spec);
        configurator.configure_database(spec, ctx);
        configurator.configure_basic_auth(spec, ctx);
        configurator.configure_oidc(spec);
        configurator.configure_integration(spec);
        configurator.configure_workspace(spec);

        if !configurator.unset_options.is_empty() {
            tracing::debug!(
                name = %ctx.name,
                options = ?configurator.unset_options,
                "Options mapped without values"
            );
        }
        configurator
    }

    /// Environment variables for the application container.
    pub fn env_vars(&self) -> &[EnvVar] {
        &self.env_vars
    }

    /// Volumes for the pod.
    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// Volume mounts for the application container.
    pub fn volume_mounts(&self) -> &[VolumeMount] {
        &self.volume_mounts
    }

    /// Option names surfaced without a value.
    pub fn unset_options(&self) -> &[String] {
        &self.unset_options
    }

    fn collect<T>(&mut self, mapper: OptionMapper<'_, T>) {
        self.unset_options
            .extend(mapper.unset_names().map(str::to_string));
        self.env_vars.extend(mapper.into_env_vars());
    }

    fn configure_http(&mut self, spec: &WindupSpec) {
        const CERT_FILE: &str = "QUARKUS_HTTP_SSL_CERTIFICATE_FILE";
        const KEY_FILE: &str = "QUARKUS_HTTP_SSL_CERTIFICATE_KEY_FILE";

        let Some(tls_secret) = spec.tls_secret() else {
            let mapper = OptionMapper::new("http", Some(spec))
                .map_unset(CERT_FILE)
                .map_unset(KEY_FILE);
            self.collect(mapper);
            return;
        };

        let mapper = OptionMapper::new("http", spec.http.as_ref())
            .map_fixed(CERT_FILE, format!("{}/tls.crt", CERTIFICATES_FOLDER))
            .map_fixed(KEY_FILE, format!("{}/tls.key", CERTIFICATES_FOLDER))
            .map_fixed("QUARKUS_HTTP_INSECURE_REQUESTS", "redirect");
        self.collect(mapper);

        self.volumes.push(Volume {
            name: TLS_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(tls_secret.to_string()),
                optional: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });
        self.volume_mounts.push(VolumeMount {
            name: TLS_VOLUME_NAME.to_string(),
            mount_path: CERTIFICATES_FOLDER.to_string(),
            ..Default::default()
        });
    }

    fn configure_database(&mut self, spec: &WindupSpec, ctx: &SharedContext) {
        let managed_secret = ctx.resource_name(DB_SECRET_SUFFIX);
        let overrides = spec.database.as_ref();

        let username = overrides
            .and_then(|db| db.username_secret.clone())
            .unwrap_or_else(|| SecretKeyRef::new(&managed_secret, DB_USERNAME_KEY));
        let password = overrides
            .and_then(|db| db.password_secret.clone())
            .unwrap_or_else(|| SecretKeyRef::new(&managed_secret, DB_PASSWORD_KEY));
        let url = overrides
            .and_then(|db| db.url.clone())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "jdbc:postgresql://{}:{}/{}",
                    ctx.resource_name(DB_SERVICE_SUFFIX),
                    DATABASE_PORT,
                    DATABASE_NAME
                )
            });

        let mapper = OptionMapper::new("db", Some(spec))
            .map_fixed("QUARKUS_DATASOURCE_USERNAME", username)
            .map_fixed("QUARKUS_DATASOURCE_PASSWORD", password)
            .map_fixed("QUARKUS_DATASOURCE_JDBC_URL", url);
        self.collect(mapper);
    }

    fn configure_basic_auth(&mut self, spec: &WindupSpec, ctx: &SharedContext) {
        if !spec.is_basic_auth_enabled() {
            return;
        }

        let key = spec
            .basic_auth
            .as_ref()
            .and_then(|b| b.session_encryption_key_secret.clone())
            .unwrap_or_else(|| {
                SecretKeyRef::new(
                    ctx.resource_name(BASIC_AUTH_SECRET_SUFFIX),
                    BASIC_AUTH_ENCRYPTION_KEY,
                )
            });

        let mapper = OptionMapper::new("basicAuth", spec.basic_auth.as_ref())
            .map_fixed("QUARKUS_HTTP_AUTH_SESSION_ENCRYPTION_KEY", key);
        self.collect(mapper);
    }

    fn configure_oidc(&mut self, spec: &WindupSpec) {
        if !spec.is_oidc_enabled() {
            return;
        }

        let mapper = OptionMapper::new("oidc", spec.oidc.as_ref())
            .map_option("QUARKUS_OIDC_AUTH_SERVER_URL", |o| o.server_url.clone())
            .map_option("QUARKUS_OIDC_CLIENT_ID", |o| o.client_id.clone())
            .map_option("QUARKUS_OIDC_CREDENTIALS_SECRET", |o| {
                o.credentials_secret.clone()
            });
        self.collect(mapper);
    }

    fn configure_integration(&mut self, spec: &WindupSpec) {
        let mapper = OptionMapper::new("integration", spec.integration.as_ref())
            .map_option("WINDUP_INTEGRATION_ENDPOINT_URL", |i| i.endpoint_url.clone())
            .map_option("WINDUP_INTEGRATION_SCHEDULE", |i| i.schedule.clone());
        self.collect(mapper);
    }

    fn configure_workspace(&mut self, spec: &WindupSpec) {
        let mapper = OptionMapper::new("workspace", Some(spec))
            .map_fixed("WINDUP_WORKSPACE_DIRECTORY", WORKSPACE_FOLDER);
        self.collect(mapper);

        self.volumes.push(Volume {
            name: WORKSPACE_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        self.volume_mounts.push(VolumeMount {
            name: WORKSPACE_VOLUME_NAME.to_string(),
            mount_path: WORKSPACE_FOLDER.to_string(),
            ..Default::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BasicAuthSpec, DatabaseSpec, HttpSpec, IntegrationSpec, OidcSpec};
    use std::sync::Arc;

    fn build(spec: WindupSpec) -> DistConfigurator {
        let mut cr = Windup::new("demo", spec);
        cr.metadata.namespace = Some("apps".into());
        let ctx = SharedContext::new(&cr, Arc::default()).expect("context");
        DistConfigurator::new(&cr, &ctx)
    }

    fn env_names(configurator: &DistConfigurator) -> Vec<&str> {
        configurator
            .env_vars()
            .iter()
            .map(|e| e.name.as_str())
            .collect()
    }

    fn env_value<'a>(configurator: &'a DistConfigurator, name: &str) -> Option<&'a str> {
        configurator
            .env_vars()
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    #[test]
    fn defaults_bind_managed_database_and_workspace() {
        let configurator = build(WindupSpec::default());
        let names = env_names(&configurator);

        assert_eq!(
            names,
            vec![
                "QUARKUS_DATASOURCE_USERNAME",
                "QUARKUS_DATASOURCE_PASSWORD",
                "QUARKUS_DATASOURCE_JDBC_URL",
                "WINDUP_WORKSPACE_DIRECTORY",
            ]
        );
        assert_eq!(
            env_value(&configurator, "QUARKUS_DATASOURCE_JDBC_URL"),
            Some("jdbc:postgresql://demo-postgresql:5432/windup")
        );
        assert_eq!(
            configurator.unset_options(),
            &[
                "QUARKUS_HTTP_SSL_CERTIFICATE_FILE".to_string(),
                "QUARKUS_HTTP_SSL_CERTIFICATE_KEY_FILE".to_string()
            ]
        );
        assert_eq!(configurator.volumes().len(), 1);
        assert_eq!(configurator.volumes()[0].name, WORKSPACE_VOLUME_NAME);
    }

    #[test]
    fn tls_secret_adds_files_redirect_and_volume() {
        let configurator = build(WindupSpec {
            http: Some(HttpSpec {
                tls_secret: Some("demo-tls".into()),
            }),
            ..Default::default()
        });

        assert_eq!(
            env_value(&configurator, "QUARKUS_HTTP_SSL_CERTIFICATE_FILE"),
            Some("/mnt/certificates/tls.crt")
        );
        assert_eq!(
            env_value(&configurator, "QUARKUS_HTTP_INSECURE_REQUESTS"),
            Some("redirect")
        );
        let tls = configurator
            .volumes()
            .iter()
            .find(|v| v.name == TLS_VOLUME_NAME)
            .and_then(|v| v.secret.as_ref())
            .expect("tls volume");
        assert_eq!(tls.secret_name.as_deref(), Some("demo-tls"));
        assert!(configurator
            .volume_mounts()
            .iter()
            .any(|m| m.mount_path == CERTIFICATES_FOLDER));
    }

    #[test]
    fn database_overrides_take_precedence() {
        let configurator = build(WindupSpec {
            database: Some(DatabaseSpec {
                username_secret: Some(SecretKeyRef::new("external-db", "user")),
                url: Some("jdbc:postgresql://db.example.com:5432/windup".into()),
                ..Default::default()
            }),
            ..Default::default()
        });

        let username = configurator
            .env_vars()
            .iter()
            .find(|e| e.name == "QUARKUS_DATASOURCE_USERNAME")
            .and_then(|e| e.value_from.as_ref())
            .and_then(|v| v.secret_key_ref.as_ref())
            .expect("username ref");
        assert_eq!(username.key, "user");
        assert_eq!(
            env_value(&configurator, "QUARKUS_DATASOURCE_JDBC_URL"),
            Some("jdbc:postgresql://db.example.com:5432/windup")
        );
    }

    #[test]
    fn disabled_oidc_and_basic_auth_map_nothing() {
        let configurator = build(WindupSpec {
            oidc: Some(OidcSpec {
                enabled: false,
                server_url: Some("https://sso.example.com".into()),
                ..Default::default()
            }),
            basic_auth: Some(BasicAuthSpec::default()),
            ..Default::default()
        });

        let names = env_names(&configurator);
        assert!(!names.iter().any(|n| n.starts_with("QUARKUS_OIDC_")));
        assert!(!names.contains(&"QUARKUS_HTTP_AUTH_SESSION_ENCRYPTION_KEY"));
    }

    #[test]
    fn enabled_features_are_mapped() {
        let configurator = build(WindupSpec {
            oidc: Some(OidcSpec {
                enabled: true,
                server_url: Some("https://sso.example.com/realms/windup".into()),
                client_id: Some("windup".into()),
                credentials_secret: None,
            }),
            basic_auth: Some(BasicAuthSpec {
                enabled: true,
                session_encryption_key_secret: None,
            }),
            integration: Some(IntegrationSpec {
                endpoint_url: Some("https://feed.example.com".into()),
                schedule: Some("".into()),
            }),
            ..Default::default()
        });

        let names = env_names(&configurator);
        assert!(names.contains(&"QUARKUS_OIDC_AUTH_SERVER_URL"));
        assert!(names.contains(&"QUARKUS_OIDC_CLIENT_ID"));
        assert!(!names.contains(&"QUARKUS_OIDC_CREDENTIALS_SECRET"));
        assert!(names.contains(&"WINDUP_INTEGRATION_ENDPOINT_URL"));
        assert!(!names.contains(&"WINDUP_INTEGRATION_SCHEDULE"));

        let key = configurator
            .env_vars()
            .iter()
            .find(|e| e.name == "QUARKUS_HTTP_AUTH_SESSION_ENCRYPTION_KEY")
            .and_then(|e| e.value_from.as_ref())
            .and_then(|v| v.secret_key_ref.as_ref())
            .expect("encryption key ref");
        assert_eq!(key.key, BASIC_AUTH_ENCRYPTION_KEY);
    }
}
