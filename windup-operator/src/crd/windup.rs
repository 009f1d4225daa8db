//! Windup Custom Resource Definition.
//!
//! Declares one Windup installation: database, web console, analysis executor
//! and their network exposure.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Windup is the Schema for the windups API.
///
/// The operator creates the credential secrets, volume claims, deployments,
/// services and ingress needed to run one Windup instance and keeps them in
/// line with this spec.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "windup.jboss.org",
    version = "v1",
    kind = "Windup",
    plural = "windups",
    shortname = "windup",
    namespaced,
    status = "WindupStatus",
    printcolumn = r#"{"name":"Executors", "type":"integer", "jsonPath":".spec.executorInstances"}"#,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WindupSpec {
    /// Number of instances of the executor pod. Default is 1.
    #[serde(default = "default_executor_instances")]
    pub executor_instances: i32,

    /// Size of the PVC where the reports will be stored.
    #[serde(default = "default_data_size")]
    pub data_size: String,

    /// Secrets used when pulling images from a private registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Per-role image overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagesSpec>,

    /// Per-role compute resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    /// Database connection and storage settings.
    #[serde(rename = "db", default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,

    /// Hostname and related properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<HostnameSpec>,

    /// OIDC settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcSpec>,

    /// HTTP and TLS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSpec>,

    /// Ingress settings. Absent means ingress is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Basic authentication settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthSpec>,

    /// External integration endpoint polled on a schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<IntegrationSpec>,
}

fn default_executor_instances() -> i32 {
    1
}

fn default_data_size() -> String {
    "1G".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for WindupSpec {
    fn default() -> Self {
        Self {
            executor_instances: default_executor_instances(),
            data_size: default_data_size(),
            image_pull_secrets: Vec::new(),
            images: None,
            resources: None,
            database: None,
            hostname: None,
            oidc: None,
            http: None,
            ingress: None,
            basic_auth: None,
            integration: None,
        }
    }
}

impl WindupSpec {
    /// TLS secret configured for the web console, if any.
    pub fn tls_secret(&self) -> Option<&str> {
        self.http
            .as_ref()
            .and_then(|h| h.tls_secret.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the web console serves TLS.
    pub fn is_tls_configured(&self) -> bool {
        self.tls_secret().is_some()
    }

    /// Whether an ingress should expose the web console.
    pub fn is_ingress_enabled(&self) -> bool {
        self.ingress.as_ref().map(|i| i.enabled).unwrap_or(true)
    }

    /// Whether basic authentication is turned on.
    pub fn is_basic_auth_enabled(&self) -> bool {
        self.basic_auth.as_ref().map(|b| b.enabled).unwrap_or(false)
    }

    /// Whether OIDC authentication is turned on.
    pub fn is_oidc_enabled(&self) -> bool {
        self.oidc.as_ref().map(|o| o.enabled).unwrap_or(false)
    }

    /// Hostname exposed by the ingress, if configured.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname
            .as_ref()
            .and_then(|h| h.hostname.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Reference to an object in the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    /// Name of the referent.
    pub name: String,
}

/// Reference to one key of a Secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeyRef {
    /// Name of the Secret.
    pub name: String,
    /// Key inside the Secret.
    pub key: String,
    /// Whether the Secret or key may be missing.
    #[serde(default)]
    pub optional: bool,
}

impl SecretKeyRef {
    /// Create a mandatory reference.
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            optional: false,
        }
    }
}

/// Image overrides per role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImagesSpec {
    /// Web console image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<String>,
    /// Executor image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    /// Database image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Compute resources per role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    /// Web console resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<ResourceLimits>,
    /// Executor resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ResourceLimits>,
    /// Database resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ResourceLimits>,
}

/// CPU and memory requests and limits (e.g. "500m", "1Gi").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// CPU request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    /// CPU limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    /// Memory request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_request: Option<String>,
    /// Memory limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<String>,
}

/// Database settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Size of the database PVC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Secret key holding the database username. Defaults to the managed secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_secret: Option<SecretKeyRef>,
    /// Secret key holding the database password. Defaults to the managed secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,
    /// JDBC URL. Defaults to the managed database service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Hostname settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostnameSpec {
    /// Hostname for the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// OIDC settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OidcSpec {
    /// Enable OIDC authentication.
    #[serde(default)]
    pub enabled: bool,
    /// OIDC server URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// OIDC client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Secret key holding the OIDC client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<SecretKeyRef>,
}

/// HTTP settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpSpec {
    /// Name of a `kubernetes.io/tls` Secret holding `tls.crt` and `tls.key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,
}

/// Ingress settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Whether to create an ingress. Default is true.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for IngressSpec {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Basic authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthSpec {
    /// Enable basic authentication.
    #[serde(default)]
    pub enabled: bool,
    /// Secret key holding the session encryption key. Defaults to a managed secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_encryption_key_secret: Option<SecretKeyRef>,
}

/// External integration settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    /// Endpoint the console pulls data from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Cron expression for the pull.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Windup status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindupStatus {
    /// Conditions representing the current state. One entry per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WindupCondition>,

    /// URL the console is exposed at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Generation of the spec the conditions describe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the status was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Status of a condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The operator cannot tell.
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Condition representing Windup state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindupCondition {
    /// Type of condition (Ready, Progressing).
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status of the condition.
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the status changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_spec_gets_defaults() {
        let spec: WindupSpec = serde_json::from_str("{}").expect("empty spec should parse");

        assert_eq!(spec.executor_instances, 1);
        assert_eq!(spec.data_size, "1G");
        assert!(spec.is_ingress_enabled());
        assert!(!spec.is_tls_configured());
        assert!(!spec.is_oidc_enabled());
    }

    #[test]
    fn camel_case_sections_parse() {
        let spec: WindupSpec = serde_json::from_value(serde_json::json!({
            "executorInstances": 3,
            "db": { "size": "5Gi" },
            "hostname": { "hostname": "windup.example.com" },
            "http": { "tlsSecret": "  " },
            "ingress": { "enabled": false },
            "basicAuth": { "enabled": true },
            "oidc": {
                "enabled": true,
                "serverUrl": "https://sso.example.com/realms/windup",
                "credentialsSecret": { "name": "oidc", "key": "secret" }
            }
        }))
        .expect("spec should parse");

        assert_eq!(spec.executor_instances, 3);
        assert_eq!(spec.database.and_then(|d| d.size).as_deref(), Some("5Gi"));
        assert_eq!(spec.hostname.and_then(|h| h.hostname).as_deref(), Some("windup.example.com"));
        assert!(spec.http.is_some());
        assert!(spec.ingress.map(|i| !i.enabled).unwrap_or(false));
        assert!(spec.basic_auth.map(|b| b.enabled).unwrap_or(false));
        let creds = spec.oidc.and_then(|o| o.credentials_secret);
        assert_eq!(creds, Some(SecretKeyRef::new("oidc", "secret")));
    }

    #[test]
    fn blank_tls_secret_is_not_configured() {
        let spec = WindupSpec {
            http: Some(HttpSpec {
                tls_secret: Some("   ".into()),
            }),
            ..Default::default()
        };
        assert!(!spec.is_tls_configured());
    }

    #[test]
    fn condition_status_serializes_as_kubernetes_strings() {
        let json = serde_json::to_string(&ConditionStatus::True).expect("serializes");
        assert_eq!(json, "\"True\"");
        assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
    }
}
