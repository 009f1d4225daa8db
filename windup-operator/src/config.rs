//! Process-wide operator configuration.

use std::time::Duration;

/// Default image for the web console.
pub const DEFAULT_WEB_IMAGE: &str = "quay.io/windupeng/windup-web-openshift:latest";
/// Default image for the analysis executor.
pub const DEFAULT_EXECUTOR_IMAGE: &str =
    "quay.io/windupeng/windup-web-openshift-messaging-executor:latest";
/// Default image for the PostgreSQL database.
pub const DEFAULT_DATABASE_IMAGE: &str = "quay.io/centos7/postgresql-12-centos7:latest";

/// Configuration shared by every reconciliation pass.
///
/// Read once at startup and handed to each pass behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Image used by the web deployment when the spec does not override it.
    pub web_image: String,
    /// Image used by the executor deployment when the spec does not override it.
    pub executor_image: String,
    /// Image used by the database deployment when the spec does not override it.
    pub database_image: String,
    /// Image pull policy for every managed container.
    pub image_pull_policy: String,
    /// Delay before the next pass when some resources are not ready yet.
    pub requeue_delay: Duration,
    /// Delay applied by the error policy after a failed pass.
    pub error_requeue_delay: Duration,
    /// Maximum number of node applies running at once within a pass.
    pub max_concurrent_applies: usize,
    /// Field manager used for server-side apply.
    pub field_manager: String,
    /// Namespace to watch. `None` watches all namespaces.
    pub watch_namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            web_image: DEFAULT_WEB_IMAGE.to_string(),
            executor_image: DEFAULT_EXECUTOR_IMAGE.to_string(),
            database_image: DEFAULT_DATABASE_IMAGE.to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            requeue_delay: Duration::from_secs(5),
            error_requeue_delay: Duration::from_secs(30),
            max_concurrent_applies: 8,
            field_manager: "windup-operator".to_string(),
            watch_namespace: None,
        }
    }
}

impl OperatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `WINDUP_WEB_IMAGE`, `WINDUP_EXECUTOR_IMAGE`, `WINDUP_DATABASE_IMAGE`
    /// - `WINDUP_IMAGE_PULL_POLICY`
    /// - `WINDUP_REQUEUE_SECONDS`: delay while waiting for readiness
    /// - `WINDUP_ERROR_REQUEUE_SECONDS`: delay after a failed pass
    /// - `WINDUP_MAX_CONCURRENT_APPLIES`: parallel applies per pass
    /// - `WINDUP_FIELD_MANAGER`: server-side apply field manager
    /// - `WINDUP_WATCH_NAMESPACE`: restrict the controller to one namespace
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let seconds = |key: &str, default: Duration| {
            non_blank(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            web_image: non_blank("WINDUP_WEB_IMAGE").unwrap_or(defaults.web_image),
            executor_image: non_blank("WINDUP_EXECUTOR_IMAGE").unwrap_or(defaults.executor_image),
            database_image: non_blank("WINDUP_DATABASE_IMAGE").unwrap_or(defaults.database_image),
            image_pull_policy: non_blank("WINDUP_IMAGE_PULL_POLICY")
                .unwrap_or(defaults.image_pull_policy),
            requeue_delay: seconds("WINDUP_REQUEUE_SECONDS", defaults.requeue_delay),
            error_requeue_delay: seconds(
                "WINDUP_ERROR_REQUEUE_SECONDS",
                defaults.error_requeue_delay,
            ),
            max_concurrent_applies: non_blank("WINDUP_MAX_CONCURRENT_APPLIES")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_applies),
            field_manager: non_blank("WINDUP_FIELD_MANAGER").unwrap_or(defaults.field_manager),
            watch_namespace: non_blank("WINDUP_WATCH_NAMESPACE"),
        }
    }

    /// Set the readiness requeue delay.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Set the number of applies allowed to run concurrently.
    pub fn with_max_concurrent_applies(mut self, max: usize) -> Self {
        self.max_concurrent_applies = max.max(1);
        self
    }
}
