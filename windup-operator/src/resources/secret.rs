//! Credential secrets.
//!
//! Contents are random and generated only when the secret is first created.
//! The matchers compare the name alone, so an existing secret is never
//! rewritten with fresh credentials.

use super::{
    BASIC_AUTH_SECRET_SUFFIX, COMPONENT_DATABASE, COMPONENT_WEB, DB_SECRET_SUFFIX,
    ManagedResource, has_name, object_meta,
};
use crate::context::SharedContext;
use crate::crd::{Windup, WindupSpec};
use k8s_openapi::api::core::v1::Secret;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::BTreeMap;

/// Key holding the database username.
pub const DB_USERNAME_KEY: &str = "username";
/// Key holding the database password.
pub const DB_PASSWORD_KEY: &str = "password";
/// Key holding the database name.
pub const DB_DATABASE_KEY: &str = "database";
/// Name of the application database.
pub const DATABASE_NAME: &str = "windup";
/// Key holding the basic-auth session encryption key.
pub const BASIC_AUTH_ENCRYPTION_KEY: &str = "encryption-key";

const CREDENTIAL_LENGTH: usize = 8;
const ENCRYPTION_KEY_LENGTH: usize = 32;

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn opaque(ctx: &SharedContext, suffix: &str, component: &str, data: BTreeMap<String, String>) -> Secret {
    Secret {
        metadata: object_meta(ctx, suffix, component),
        type_: Some("Opaque".to_string()),
        string_data: Some(data),
        ..Default::default()
    }
}

/// Database credentials: random username and password, fixed database name.
pub fn desired_db_secret(_cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let data = BTreeMap::from([
        (DB_USERNAME_KEY.to_string(), random_alphanumeric(CREDENTIAL_LENGTH)),
        (DB_PASSWORD_KEY.to_string(), random_alphanumeric(CREDENTIAL_LENGTH)),
        (DB_DATABASE_KEY.to_string(), DATABASE_NAME.to_string()),
    ]);
    opaque(ctx, DB_SECRET_SUFFIX, COMPONENT_DATABASE, data).into()
}

/// Name-only match.
pub fn matches_db_secret(observed: &ManagedResource, _cr: &Windup, ctx: &SharedContext) -> bool {
    has_name(observed, ctx, DB_SECRET_SUFFIX)
}

/// Session encryption key for basic authentication.
pub fn desired_basic_auth_secret(_cr: &Windup, ctx: &SharedContext) -> ManagedResource {
    let data = BTreeMap::from([(
        BASIC_AUTH_ENCRYPTION_KEY.to_string(),
        random_alphanumeric(ENCRYPTION_KEY_LENGTH),
    )]);
    opaque(ctx, BASIC_AUTH_SECRET_SUFFIX, COMPONENT_WEB, data).into()
}

/// Name-only match.
pub fn matches_basic_auth_secret(
    observed: &ManagedResource,
    _cr: &Windup,
    ctx: &SharedContext,
) -> bool {
    has_name(observed, ctx, BASIC_AUTH_SECRET_SUFFIX)
}

/// The managed key is needed only when basic auth is on and no key was supplied.
pub fn basic_auth_secret_active(spec: &WindupSpec) -> bool {
    spec.is_basic_auth_enabled()
        && spec
            .basic_auth
            .as_ref()
            .and_then(|b| b.session_encryption_key_secret.as_ref())
            .is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BasicAuthSpec, SecretKeyRef};
    use crate::resources::test_support::{context, windup};

    fn string_data(resource: &ManagedResource) -> BTreeMap<String, String> {
        resource
            .as_secret()
            .and_then(|s| s.string_data.clone())
            .expect("string data")
    }

    #[test]
    fn db_secret_has_random_credentials_and_fixed_database() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);

        let desired = desired_db_secret(&cr, &ctx);
        let data = string_data(&desired);

        assert_eq!(desired.name(), "demo-db-secret");
        assert_eq!(data[DB_USERNAME_KEY].len(), 8);
        assert!(data[DB_PASSWORD_KEY].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(data[DB_DATABASE_KEY], "windup");
    }

    #[test]
    fn regenerated_credentials_still_match() {
        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);

        let first = desired_db_secret(&cr, &ctx);
        let second = desired_db_secret(&cr, &ctx);

        assert!(matches_db_secret(&first, &cr, &ctx));
        assert!(matches_db_secret(&second, &cr, &ctx));

        let mut renamed = first.clone();
        renamed.metadata_mut().name = Some("demo-db-secret-old".into());
        assert!(!matches_db_secret(&renamed, &cr, &ctx));
    }

    #[test]
    fn basic_auth_secret_only_without_user_key() {
        let mut spec = WindupSpec {
            basic_auth: Some(BasicAuthSpec {
                enabled: true,
                session_encryption_key_secret: None,
            }),
            ..Default::default()
        };
        assert!(basic_auth_secret_active(&spec));

        spec.basic_auth = Some(BasicAuthSpec {
            enabled: true,
            session_encryption_key_secret: Some(SecretKeyRef::new("mine", "key")),
        });
        assert!(!basic_auth_secret_active(&spec));
        assert!(!basic_auth_secret_active(&WindupSpec::default()));

        let cr = windup(WindupSpec::default());
        let ctx = context(&cr);
        let desired = desired_basic_auth_secret(&cr, &ctx);
        assert_eq!(string_data(&desired)[BASIC_AUTH_ENCRYPTION_KEY].len(), 32);
    }
}
