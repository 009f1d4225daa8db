//! Translation of optional spec sections into container environment bindings.
//!
//! An [`OptionMapper`] walks one configuration section and collects named
//! bindings. Absent sections and blank values produce nothing; secret
//! references become `valueFrom.secretKeyRef` bindings.

use crate::crd::SecretKeyRef;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};

/// A value carried by a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Literal value emitted as `value`.
    Literal(String),
    /// Indirection resolved by the consumer from a Secret.
    SecretRef(SecretKeyRef),
}

impl OptionValue {
    /// Whether the value would produce an empty binding.
    pub fn is_blank(&self) -> bool {
        match self {
            OptionValue::Literal(value) => value.trim().is_empty(),
            OptionValue::SecretRef(reference) => {
                reference.name.trim().is_empty() || reference.key.trim().is_empty()
            }
        }
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Literal(value)
    }
}

impl From<&String> for OptionValue {
    fn from(value: &String) -> Self {
        OptionValue::Literal(value.clone())
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Literal(value.to_string())
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Literal(value.to_string())
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Literal(value.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Literal(value.to_string())
    }
}

impl From<SecretKeyRef> for OptionValue {
    fn from(value: SecretKeyRef) -> Self {
        OptionValue::SecretRef(value)
    }
}

impl From<&SecretKeyRef> for OptionValue {
    fn from(value: &SecretKeyRef) -> Self {
        OptionValue::SecretRef(value.clone())
    }
}

/// One mapped name, with or without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionBinding {
    /// Environment variable name.
    pub name: String,
    /// Value, or `None` when the name was surfaced without one.
    pub value: Option<OptionValue>,
}

/// Collects bindings for one configuration section.
#[derive(Debug)]
pub struct OptionMapper<'a, T> {
    category: &'static str,
    section: Option<&'a T>,
    bindings: Vec<OptionBinding>,
}

impl<'a, T> OptionMapper<'a, T> {
    /// Start mapping a section. `None` means the section is absent.
    pub fn new(category: &'static str, section: Option<&'a T>) -> Self {
        if section.is_none() {
            tracing::debug!(category, "No configuration section provided, skipping bindings");
        }
        Self {
            category,
            section,
            bindings: Vec::new(),
        }
    }

    /// Map a value read from the section.
    pub fn map_option<V, F>(mut self, name: &str, accessor: F) -> Self
    where
        V: Into<OptionValue>,
        F: FnOnce(&T) -> Option<V>,
    {
        let Some(section) = self.section else {
            return self;
        };

        match accessor(section).map(Into::into) {
            Some(value) if !value.is_blank() => self.bindings.push(OptionBinding {
                name: name.to_string(),
                value: Some(value),
            }),
            _ => {
                tracing::debug!(category = self.category, option = name, "No value provided");
            }
        }
        self
    }

    /// Map a fixed literal, independent of the section's content.
    pub fn map_fixed<V: Into<OptionValue>>(self, name: &str, value: V) -> Self {
        let value = value.into();
        self.map_option(name, move |_| Some(value))
    }

    /// Surface a name without a value.
    ///
    /// Recorded so that callers can report it, but never emitted as a binding.
    pub fn map_unset(mut self, name: &str) -> Self {
        if self.section.is_some() {
            self.bindings.push(OptionBinding {
                name: name.to_string(),
                value: None,
            });
        }
        self
    }

    /// Map a collection as one comma-separated literal.
    pub fn map_collection<I, F>(self, name: &str, accessor: F) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
        F: FnOnce(&T) -> Option<I>,
    {
        self.map_option(name, |section| {
            accessor(section).map(|items| {
                items
                    .into_iter()
                    .map(|item| item.to_string())
                    .filter(|item| !item.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(",")
            })
        })
    }

    /// Every mapped name, in mapping order.
    pub fn bindings(&self) -> &[OptionBinding] {
        &self.bindings
    }

    /// Names that were surfaced without a value.
    pub fn unset_names(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .filter(|b| b.value.is_none())
            .map(|b| b.name.as_str())
    }

    /// Convert the valued bindings into container environment variables.
    pub fn into_env_vars(self) -> Vec<EnvVar> {
        self.bindings
            .into_iter()
            .filter_map(|binding| {
                let value = binding.value?;
                Some(env_var(binding.name, value))
            })
            .collect()
    }
}

fn env_var(name: String, value: OptionValue) -> EnvVar {
    match value {
        OptionValue::Literal(value) => EnvVar {
            name,
            value: Some(value),
            value_from: None,
        },
        OptionValue::SecretRef(reference) => EnvVar {
            name,
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(secret_key_selector(&reference)),
                ..Default::default()
            }),
        },
    }
}

/// Build the Kubernetes selector for a secret reference.
pub fn secret_key_selector(reference: &SecretKeyRef) -> SecretKeySelector {
    SecretKeySelector {
        name: reference.name.clone().into(),
        key: reference.key.clone(),
        optional: Some(reference.optional),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Section {
        url: Option<String>,
        blank: Option<String>,
        secret: Option<SecretKeyRef>,
        hosts: Vec<String>,
    }

    #[test]
    fn absent_section_maps_nothing() {
        let env = OptionMapper::<Section>::new("test", None)
            .map_option("URL", |s| s.url.clone())
            .map_fixed("FIXED", "value")
            .map_unset("UNSET")
            .into_env_vars();

        assert!(env.is_empty());
    }

    #[test]
    fn blank_and_missing_values_are_omitted() {
        let section = Section {
            blank: Some("   ".into()),
            hosts: vec![],
            ..Default::default()
        };

        let mapper = OptionMapper::new("test", Some(&section))
            .map_option("URL", |s| s.url.clone())
            .map_option("BLANK", |s| s.blank.clone())
            .map_collection("HOSTS", |s| Some(s.hosts.clone()));

        assert!(mapper.bindings().is_empty());
        assert!(mapper.into_env_vars().is_empty());
    }

    #[test]
    fn secret_references_become_value_from() {
        let section = Section {
            secret: Some(SecretKeyRef::new("creds", "password")),
            ..Default::default()
        };

        let env = OptionMapper::new("test", Some(&section))
            .map_option("PASSWORD", |s| s.secret.clone())
            .into_env_vars();

        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "PASSWORD");
        assert!(env[0].value.is_none());
        let selector = env[0]
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .expect("secret key ref");
        assert_eq!(selector.key, "password");
        assert_eq!(selector.optional, Some(false));
    }

    #[test]
    fn collections_are_comma_joined() {
        let section = Section {
            hosts: vec!["a".into(), "".into(), "b".into()],
            ..Default::default()
        };

        let env = OptionMapper::new("test", Some(&section))
            .map_collection("HOSTS", |s| Some(s.hosts.clone()))
            .into_env_vars();

        assert_eq!(env[0].value.as_deref(), Some("a,b"));
    }

    #[test]
    fn unset_names_are_surfaced_but_not_emitted() {
        let section = Section::default();

        let mapper = OptionMapper::new("http", Some(&section))
            .map_unset("CERT_FILE")
            .map_fixed("WORKSPACE", "/mnt/workspace");

        assert_eq!(mapper.unset_names().collect::<Vec<_>>(), vec!["CERT_FILE"]);
        let env = mapper.into_env_vars();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "WORKSPACE");
    }
}
