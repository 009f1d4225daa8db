//! Custom Resource Definitions for the Windup Kubernetes operator.
//!
//! - [`Windup`]: one Windup installation (database, console, executor, exposure)

mod windup;

pub use windup::{
    BasicAuthSpec, ConditionStatus, DatabaseSpec, HostnameSpec, HttpSpec, ImagesSpec,
    IngressSpec, IntegrationSpec, LocalObjectReference, OidcSpec, ResourceLimits, ResourcesSpec,
    SecretKeyRef, Windup, WindupCondition, WindupSpec, WindupStatus,
};
