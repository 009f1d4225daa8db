//! Windup Kubernetes Operator
//!
//! This crate provides a Kubernetes operator that deploys and keeps running
//! Windup application instances: a PostgreSQL database, the web console,
//! the analysis executors and the ingress exposing them.
//!
//! # Custom Resource Definitions
//!
//! - **Windup**: one application instance; every managed object is owned by it
//!
//! # Example
//!
//! ```yaml
//! apiVersion: windup.jboss.org/v1
//! kind: Windup
//! metadata:
//!   name: windup
//! spec:
//!   executorInstances: 2
//!   dataSize: 5G
//!   hostname:
//!     hostname: windup.example.com
//! ```
//!
//! Each pass walks a fixed dependency graph of resources (see [`workflow`]),
//! creating what is missing and updating what drifted. Readiness is reported
//! through the `Ready` and `Progressing` status conditions.

#![warn(clippy::all)]

pub mod config;
pub mod configurator;
pub mod context;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod options;
pub mod readiness;
pub mod resources;
pub mod store;
pub mod workflow;

pub use crd::{Windup, WindupSpec, WindupStatus};
pub use error::{OperatorError, OperatorResult};
