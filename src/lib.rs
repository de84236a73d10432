//! ps-operator: Kubernetes Operator for Percona Server for MySQL
//!
//! This crate reconciles `PerconaServerMySQL` records into the users Secret,
//! Services and StatefulSets of a managed MySQL cluster.

pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
