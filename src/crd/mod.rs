//! Custom Resource Definitions for the Percona Server operator
//!
//! This module defines the desired-state record for a managed MySQL cluster
//! and the defaulting/validation policy applied to it on every reconcile.

pub mod defaults;
mod percona_server;
pub mod types;


pub use percona_server::{
    PerconaServerMySQL, PerconaServerMySQLSpec, PerconaServerMySQLStatus, SpecValidationError,
    ValidationError,
};
pub use types::*;
