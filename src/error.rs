//! Crate-wide error type for the Percona Server operator

use thiserror::Error;

use crate::controller::{ReconcileError, Retryability};

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error outside of a reconcile pass
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Operator misconfiguration (flags, environment, missing CRD)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A reconcile target without a namespace or name
    #[error("Invalid reconcile identity: {0}")]
    InvalidIdentity(String),

    /// A reconcile pass that ended in error
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl Error {
    /// How the trigger subsystem should treat this error
    pub fn retryability(&self) -> Retryability {
        match self {
            Error::Reconcile(e) => e.retryability(),
            Error::KubeError(_) => Retryability::Retry,
            Error::ConfigError(_) | Error::InvalidIdentity(_) => Retryability::RequiresSpecChange,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
