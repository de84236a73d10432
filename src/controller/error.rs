//! Error types for the reconciliation loop
//!
//! Every failure is classified by kind, never by message text:
//!
//! | Stage        | Variant                      | Retryability                     |
//! |--------------|------------------------------|----------------------------------|
//! | fetch        | `ReconcileError::Fetch`      | `Retry`                          |
//! | validation   | `ReconcileError::Validation` | `RequiresSpecChange`             |
//! | secrets      | `ReconcileError::Step`       | from the step's `StepErrorKind`  |
//! | topology     | `ReconcileError::Step`       | from the step's `StepErrorKind`  |
//! | any          | `ReconcileError::Cancelled`  | `Cancelled`                      |
//!
//! A missing record is not an error at all: the store returns `Ok(None)`.

use std::fmt;

use thiserror::Error;

use crate::crd::ValidationError;

use super::identity::ReconcileIdentity;
use super::step::StepName;

/// Stage of a reconcile pass an error originated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Validation,
    Secrets,
    Topology,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Validation => "validation",
            Stage::Secrets => "secrets",
            Stage::Topology => "topology",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StepName> for Stage {
    fn from(step: StepName) -> Self {
        match step {
            StepName::Secrets => Stage::Secrets,
            StepName::Topology => Stage::Topology,
        }
    }
}

/// What the trigger subsystem should do with a failed pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Retryability {
    /// Transient; retry the same record with backoff
    Retry,
    /// Fails identically until the record changes
    RequiresSpecChange,
    /// Neither a spec nor an infrastructure failure
    Cancelled,
}

/// Failure reading the desired-state record, other than absence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),
}

/// Classification a convergence step attaches to its failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepErrorKind {
    /// Safe to retry as-is
    Transient,
    /// Requires a specification change
    Permanent,
    /// The step observed cancellation and stopped
    Cancelled,
}

/// Failure returned by a convergence step
#[derive(Error, Debug)]
#[error("{message}")]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
    #[source]
    pub source: Option<kube::Error>,
}

impl StepError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Transient,
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Permanent,
            message: message.into(),
            source: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: StepErrorKind::Cancelled,
            message: "step cancelled".to_string(),
            source: None,
        }
    }

    /// A field the defaulter should have set is missing
    pub fn not_defaulted(field: &str) -> Self {
        Self::permanent(format!("{field} is unset; record was not normalized"))
    }

    /// Add context to the message while keeping kind and source
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StepErrorKind::Transient
    }
}

impl From<kube::Error> for StepError {
    fn from(err: kube::Error) -> Self {
        let kind = classify_kube_error(&err);
        Self {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Classify a Kubernetes client error by status code
///
/// Conflicts, throttling, server errors and transport failures are transient.
/// A 404 mid-pass means an object was deleted underneath us; the next fetch
/// observes the absence, so it is transient too. Remaining client errors and
/// malformed requests are permanent.
pub fn classify_kube_error(err: &kube::Error) -> StepErrorKind {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 | 409 | 429 => StepErrorKind::Transient,
            code if code >= 500 => StepErrorKind::Transient,
            _ => StepErrorKind::Permanent,
        },
        kube::Error::SerdeError(_) | kube::Error::BuildRequest(_) => StepErrorKind::Permanent,
        _ => StepErrorKind::Transient,
    }
}

/// Terminal error of one reconcile pass, wrapped with the stage it came from
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("fetch: get cluster {identity}: {source}")]
    Fetch {
        identity: ReconcileIdentity,
        #[source]
        source: StoreError,
    },

    #[error("validation: {0}")]
    Validation(#[source] ValidationError),

    #[error("{step}: reconcile {step}: {source}")]
    Step {
        step: StepName,
        #[source]
        source: StepError,
    },

    #[error("{stage}: reconciliation cancelled")]
    Cancelled { stage: Stage },
}

impl ReconcileError {
    /// Stage the error originated from
    pub fn stage(&self) -> Stage {
        match self {
            ReconcileError::Fetch { .. } => Stage::Fetch,
            ReconcileError::Validation(_) => Stage::Validation,
            ReconcileError::Step { step, .. } => Stage::from(*step),
            ReconcileError::Cancelled { stage } => *stage,
        }
    }

    pub fn retryability(&self) -> Retryability {
        match self {
            ReconcileError::Fetch { .. } => Retryability::Retry,
            // Defaulting is pure, so a defaulting failure repeats until the record changes.
            ReconcileError::Validation(_) => Retryability::RequiresSpecChange,
            ReconcileError::Step { source, .. } => match source.kind {
                StepErrorKind::Transient => Retryability::Retry,
                StepErrorKind::Permanent => Retryability::RequiresSpecChange,
                StepErrorKind::Cancelled => Retryability::Cancelled,
            },
            ReconcileError::Cancelled { .. } => Retryability::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.retryability() == Retryability::Cancelled
    }
}
