//! Convergence step contract
//!
//! A step brings one sub-resource of the cluster into agreement with the
//! normalized record. Steps must be idempotent: applying one twice against an
//! unchanged record makes no further observable change and returns `Ok`.
//! Sub-changes applied before a failure must each be safe to re-apply.

use std::fmt;

use async_trait::async_trait;

use crate::crd::PerconaServerMySQL;

use super::error::StepError;
use super::reconcile_loop::ReconcileContext;

/// Identifies a convergence step in errors, logs and metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepName {
    Secrets,
    Topology,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Secrets => "secrets",
            StepName::Topology => "topology",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one step. Not persisted.
#[derive(Debug)]
pub enum StepOutcome {
    Converged,
    Failed(StepError),
}

impl From<Result<(), StepError>> for StepOutcome {
    fn from(result: Result<(), StepError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Converged,
            Err(e) => StepOutcome::Failed(e),
        }
    }
}

#[async_trait]
pub trait ConvergenceStep: Send + Sync {
    fn name(&self) -> StepName;

    /// Converge one sub-resource toward `record`
    ///
    /// `record` is the normalized snapshot taken at the start of the pass.
    /// Implementations should check `ctx` for cancellation before each
    /// external write and return [`StepError::cancelled`] once observed.
    async fn apply(
        &self,
        ctx: &ReconcileContext,
        record: &PerconaServerMySQL,
    ) -> Result<(), StepError>;
}

/// Read a field the defaulter guarantees is set
pub fn defaulted<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, StepError> {
    value.as_ref().ok_or_else(|| StepError::not_defaulted(field))
}
