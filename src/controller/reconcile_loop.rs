//! The reconciliation loop
//!
//! One pass: fetch the record, normalize it, then converge secrets and
//! topology in that order. The first failure ends the pass and is returned
//! wrapped with its stage. Nothing is retried here; retry policy belongs to
//! whoever triggers the pass.
//!
//! ```text
//! Start -> Fetching -> Absent            -> Done(Ok)
//!                   -> Present -> Validating -> Invalid -> Done(Err)
//!                                            -> Valid   -> ConvergingSecrets
//! ConvergingSecrets  -> Fail -> Done(Err) | Ok -> ConvergingTopology
//! ConvergingTopology -> Fail -> Done(Err) | Ok -> Done(Ok)
//! ```

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::error::{ReconcileError, Stage, StepError, StepErrorKind};
use super::identity::ReconcileIdentity;
use super::step::{ConvergenceStep, StepOutcome};
use super::store::DesiredStateStore;

/// Per-pass context passed explicitly to every stage and step
#[derive(Clone, Debug)]
pub struct ReconcileContext {
    cancel: CancellationToken,
    span: Span,
}

impl ReconcileContext {
    pub fn new(identity: &ReconcileIdentity, cancel: CancellationToken) -> Self {
        let span = info_span!(
            "reconcile",
            namespace = %identity.namespace(),
            name = %identity.name()
        );
        Self { cancel, span }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Span keyed by the identity being reconciled
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// For steps: fail with a cancelled error once cancellation is observed
    pub fn ensure_active(&self) -> Result<(), StepError> {
        if self.is_cancelled() {
            Err(StepError::cancelled())
        } else {
            Ok(())
        }
    }

    fn check(&self, stage: Stage) -> Result<(), ReconcileError> {
        if self.is_cancelled() {
            Err(ReconcileError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Drives fetch, normalization and ordered convergence for one identity
pub struct ReconciliationLoop<S, A, B> {
    store: S,
    secrets: A,
    topology: B,
}

impl<S, A, B> ReconciliationLoop<S, A, B>
where
    S: DesiredStateStore,
    A: ConvergenceStep,
    B: ConvergenceStep,
{
    /// `secrets` always runs before `topology`; topology reads the
    /// credentials secrets creates.
    pub fn new(store: S, secrets: A, topology: B) -> Self {
        Self {
            store,
            secrets,
            topology,
        }
    }

    /// Run one reconciliation pass for `identity`
    ///
    /// Returns `Ok(())` when the record is absent or fully converged.
    ///
    /// # Errors
    ///
    /// Returns the first failure, tagged with the stage it came from.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        identity: &ReconcileIdentity,
    ) -> Result<(), ReconcileError> {
        async {
            info!("Reconciling PerconaServerMySQL {}", identity);

            let result = self.converge(ctx, identity).await;
            match &result {
                Ok(()) => info!("Reconciliation of {} finished", identity),
                Err(e) if e.is_cancelled() => {
                    info!(stage = %e.stage(), "Reconciliation of {} cancelled", identity)
                }
                Err(e) => warn!(
                    stage = %e.stage(),
                    retryability = ?e.retryability(),
                    error = %e,
                    "Reconciliation of {} failed",
                    identity
                ),
            }
            result
        }
        .instrument(ctx.span().clone())
        .await
    }

    async fn converge(
        &self,
        ctx: &ReconcileContext,
        identity: &ReconcileIdentity,
    ) -> Result<(), ReconcileError> {
        ctx.check(Stage::Fetch)?;

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                return Err(ReconcileError::Cancelled { stage: Stage::Fetch });
            }
            fetched = self.store.get(identity) => fetched,
        };

        // The fetched record is this pass's private snapshot.
        let mut record = match fetched.map_err(|source| ReconcileError::Fetch {
            identity: identity.clone(),
            source,
        })? {
            Some(record) => record,
            None => {
                // Deleted since the trigger fired; owned objects are garbage collected.
                info!("PerconaServerMySQL {} not found, nothing to do", identity);
                return Ok(());
            }
        };

        ctx.check(Stage::Validation)?;
        record
            .check_and_set_defaults()
            .map_err(ReconcileError::Validation)?;

        ctx.check(Stage::Secrets)?;
        apply_step(&self.secrets, ctx, &record).await?;

        ctx.check(Stage::Topology)?;
        apply_step(&self.topology, ctx, &record).await?;

        Ok(())
    }
}

async fn apply_step<T: ConvergenceStep>(
    step: &T,
    ctx: &ReconcileContext,
    record: &crate::crd::PerconaServerMySQL,
) -> Result<(), ReconcileError> {
    let name = step.name();
    debug!(step = %name, "Applying convergence step");

    match StepOutcome::from(step.apply(ctx, record).await) {
        StepOutcome::Converged => {
            debug!(step = %name, "Step converged");
            Ok(())
        }
        StepOutcome::Failed(e) if e.kind == StepErrorKind::Cancelled => {
            Err(ReconcileError::Cancelled { stage: name.into() })
        }
        StepOutcome::Failed(source) => Err(ReconcileError::Step { step: name, source }),
    }
}
