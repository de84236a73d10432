//! Controller module for PerconaServerMySQL reconciliation
//! This module contains the reconciliation loop, its convergence steps,
//! and the wiring into the kube-rs controller runtime.

pub mod conditions;
mod error;
mod identity;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconcile_loop;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
pub mod resources;
#[cfg(test)]
mod resources_test;
pub mod secrets;
mod step;
mod store;
pub mod topology;

pub use error::{
    classify_kube_error, ReconcileError, Retryability, Stage, StepError, StepErrorKind,
    StoreError,
};
pub use identity::ReconcileIdentity;
pub use reconcile_loop::{ReconcileContext, ReconciliationLoop};
pub use reconciler::{run_controller, ControllerConfig, ControllerState, KubeReconciler};
pub use secrets::SecretsStep;
pub use step::{defaulted, ConvergenceStep, StepName, StepOutcome};
pub use store::{DesiredStateStore, KubeStore};
pub use topology::TopologyStep;
