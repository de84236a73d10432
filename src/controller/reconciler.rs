//! Controller wiring for PerconaServerMySQL resources
//!
//! Hooks the reconciliation loop into the kube-rs runtime. The runtime is
//! the trigger subsystem: it serializes passes per object, requeues on
//! success and applies [`error_policy`] on failure.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Event, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::crd::PerconaServerMySQL;
use crate::error::{Error, Result};

use super::error::{ReconcileError, Retryability};
use super::identity::ReconcileIdentity;
use super::reconcile_loop::{ReconcileContext, ReconciliationLoop};
use super::secrets::SecretsStep;
use super::store::KubeStore;
use super::topology::TopologyStep;

/// The loop wired to the Kubernetes API
pub type KubeReconciler = ReconciliationLoop<KubeStore, SecretsStep, TopologyStep>;

/// Requeue policy and watch scope
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace to watch, or `None` for all namespaces
    pub namespace: Option<String>,
    /// Requeue after a successful pass
    pub resync: Duration,
    /// Requeue after a retryable failure
    pub retry: Duration,
    /// Requeue after a failure that needs a spec change
    pub terminal_retry: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync: Duration::from_secs(300),
            retry: Duration::from_secs(15),
            terminal_retry: Duration::from_secs(300),
        }
    }
}

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub config: ControllerConfig,
    /// Cancelled on SIGINT/SIGTERM; every pass runs on a child token
    pub shutdown: CancellationToken,
    reconciler: KubeReconciler,
}

impl ControllerState {
    pub fn new(client: Client, config: ControllerConfig, shutdown: CancellationToken) -> Self {
        let reconciler = ReconciliationLoop::new(
            KubeStore::new(client.clone()),
            SecretsStep::new(client.clone()),
            TopologyStep::new(client.clone()),
        );
        Self {
            client,
            config,
            shutdown,
            reconciler,
        }
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let namespace = state.config.namespace.clone();
    let clusters: Api<PerconaServerMySQL> = scoped_api(&client, namespace.as_deref());

    info!(
        namespace = namespace.as_deref().unwrap_or("*"),
        "Starting PerconaServerMySQL controller"
    );

    // Verify CRD exists
    match clusters.list(&Default::default()).await {
        Ok(_) => info!("PerconaServerMySQL CRD is available"),
        Err(e) => {
            error!(
                "PerconaServerMySQL CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "PerconaServerMySQL CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(clusters, Config::default())
        // Watch owned resources for changes
        .owns::<StatefulSet>(scoped_api(&client, namespace.as_deref()), Config::default())
        .owns::<Service>(scoped_api(&client, namespace.as_deref()), Config::default())
        .owns::<Secret>(scoped_api(&client, namespace.as_deref()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        })
        .await;

    info!("PerconaServerMySQL controller stopped");
    Ok(())
}

/// One pass for the object the runtime hands us
async fn reconcile(
    cluster: Arc<PerconaServerMySQL>,
    ctx: Arc<ControllerState>,
) -> Result<Action> {
    let identity = ReconcileIdentity::from_resource(cluster.as_ref())?;
    let pass = ReconcileContext::new(&identity, ctx.shutdown.child_token());

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = ctx.reconciler.reconcile(&pass, &identity).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds(
            identity.namespace(),
            started.elapsed().as_secs_f64(),
        );
        super::metrics::record_reconcile_outcome(&result);
    }

    if let Err(e) = &result {
        if e.retryability() == Retryability::RequiresSpecChange {
            report_failure(&ctx.client, &cluster, e).await;
        }
    }

    result?;
    Ok(Action::requeue(ctx.config.resync))
}

/// Surface a failure that needs user action as a Warning event on the record
async fn report_failure(client: &Client, cluster: &PerconaServerMySQL, err: &ReconcileError) {
    let (reason, message) = match err {
        ReconcileError::Validation(v) => ("InvalidSpec", format!("{}\n{}", err, v.details())),
        _ => ("ReconcileFailed", err.to_string()),
    };
    if let Err(e) = emit_event(client, cluster, "Warning", reason, &message).await {
        warn!("Failed to emit event for {}: {}", cluster.name_any(), e);
    }
}

/// Helper to emit a Kubernetes Event
async fn emit_event(
    client: &Client,
    cluster: &PerconaServerMySQL,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);

    let time = chrono::Utc::now();
    let event = Event {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-event-", cluster.name_any())),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: cluster.object_ref(&()),
        first_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        last_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        count: Some(1),
        ..Default::default()
    };

    events.create(&PostParams::default(), &event).await?;
    Ok(())
}

/// Requeue delay for an error of the given retryability
pub(crate) fn requeue_delay(retryability: Retryability, config: &ControllerConfig) -> Duration {
    match retryability {
        Retryability::Retry => config.retry,
        Retryability::RequiresSpecChange => config.terminal_retry,
        // Shutdown is usually in progress; come back soon if it is not.
        Retryability::Cancelled => Duration::from_secs(1),
    }
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(cluster: Arc<PerconaServerMySQL>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    let retryability = error.retryability();
    let delay = requeue_delay(retryability, &ctx.config);
    warn!(
        retryability = ?retryability,
        requeue_after = ?delay,
        "Reconciliation error for {}: {}",
        cluster.name_any(),
        error
    );

    Action::requeue(delay)
}
