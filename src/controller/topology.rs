//! Instance topology convergence
//!
//! Server-side applies the headless Services and StatefulSets for MySQL and,
//! for async clusters, orchestrator. Then reads back ready replica counts and
//! writes the record status. Server-side apply of an unchanged object and a
//! skipped status patch make a repeated pass a no-op.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::crd::{ClusterState, PerconaServerMySQL, PerconaServerMySQLStatus, StatefulAppStatus};

use super::conditions::{
    set_condition, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_READY,
};
use super::error::StepError;
use super::reconcile_loop::ReconcileContext;
use super::resources::{
    build_headless_service, build_mysql_statefulset, build_orchestrator_statefulset,
    component_name, mysql_service_ports, orchestrator_service_ports, orchestrator_wanted,
    FIELD_MANAGER, MYSQL_COMPONENT, ORCHESTRATOR_COMPONENT,
};
use super::step::{defaulted, ConvergenceStep, StepName};

/// Converges Services, StatefulSets and status for a cluster
#[derive(Clone)]
pub struct TopologyStep {
    client: Client,
}

impl TopologyStep {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<(), StepError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let name = service.name_any();
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(service),
        )
        .await
        .map_err(|e| StepError::from(e).context(format!("apply Service {name}")))?;
        Ok(())
    }

    /// Apply the StatefulSet and return its ready replica count
    async fn apply_statefulset(
        &self,
        namespace: &str,
        statefulset: &StatefulSet,
    ) -> Result<i32, StepError> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let name = statefulset.name_any();
        let applied = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(statefulset),
            )
            .await
            .map_err(|e| StepError::from(e).context(format!("apply StatefulSet {name}")))?;

        Ok(applied
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0))
    }

    async fn write_status(
        &self,
        namespace: &str,
        record: &PerconaServerMySQL,
        status: &PerconaServerMySQLStatus,
    ) -> Result<(), StepError> {
        if record.status.as_ref() == Some(status) {
            debug!("Status unchanged, skipping patch");
            return Ok(());
        }

        let api: Api<PerconaServerMySQL> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(status)?;
        api.patch_status(
            &record.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| StepError::from(e).context("patch PerconaServerMySQL status"))?;

        info!(state = %status.state, ready = status.mysql.ready, size = status.mysql.size, "Status updated");
        Ok(())
    }
}

#[async_trait]
impl ConvergenceStep for TopologyStep {
    fn name(&self) -> StepName {
        StepName::Topology
    }

    async fn apply(
        &self,
        ctx: &ReconcileContext,
        record: &PerconaServerMySQL,
    ) -> Result<(), StepError> {
        let namespace = record
            .namespace()
            .ok_or_else(|| StepError::permanent("cluster record has no namespace"))?;

        // Build everything up front so an unnormalized record fails before any write.
        let mysql_service = build_headless_service(record, MYSQL_COMPONENT, &mysql_service_ports());
        let mysql_statefulset = build_mysql_statefulset(record)?;
        let orchestrator_statefulset = build_orchestrator_statefulset(record)?;

        ctx.ensure_active()?;
        self.apply_service(&namespace, &mysql_service).await?;

        ctx.ensure_active()?;
        let mysql_ready = self
            .apply_statefulset(&namespace, &mysql_statefulset)
            .await?;
        debug!(
            statefulset = %component_name(record, MYSQL_COMPONENT),
            ready = mysql_ready,
            "MySQL StatefulSet applied"
        );

        let orchestrator_ready = match &orchestrator_statefulset {
            Some(statefulset) => {
                ctx.ensure_active()?;
                let service = build_headless_service(
                    record,
                    ORCHESTRATOR_COMPONENT,
                    &orchestrator_service_ports(),
                );
                self.apply_service(&namespace, &service).await?;

                ctx.ensure_active()?;
                let ready = self.apply_statefulset(&namespace, statefulset).await?;
                debug!(
                    statefulset = %component_name(record, ORCHESTRATOR_COMPONENT),
                    ready,
                    "Orchestrator StatefulSet applied"
                );
                Some(ready)
            }
            None => None,
        };

        ctx.ensure_active()?;
        let status = build_status(record, mysql_ready, orchestrator_ready)?;
        self.write_status(&namespace, record, &status).await
    }
}

/// Status fields a pass may leave unset
const OPTIONAL_STATUS_FIELDS: [&str; 4] =
    ["message", "observedGeneration", "orchestrator", "conditions"];

/// Merge patch that replaces the stored status with `status`
///
/// Unset optional fields are sent as explicit nulls. A merge patch leaves
/// omitted keys alone, so without them a stale orchestrator status would
/// outlive the orchestrator.
pub fn status_patch(status: &PerconaServerMySQLStatus) -> Result<Value, StepError> {
    let mut value = serde_json::to_value(status)
        .map_err(|e| StepError::permanent(format!("serialize status: {e}")))?;
    if let Value::Object(fields) = &mut value {
        for field in OPTIONAL_STATUS_FIELDS {
            fields.entry(field).or_insert(Value::Null);
        }
    }
    Ok(json!({ "status": value }))
}

/// Status for the record given observed ready replica counts
///
/// Starts from the stored conditions so transition times only move when a
/// condition's status changes.
pub fn build_status(
    record: &PerconaServerMySQL,
    mysql_ready: i32,
    orchestrator_ready: Option<i32>,
) -> Result<PerconaServerMySQLStatus, StepError> {
    let spec = &record.spec;
    let mysql_size = if spec.pause {
        0
    } else {
        *defaulted(&spec.mysql.size, "spec.mysql.size")?
    };

    let orchestrator = if orchestrator_wanted(record) {
        let size = if spec.pause {
            0
        } else {
            *defaulted(&spec.orchestrator.size, "spec.orchestrator.size")?
        };
        Some(StatefulAppStatus {
            size,
            ready: orchestrator_ready.unwrap_or(0),
        })
    } else {
        None
    };

    let orchestrator_done = orchestrator
        .as_ref()
        .map(|o| o.ready >= o.size)
        .unwrap_or(true);
    let orchestrator_stopped = orchestrator.as_ref().map(|o| o.ready == 0).unwrap_or(true);

    let (state, reason) = if spec.pause {
        if mysql_ready == 0 && orchestrator_stopped {
            (ClusterState::Paused, "ClusterPaused")
        } else {
            (ClusterState::Initializing, "ClusterPausing")
        }
    } else if mysql_ready >= mysql_size && orchestrator_done {
        (ClusterState::Ready, "ClusterReady")
    } else {
        (ClusterState::Initializing, "ClusterInitializing")
    };

    let message = format!("{mysql_ready}/{mysql_size} mysql instances ready");
    let generation = record.metadata.generation;

    let mut conditions = record
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    set_condition(
        &mut conditions,
        CONDITION_TYPE_READY,
        if state == ClusterState::Ready {
            CONDITION_STATUS_TRUE
        } else {
            CONDITION_STATUS_FALSE
        },
        reason,
        &message,
        generation,
    );

    Ok(PerconaServerMySQLStatus {
        state,
        message: Some(message),
        observed_generation: generation,
        mysql: StatefulAppStatus {
            size: mysql_size,
            ready: mysql_ready,
        },
        orchestrator,
        conditions,
    })
}
