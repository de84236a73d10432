//! Tests for the reconciliation loop
//!
//! These tests drive `ReconciliationLoop` with in-memory fakes for the store
//! and both convergence steps, and verify:
//! - Absent records are a successful no-op
//! - Invalid records never reach a step
//! - Steps run in order and the first failure short-circuits
//! - Errors carry the stage and retryability the trigger needs
//! - Cancellation is observed at every stage boundary

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use kube::core::ErrorResponse;
    use tokio_test::{assert_err, assert_ok};
    use tokio_util::sync::CancellationToken;

    use crate::controller::{
        ConvergenceStep, DesiredStateStore, ReconcileContext, ReconcileError, ReconcileIdentity,
        ReconciliationLoop, Retryability, Stage, StepError, StepName, StoreError,
    };
    use crate::crd::{MySQLSpec, PerconaServerMySQL, PerconaServerMySQLSpec};

    type CallLog = Arc<Mutex<Vec<String>>>;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    enum StoreBehavior {
        Present(PerconaServerMySQL),
        Absent,
        Unavailable,
        /// Cancel the pass while the fetch is in flight, then return the record
        CancelDuringFetch(CancellationToken, PerconaServerMySQL),
        /// Never return
        Hang,
    }

    struct FakeStore {
        behavior: StoreBehavior,
        log: CallLog,
    }

    #[async_trait]
    impl DesiredStateStore for FakeStore {
        async fn get(
            &self,
            identity: &ReconcileIdentity,
        ) -> Result<Option<PerconaServerMySQL>, StoreError> {
            self.log.lock().unwrap().push(format!("get {identity}"));
            match &self.behavior {
                StoreBehavior::Present(record) => Ok(Some(record.clone())),
                StoreBehavior::Absent => Ok(None),
                StoreBehavior::Unavailable => Err(StoreError::from(kube::Error::Api(
                    ErrorResponse {
                        status: "Failure".to_string(),
                        message: "etcdserver: request timed out".to_string(),
                        reason: "ServiceUnavailable".to_string(),
                        code: 503,
                    },
                ))),
                StoreBehavior::CancelDuringFetch(token, record) => {
                    token.cancel();
                    Ok(Some(record.clone()))
                }
                StoreBehavior::Hang => futures::future::pending().await,
            }
        }
    }

    /// Step that records each call and replays scripted results, then succeeds
    struct FakeStep {
        name: StepName,
        log: CallLog,
        script: Mutex<VecDeque<Result<(), StepError>>>,
        seen: Arc<Mutex<Vec<PerconaServerMySQL>>>,
        /// Cancelled by the step itself before it returns
        cancels: Option<CancellationToken>,
    }

    impl FakeStep {
        fn new(name: StepName, log: &CallLog) -> Self {
            Self {
                name,
                log: log.clone(),
                script: Mutex::new(VecDeque::new()),
                seen: Arc::new(Mutex::new(Vec::new())),
                cancels: None,
            }
        }

        fn cancelling(mut self, token: CancellationToken) -> Self {
            self.cancels = Some(token);
            self
        }

        fn then(self, result: Result<(), StepError>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }
    }

    #[async_trait]
    impl ConvergenceStep for FakeStep {
        fn name(&self) -> StepName {
            self.name
        }

        async fn apply(
            &self,
            _ctx: &ReconcileContext,
            record: &PerconaServerMySQL,
        ) -> Result<(), StepError> {
            self.log.lock().unwrap().push(self.name.to_string());
            self.seen.lock().unwrap().push(record.clone());
            if let Some(token) = &self.cancels {
                token.cancel();
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn identity() -> ReconcileIdentity {
        ReconcileIdentity::new("db", "cluster1").unwrap()
    }

    fn valid_record() -> PerconaServerMySQL {
        let mut record = PerconaServerMySQL::new(
            "cluster1",
            PerconaServerMySQLSpec {
                mysql: MySQLSpec {
                    version: Some("8.0.36".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        record.metadata.namespace = Some("db".to_string());
        record.spec.orchestrator.enabled = true;
        record
    }

    fn invalid_record() -> PerconaServerMySQL {
        let mut record = valid_record();
        record.spec.mysql.version = None;
        record.spec.mysql.size = Some(0);
        record
    }

    fn build(
        behavior: StoreBehavior,
        secrets: impl FnOnce(&CallLog) -> FakeStep,
        topology: impl FnOnce(&CallLog) -> FakeStep,
    ) -> (ReconciliationLoop<FakeStore, FakeStep, FakeStep>, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let store = FakeStore {
            behavior,
            log: log.clone(),
        };
        let secrets = secrets(&log);
        let topology = topology(&log);
        (ReconciliationLoop::new(store, secrets, topology), log)
    }

    fn secrets_ok(log: &CallLog) -> FakeStep {
        FakeStep::new(StepName::Secrets, log)
    }

    fn topology_ok(log: &CallLog) -> FakeStep {
        FakeStep::new(StepName::Topology, log)
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn context() -> ReconcileContext {
        ReconcileContext::new(&identity(), CancellationToken::new())
    }

    // -----------------------------------------------------------------------
    // Happy paths
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_absent_record_is_noop_success() {
        let (reconciler, log) = build(StoreBehavior::Absent, secrets_ok, topology_ok);

        assert_ok!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(calls(&log), vec!["get db/cluster1"]);
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let (reconciler, log) =
            build(StoreBehavior::Present(valid_record()), secrets_ok, topology_ok);

        assert_ok!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(calls(&log), vec!["get db/cluster1", "secrets", "topology"]);
    }

    #[tokio::test]
    async fn test_steps_receive_normalized_record() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_step = seen.clone();
        let (reconciler, _log) = build(
            StoreBehavior::Present(valid_record()),
            secrets_ok,
            move |log| FakeStep {
                seen: seen_by_step,
                ..topology_ok(log)
            },
        );

        assert_ok!(reconciler.reconcile(&context(), &identity()).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].spec.secrets_name.as_deref(), Some("cluster1-secrets"));
        assert_eq!(seen[0].spec.mysql.size, Some(3));
    }

    #[tokio::test]
    async fn test_repeated_pass_has_same_outcome() {
        let (reconciler, log) =
            build(StoreBehavior::Present(valid_record()), secrets_ok, topology_ok);

        assert_ok!(reconciler.reconcile(&context(), &identity()).await);
        assert_ok!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(
            calls(&log),
            vec![
                "get db/cluster1",
                "secrets",
                "topology",
                "get db/cluster1",
                "secrets",
                "topology"
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_store_failure_is_fetch_error() {
        let (reconciler, log) = build(StoreBehavior::Unavailable, secrets_ok, topology_ok);

        let err = assert_err!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(err.stage(), Stage::Fetch);
        assert_eq!(err.retryability(), Retryability::Retry);
        assert!(err.to_string().contains("get cluster db/cluster1"));
        assert_eq!(calls(&log), vec!["get db/cluster1"]);
    }

    #[tokio::test]
    async fn test_invalid_record_never_reaches_steps() {
        let (reconciler, log) =
            build(StoreBehavior::Present(invalid_record()), secrets_ok, topology_ok);

        let err = assert_err!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(err.stage(), Stage::Validation);
        assert_eq!(err.retryability(), Retryability::RequiresSpecChange);
        match &err {
            ReconcileError::Validation(v) => {
                assert!(v.has_field("spec.mysql.version"));
                assert!(v.has_field("spec.mysql.size"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(calls(&log), vec!["get db/cluster1"]);
    }

    #[tokio::test]
    async fn test_secrets_failure_short_circuits() {
        let (reconciler, log) = build(
            StoreBehavior::Present(valid_record()),
            |log| secrets_ok(log).then(Err(StepError::permanent("secret is immutable"))),
            topology_ok,
        );

        let err = assert_err!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(err.stage(), Stage::Secrets);
        assert_eq!(err.retryability(), Retryability::RequiresSpecChange);
        assert_eq!(
            err.to_string(),
            "secrets: reconcile secrets: secret is immutable"
        );
        assert_eq!(calls(&log), vec!["get db/cluster1", "secrets"]);
    }

    #[tokio::test]
    async fn test_topology_transient_failure_then_retry_succeeds() {
        let (reconciler, log) = build(
            StoreBehavior::Present(valid_record()),
            secrets_ok,
            |log| topology_ok(log).then(Err(StepError::transient("api server timeout"))),
        );

        let err = assert_err!(reconciler.reconcile(&context(), &identity()).await);
        assert!(matches!(
            err,
            ReconcileError::Step {
                step: StepName::Topology,
                ..
            }
        ));
        assert_eq!(err.retryability(), Retryability::Retry);
        assert!(err.to_string().starts_with("topology"));
        assert_eq!(
            err.to_string(),
            "topology: reconcile topology: api server timeout"
        );

        // The trigger retries; the second pass re-runs both steps and converges.
        assert_ok!(reconciler.reconcile(&context(), &identity()).await);
        assert_eq!(
            calls(&log),
            vec![
                "get db/cluster1",
                "secrets",
                "topology",
                "get db/cluster1",
                "secrets",
                "topology"
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (reconciler, log) =
            build(StoreBehavior::Present(valid_record()), secrets_ok, topology_ok);
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ReconcileContext::new(&identity(), token);

        let err = assert_err!(reconciler.reconcile(&ctx, &identity()).await);
        assert!(matches!(
            err,
            ReconcileError::Cancelled {
                stage: Stage::Fetch
            }
        ));
        assert_eq!(err.retryability(), Retryability::Cancelled);
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_during_fetch_skips_steps() {
        let token = CancellationToken::new();
        let (reconciler, log) = build(
            StoreBehavior::CancelDuringFetch(token.clone(), valid_record()),
            secrets_ok,
            topology_ok,
        );
        let ctx = ReconcileContext::new(&identity(), token);

        let err = assert_err!(reconciler.reconcile(&ctx, &identity()).await);
        assert!(matches!(
            err,
            ReconcileError::Cancelled {
                stage: Stage::Validation
            }
        ));
        assert_eq!(calls(&log), vec!["get db/cluster1"]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hung_fetch() {
        let (reconciler, _log) = build(StoreBehavior::Hang, secrets_ok, topology_ok);
        let token = CancellationToken::new();
        let ctx = ReconcileContext::new(&identity(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let err = assert_err!(reconciler.reconcile(&ctx, &identity()).await);
        assert_eq!(err.stage(), Stage::Fetch);
        assert!(err.is_cancelled());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_between_steps_skips_topology() {
        let token = CancellationToken::new();
        let cancel_in_secrets = token.clone();
        let (reconciler, log) = build(
            StoreBehavior::Present(valid_record()),
            move |log| secrets_ok(log).cancelling(cancel_in_secrets),
            topology_ok,
        );
        let ctx = ReconcileContext::new(&identity(), token);

        let err = assert_err!(reconciler.reconcile(&ctx, &identity()).await);
        assert!(matches!(
            err,
            ReconcileError::Cancelled {
                stage: Stage::Topology
            }
        ));
        assert_eq!(err.retryability(), Retryability::Cancelled);
        assert_eq!(calls(&log), vec!["get db/cluster1", "secrets"]);
    }

    #[tokio::test]
    async fn test_step_observing_cancellation_reports_cancelled() {
        let (reconciler, log) = build(
            StoreBehavior::Present(valid_record()),
            |log| secrets_ok(log).then(Err(StepError::cancelled())),
            topology_ok,
        );

        let err = assert_err!(reconciler.reconcile(&context(), &identity()).await);
        assert!(matches!(
            err,
            ReconcileError::Cancelled {
                stage: Stage::Secrets
            }
        ));
        assert_eq!(calls(&log), vec!["get db/cluster1", "secrets"]);
    }
}
