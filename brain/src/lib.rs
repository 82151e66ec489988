mod error;
mod scheduler;
mod workflow;

pub use error::BrainError;
pub use scheduler::{Brain, UnitInput};
pub use workflow::{Phase, Workflow};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use activity_tracker::{ActivityPollResult, ActivityTracker, RemoteActivityQuery, TrackerConfig, TrackerError};
    use async_trait::async_trait;
    use event_publisher::EventPublisher;
    use phase_registry::{ExecutionContext, FieldKind, InputField, MessageLevel, OutputField, PhaseContract, PhaseExecError, PhaseExecutor, PhaseRegistry};
    use serde_json::json;
    use state_store::{ActivationSlot, InMemoryStateStore, JobStatus, StateStore};

    use super::*;

    struct NoopController;

    #[async_trait]
    impl RemoteActivityQuery for NoopController {
        async fn poll_bulk(&self, _controller_id: &str, _request_ids: &[String]) -> Result<Vec<ActivityPollResult>, TrackerError> {
            Ok(vec![])
        }
    }

    struct ValidateExecutor;

    #[async_trait]
    impl PhaseExecutor for ValidateExecutor {
        fn contract(&self) -> PhaseContract {
            PhaseContract::new(vec![], vec![OutputField::new("ok", FieldKind::Bool)])
        }

        async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
            Ok(json!({ "ok": true }))
        }
    }

    struct ProvisionExecutor;

    #[async_trait]
    impl PhaseExecutor for ProvisionExecutor {
        fn contract(&self) -> PhaseContract {
            PhaseContract::new(
                vec![InputField::required("unit_id", FieldKind::String)],
                vec![OutputField::new("ssid", FieldKind::String)],
            )
        }

        async fn execute(&self, inputs: serde_json::Value, ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
            ctx.emit("provisioning", MessageLevel::Info, None).await;
            let unit_id = inputs["unit_id"].as_str().unwrap_or_default();
            Ok(json!({ "ssid": format!("ssid-{unit_id}") }))
        }
    }

    struct SummarizeExecutor;

    #[async_trait]
    impl PhaseExecutor for SummarizeExecutor {
        fn contract(&self) -> PhaseContract {
            PhaseContract::new(vec![], vec![OutputField::new("ssid", FieldKind::String)])
        }

        async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
            Ok(json!({ "summary_done": true }))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl PhaseExecutor for FailingExecutor {
        fn contract(&self) -> PhaseContract {
            PhaseContract::new(vec![], vec![])
        }

        async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
            Err(PhaseExecError::RemoteError("controller unreachable".into()))
        }
    }

    fn build_brain(registry: Arc<PhaseRegistry>) -> (Arc<Brain>, Arc<InMemoryStateStore>) {
        let state = InMemoryStateStore::new();
        let remote = Arc::new(NoopController);
        let tracker = ActivityTracker::new(state.clone(), remote, TrackerConfig::default());
        let events = EventPublisher::new(state.clone());
        let brain = Brain::new(state.clone(), registry, tracker, events, "worker-1");
        (brain, state)
    }

    fn two_unit_workflow() -> Workflow {
        Workflow::new(
            "activate_venue",
            vec![
                Phase::new("validate", "Validate", "validate").per_unit(false),
                Phase::new("provision_ssid", "Provision SSID", "provision_ssid")
                    .per_unit(true)
                    .depends_on(["validate"]),
                Phase::new("summarize", "Summarize", "summarize")
                    .per_unit(false)
                    .depends_on(["provision_ssid"]),
            ],
        )
        .requires_confirmation(false)
    }

    #[tokio::test]
    async fn job_with_global_and_per_unit_phases_runs_to_completion() {
        let registry = Arc::new(PhaseRegistry::new());
        registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
        registry.register("provision_ssid", Arc::new(ProvisionExecutor)).unwrap();
        registry.register("summarize", Arc::new(SummarizeExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        brain.register_workflow(two_unit_workflow()).unwrap();

        let job_id = brain
            .start_job(
                "activate_venue",
                vec![
                    UnitInput { unit_id: "unit-1".into(), unit_number: "101".into(), input_config: json!({}) },
                    UnitInput { unit_id: "unit-2".into(), unit_number: "102".into(), input_config: json!({}) },
                ],
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        wait_for_terminal(&state, job_id).await;

        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.global_phase_status["validate"], state_store::PhaseStatus::Completed);
        assert_eq!(job.global_phase_status["summarize"], state_store::PhaseStatus::Completed);
        assert_eq!(job.unit_mappings["unit-1"].phase_outputs["provision_ssid"]["ssid"], "ssid-unit-1");
        assert_eq!(job.unit_mappings["unit-2"].status, state_store::PhaseStatus::Completed);
    }

    #[tokio::test]
    async fn critical_per_unit_failure_fails_the_job_without_stalling() {
        let registry = Arc::new(PhaseRegistry::new());
        registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
        registry.register("provision_ssid", Arc::new(FailingExecutor)).unwrap();
        registry.register("summarize", Arc::new(SummarizeExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        brain.register_workflow(two_unit_workflow()).unwrap();

        let job_id = brain
            .start_job(
                "activate_venue",
                vec![UnitInput { unit_id: "unit-1".into(), unit_number: "101".into(), input_config: json!({}) }],
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        wait_for_terminal(&state, job_id).await;

        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!job.errors.is_empty());
    }

    #[tokio::test]
    async fn non_critical_failure_still_completes_the_job() {
        let registry = Arc::new(PhaseRegistry::new());
        registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
        registry.register("provision_ssid", Arc::new(FailingExecutor)).unwrap();
        registry.register("summarize", Arc::new(SummarizeExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        let workflow = Workflow::new(
            "activate_venue",
            vec![
                Phase::new("validate", "Validate", "validate").per_unit(false),
                Phase::new("provision_ssid", "Provision SSID", "provision_ssid")
                    .per_unit(true)
                    .critical(false)
                    .depends_on(["validate"]),
                Phase::new("summarize", "Summarize", "summarize")
                    .per_unit(false)
                    .depends_on(["provision_ssid"]),
            ],
        )
        .requires_confirmation(false);
        brain.register_workflow(workflow).unwrap();

        let job_id = brain
            .start_job(
                "activate_venue",
                vec![UnitInput { unit_id: "unit-1".into(), unit_number: "101".into(), input_config: json!({}) }],
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        wait_for_terminal(&state, job_id).await;

        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.global_phase_status["summarize"], state_store::PhaseStatus::Completed);
        assert_eq!(job.unit_mappings["unit-1"].status, state_store::PhaseStatus::Completed);
        assert_eq!(
            job.unit_mappings["unit-1"].phase_status["provision_ssid"],
            state_store::PhaseStatus::Failed
        );
    }

    #[tokio::test]
    async fn confirmation_gate_holds_the_job_until_confirmed() {
        let registry = Arc::new(PhaseRegistry::new());
        registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
        registry.register("provision_ssid", Arc::new(ProvisionExecutor)).unwrap();
        registry.register("summarize", Arc::new(SummarizeExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        brain.register_workflow(two_unit_workflow().requires_confirmation(true)).unwrap();

        let job_id = brain
            .start_job(
                "activate_venue",
                vec![UnitInput { unit_id: "unit-1".into(), unit_number: "101".into(), input_config: json!({}) }],
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::AwaitingConfirmation);

        brain.confirm_job(job_id).await.unwrap();
        wait_for_terminal(&state, job_id).await;

        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn activation_slots_cap_concurrent_holders() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct AcquireExecutor(Arc<AtomicUsize>, Arc<AtomicUsize>);
        #[async_trait]
        impl PhaseExecutor for AcquireExecutor {
            fn contract(&self) -> PhaseContract {
                PhaseContract::new(vec![], vec![])
            }
            async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
                let current = self.0.fetch_add(1, Ordering::SeqCst) + 1;
                self.1.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.0.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({}))
            }
        }
        struct ReleaseExecutor;
        #[async_trait]
        impl PhaseExecutor for ReleaseExecutor {
            fn contract(&self) -> PhaseContract {
                PhaseContract::new(vec![], vec![])
            }
            async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
                Ok(json!({}))
            }
        }

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let registry = Arc::new(PhaseRegistry::new());
        registry
            .register("acquire", Arc::new(AcquireExecutor(in_flight.clone(), max_observed.clone())))
            .unwrap();
        registry.register("release", Arc::new(ReleaseExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        let workflow = Workflow::new(
            "throttled",
            vec![
                Phase::new("acquire", "Acquire", "acquire")
                    .per_unit(true)
                    .activation_slot(ActivationSlot::Acquire),
                Phase::new("release", "Release", "release")
                    .per_unit(true)
                    .depends_on(["acquire"])
                    .activation_slot(ActivationSlot::Release),
            ],
        )
        .requires_confirmation(false)
        .max_activation_slots(2);
        brain.register_workflow(workflow).unwrap();

        let units = (0..6)
            .map(|i| UnitInput { unit_id: format!("unit-{i}"), unit_number: i.to_string(), input_config: json!({}) })
            .collect();

        let job_id = brain
            .start_job(
                "throttled",
                units,
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        wait_for_terminal(&state, job_id).await;

        assert!(max_observed.load(Ordering::SeqCst) <= 2);
        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancelling_a_job_awaiting_confirmation_finalizes_it_immediately() {
        let registry = Arc::new(PhaseRegistry::new());
        registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
        registry.register("provision_ssid", Arc::new(ProvisionExecutor)).unwrap();
        registry.register("summarize", Arc::new(SummarizeExecutor)).unwrap();

        let (brain, state) = build_brain(registry);
        brain.register_workflow(two_unit_workflow().requires_confirmation(true)).unwrap();

        let job_id = brain
            .start_job(
                "activate_venue",
                vec![UnitInput { unit_id: "unit-1".into(), unit_number: "101".into(), input_config: json!({}) }],
                "user-1".into(),
                "controller-1".into(),
                "venue-1".into(),
                "tenant-1".into(),
                json!({}),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        brain.cancel_job(job_id).await.unwrap();

        let job = state.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    async fn wait_for_terminal(state: &Arc<InMemoryStateStore>, job_id: uuid::Uuid) {
        for _ in 0..200 {
            if let Some(job) = state.get_job(job_id).await.unwrap() {
                if job.status.is_terminal() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not reach a terminal status in time");
    }
}
