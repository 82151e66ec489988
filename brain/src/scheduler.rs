use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use activity_tracker::ActivityTracker;
use dashmap::DashMap;
use dep_graph::DependencyGraph;
use event_publisher::EventPublisher;
use phase_registry::PhaseRegistry;
use phase_runtime::skip_if::{EvalContext, SkipIfExpr};
use phase_runtime::{parallel_map, run_phase_instance};
use chrono::Duration;
use serde_json::{json, Value};
use state_store::{
    ErrorCategory, JobError, JobFilter, JobMutator, JobStatus, JobV2, PhaseDefinition, PhaseStatus,
    StateStore,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BrainError;
use crate::workflow::Workflow;

const DEFAULT_PHASE_CONCURRENCY: usize = 10;

/// One unit to fan a per-unit phase out over, supplied at job admission.
#[derive(Debug, Clone)]
pub struct UnitInput {
    pub unit_id: String,
    pub unit_number: String,
    pub input_config: Value,
}

/// Orchestrates a job end to end (spec.md §4.7). Owns the shared handles
/// every phase instance needs and the workflow catalog; per-job scheduling
/// state (activation slots, cancellation flags, activation permits) lives in
/// maps keyed by `job_id` so one job's bookkeeping never blocks another's.
pub struct Brain {
    state: Arc<dyn StateStore>,
    registry: Arc<PhaseRegistry>,
    tracker: Arc<ActivityTracker>,
    events: EventPublisher,
    workflows: DashMap<String, Arc<Workflow>>,
    activation_semaphores: DashMap<Uuid, Arc<Semaphore>>,
    activation_permits: DashMap<(Uuid, String), OwnedSemaphorePermit>,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
    worker_id: String,
    activity_deadline_secs: i64,
    job_deadline_secs: i64,
}

/// `phase_id` tag `record_error` uses for the job-level deadline's
/// synthetic error entry (spec.md §5 "per-job global deadline").
const JOB_DEADLINE_PHASE_ID: &str = "_job_deadline";

impl Brain {
    pub fn new(
        state: Arc<dyn StateStore>,
        registry: Arc<PhaseRegistry>,
        tracker: Arc<ActivityTracker>,
        events: EventPublisher,
        worker_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            registry,
            tracker,
            events,
            workflows: DashMap::new(),
            activation_semaphores: DashMap::new(),
            activation_permits: DashMap::new(),
            cancel_flags: DashMap::new(),
            worker_id: worker_id.into(),
            activity_deadline_secs: 180,
            job_deadline_secs: 3600,
        })
    }

    /// Startup-only registration; read-only thereafter (spec.md §4.2's
    /// read-only-after-boot contract, applied to the workflow catalog too).
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), BrainError> {
        let errors = workflow.validate_definition(&self.registry);
        if !errors.is_empty() {
            return Err(BrainError::UnregisteredExecutor(workflow.name.clone(), errors.join("; ")));
        }
        if self.workflows.contains_key(&workflow.name) {
            return Err(BrainError::WorkflowAlreadyRegistered(workflow.name));
        }
        self.workflows.insert(workflow.name.clone(), Arc::new(workflow));
        Ok(())
    }

    pub fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).map(|w| w.clone())
    }

    /// `start_job` (spec.md §4.7 "Job admission"): build the `JobV2`, persist
    /// as `VALIDATING`, publish `job_started`, then run phase 0 and gate on
    /// confirmation.
    pub async fn start_job(
        self: &Arc<Self>,
        workflow_name: &str,
        units: Vec<UnitInput>,
        user_id: String,
        controller_id: String,
        venue_id: String,
        tenant_id: String,
        options: Value,
    ) -> Result<Uuid, BrainError> {
        let workflow = self
            .get_workflow(workflow_name)
            .ok_or_else(|| BrainError::UnknownWorkflow(workflow_name.to_string()))?;

        let merged_options = merge_options(&workflow.default_options, &options);
        let phase_definitions = workflow.phase_definitions();

        let input_data = json!({ "units": units.iter().map(|u| json!({
            "unit_id": u.unit_id,
            "unit_number": u.unit_number,
            "input_config": u.input_config,
        })).collect::<Vec<_>>() });

        let mut job = JobV2::new(
            workflow.name.clone(),
            user_id,
            controller_id,
            venue_id,
            tenant_id,
            phase_definitions,
            merged_options,
            input_data,
        );
        for unit in units {
            let mapping = state_store::UnitMapping::new(unit.unit_id.clone(), unit.unit_number, unit.input_config);
            job.unit_mappings.insert(unit.unit_id, mapping);
        }
        job.status = JobStatus::Validating;
        job.started_at = Some(chrono::Utc::now());

        let job_id = job.id;
        let total_phases = job.phase_definitions.len();
        self.state.create_job(job).await?;
        self.events
            .job_started(job_id, workflow_name, total_phases, &venue_id)
            .await;

        self.cancel_flags.insert(job_id, Arc::new(AtomicBool::new(false)));
        self.activation_semaphores.insert(
            job_id,
            Arc::new(Semaphore::new(workflow.max_activation_slots as usize)),
        );

        if let Some(validate_phase) = workflow.get_phase("validate") {
            let definition = validate_phase.clone().into_definition();
            let outcome = run_phase_instance(
                self.state.clone(),
                self.registry.clone(),
                self.tracker.clone(),
                self.events.clone(),
                job_id,
                &definition,
                None,
                self.cancel_flags.get(&job_id).unwrap().clone(),
                self.activity_deadline_secs,
            )
            .await;

            if let Err(e) = outcome {
                warn!(%job_id, error = %e, "validation phase failed during job admission");
                self.finalize_job(job_id).await?;
                return Ok(job_id);
            }
        }

        let next_status = if workflow.requires_confirmation {
            JobStatus::AwaitingConfirmation
        } else {
            JobStatus::Running
        };
        self.transition_status(job_id, next_status).await?;

        if !workflow.requires_confirmation {
            self.spawn_run_job(job_id);
        }

        Ok(job_id)
    }

    /// User confirms the validation result; moves the job into `RUNNING` and
    /// starts the execution loop.
    pub async fn confirm_job(self: &Arc<Self>, job_id: Uuid) -> Result<(), BrainError> {
        let job = self
            .state
            .get_job(job_id)
            .await?
            .ok_or(BrainError::JobNotFound(job_id))?;
        if job.status != JobStatus::AwaitingConfirmation {
            return Err(BrainError::NotAwaitingConfirmation(job_id));
        }
        self.transition_status(job_id, JobStatus::Running).await?;
        self.spawn_run_job(job_id);
        Ok(())
    }

    /// `cancel(job_id)` (spec.md §5): sets `cancel_requested` and fails
    /// outstanding activities. A `RUNNING` job notices the flag on its next
    /// loop iteration and finalizes itself; any other status (e.g. still
    /// `AWAITING_CONFIRMATION`, with no loop to notice) is finalized here
    /// directly so the terminal `job_cancelled` event is always published
    /// exactly once.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), BrainError> {
        let job = self
            .state
            .update_job(
                job_id,
                Box::new(|mut job| {
                    job.cancel_requested = true;
                    Ok(job)
                }),
            )
            .await?;
        if let Some(flag) = self.cancel_flags.get(&job_id) {
            flag.store(true, Ordering::SeqCst);
        }
        self.tracker
            .cancel_job(job_id)
            .await
            .map_err(|e| BrainError::StateStore(state_store::StateStoreError::Mutator(e.to_string())))?;
        if job.status != JobStatus::Running {
            self.finalize_job(job_id).await?;
        }
        Ok(())
    }

    fn spawn_run_job(self: &Arc<Self>, job_id: Uuid) {
        let brain = self.clone();
        tokio::spawn(async move {
            if let Err(e) = brain.run_job(job_id).await {
                warn!(%job_id, error = %e, "job execution loop exited with an error");
            }
        });
    }

    /// The execution loop of spec.md §4.7 steps 1-7, repeated until no
    /// phases remain ready.
    async fn run_job(self: Arc<Self>, job_id: Uuid) -> Result<(), BrainError> {
        self.cancel_flags.entry(job_id).or_insert_with(|| Arc::new(AtomicBool::new(false)));
        self.activation_semaphores.entry(job_id).or_insert_with(|| Arc::new(Semaphore::new(12)));

        loop {
            if self.enforce_job_deadline(job_id).await? {
                break;
            }

            self.recompute_global_status(job_id).await?;

            let job = self.state.get_job(job_id).await?.ok_or(BrainError::JobNotFound(job_id))?;
            if job.cancel_requested {
                break;
            }

            let graph = match DependencyGraph::new(&job.phase_definitions) {
                Ok(graph) => graph,
                Err(errors) => return Err(BrainError::InvalidGraph(job.workflow_name.clone(), errors)),
            };

            let completed_global: HashSet<String> = job
                .global_phase_status
                .iter()
                .filter(|(_, status)| status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();

            let ready = graph.ready(&completed_global);
            if ready.is_empty() {
                break;
            }

            let by_id: HashMap<String, PhaseDefinition> =
                job.phase_definitions.iter().map(|p| (p.id.clone(), p.clone())).collect();

            let mut to_run = Vec::new();
            for phase_id in ready {
                let Some(phase) = by_id.get(&phase_id) else { continue };
                if let Some(expr_src) = &phase.skip_if {
                    if self.phase_should_skip(expr_src, &job) {
                        self.mark_phase_skipped(job_id, phase).await?;
                        continue;
                    }
                }
                to_run.push(phase.clone());
            }

            let (global_phases, unit_phases): (Vec<_>, Vec<_>) =
                to_run.into_iter().partition(|p| !p.per_unit);

            let mut global_handles = Vec::new();
            for phase in global_phases {
                let brain = self.clone();
                global_handles.push(tokio::spawn(async move { brain.run_global_phase(job_id, phase).await }));
            }

            let mut unit_handles = Vec::new();
            for phase in unit_phases {
                let brain = self.clone();
                let job = job.clone();
                unit_handles.push(tokio::spawn(async move { brain.run_unit_phase(job_id, phase, &job).await }));
            }

            let mut any_critical_failure = false;
            for handle in global_handles {
                if handle.await.unwrap_or(Ok(false))? {
                    any_critical_failure = true;
                }
            }
            for handle in unit_handles {
                if handle.await.unwrap_or(Ok(false))? {
                    any_critical_failure = true;
                }
            }

            self.publish_progress(job_id).await;

            if any_critical_failure {
                break;
            }
        }

        self.finalize_job(job_id).await?;
        self.cancel_flags.remove(&job_id);
        self.activation_semaphores.remove(&job_id);
        Ok(())
    }

    /// Checks the per-job global deadline (spec.md §5, default 1 hour from
    /// `started_at`). Once exceeded, records a synthetic error so
    /// `finalize_job` fails the job with reason "timeout"; returns `true` if
    /// the caller should stop scheduling new phases.
    async fn enforce_job_deadline(&self, job_id: Uuid) -> Result<bool, BrainError> {
        let job = self.state.get_job(job_id).await?.ok_or(BrainError::JobNotFound(job_id))?;
        let Some(started_at) = job.started_at else { return Ok(false) };
        if chrono::Utc::now() - started_at <= Duration::seconds(self.job_deadline_secs) {
            return Ok(false);
        }
        if job.errors.iter().any(|e| e.phase_id == JOB_DEADLINE_PHASE_ID) {
            return Ok(true);
        }

        warn!(%job_id, "job exceeded its global deadline, failing with reason timeout");
        self.state
            .update_job(
                job_id,
                Box::new(move |mut job| {
                    if !job.errors.iter().any(|e| e.phase_id == JOB_DEADLINE_PHASE_ID) {
                        job.record_error(JobError {
                            phase_id: JOB_DEADLINE_PHASE_ID.to_string(),
                            unit_id: None,
                            message: "timeout".to_string(),
                            category: Some(ErrorCategory::ActivityTimeout),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    Ok(job)
                }),
            )
            .await?;
        Ok(true)
    }

    /// Promotes a per-unit phase's `global_phase_status` to `COMPLETED` or
    /// `FAILED` once every non-globally-failed unit has reached a terminal
    /// status for it — otherwise `ready()` would never unblock a phase that
    /// depends on a per-unit phase, since `global_phase_status` is the only
    /// thing it consults (spec.md §4.7 step 6).
    async fn recompute_global_status(&self, job_id: Uuid) -> Result<(), BrainError> {
        self.state
            .update_job(
                job_id,
                Box::new(|mut job| {
                    let phase_defs = job.phase_definitions.clone();
                    for phase in phase_defs.iter().filter(|p| p.per_unit) {
                        let already_terminal = job
                            .global_phase_status
                            .get(&phase.id)
                            .map(|s| s.is_terminal())
                            .unwrap_or(false);
                        if already_terminal {
                            continue;
                        }

                        let statuses: Vec<Option<PhaseStatus>> = job
                            .unit_mappings
                            .values()
                            .filter(|u| u.status != PhaseStatus::Failed)
                            .map(|u| u.phase_status.get(&phase.id).copied())
                            .collect();

                        if statuses.iter().any(|s| !matches!(s, Some(st) if st.is_terminal())) {
                            continue;
                        }

                        let any_failed = statuses.iter().any(|s| *s == Some(PhaseStatus::Failed));
                        let status = if any_failed { PhaseStatus::Failed } else { PhaseStatus::Completed };
                        job.global_phase_status.insert(phase.id.clone(), status);
                    }
                    Ok(job)
                }),
            )
            .await?;
        Ok(())
    }

    fn phase_should_skip(&self, expr_src: &str, job: &JobV2) -> bool {
        match SkipIfExpr::parse(expr_src) {
            Ok(expr) => expr.eval(&EvalContext {
                options: &job.options,
                outputs: &job.global_phase_outputs,
            }),
            Err(e) => {
                warn!(workflow = %job.workflow_name, expr = expr_src, error = %e, "failed to parse skip_if, treating as false");
                false
            }
        }
    }

    async fn mark_phase_skipped(&self, job_id: Uuid, phase: &PhaseDefinition) -> Result<(), BrainError> {
        let phase_id = phase.id.clone();
        let per_unit = phase.per_unit;
        self.state
            .update_job(
                job_id,
                Box::new(move |mut job| {
                    if per_unit {
                        for unit in job.unit_mappings.values_mut() {
                            if unit.status != PhaseStatus::Failed {
                                unit.phase_status.insert(phase_id.clone(), PhaseStatus::Skipped);
                            }
                        }
                    }
                    job.global_phase_status.insert(phase_id.clone(), PhaseStatus::Skipped);
                    Ok(job)
                }),
            )
            .await?;
        Ok(())
    }

    /// Runs a ready global phase; returns true if its failure should abort
    /// the job (spec.md §4.7 step 3).
    async fn run_global_phase(self: Arc<Self>, job_id: Uuid, phase: PhaseDefinition) -> Result<bool, BrainError> {
        let cancel_flag = self.cancel_flags.get(&job_id).map(|f| f.clone()).unwrap_or_default();
        let outcome = run_phase_instance(
            self.state.clone(),
            self.registry.clone(),
            self.tracker.clone(),
            self.events.clone(),
            job_id,
            &phase,
            None,
            cancel_flag,
            self.activity_deadline_secs,
        )
        .await;
        Ok(outcome.is_err() && phase.critical)
    }

    /// Runs a ready per-unit phase across every eligible unit under the
    /// per-(job, phase) concurrency cap, honoring activation-slot
    /// acquire/release (spec.md §4.7 step 4).
    async fn run_unit_phase(self: Arc<Self>, job_id: Uuid, phase: PhaseDefinition, job: &JobV2) -> Result<bool, BrainError> {
        let max_concurrent = job
            .options
            .get("phase_concurrency")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PHASE_CONCURRENCY as u64) as usize;

        let eligible: Vec<String> = job
            .unit_mappings
            .values()
            .filter(|unit| unit.status != PhaseStatus::Failed && unit.status != PhaseStatus::Skipped)
            .filter(|unit| {
                !matches!(unit.phase_status.get(&phase.id), Some(s) if s.is_terminal())
            })
            .filter(|unit| self.unit_upstream_ready(&phase, unit, job))
            .map(|unit| unit.unit_id.clone())
            .collect();

        if eligible.is_empty() {
            return Ok(false);
        }

        let brain = self.clone();
        let critical = phase.critical;
        let phase = Arc::new(phase);
        let outcome = parallel_map(eligible, max_concurrent, move |unit_id| {
            let brain = brain.clone();
            let phase = phase.clone();
            async move { brain.run_one_unit(job_id, phase, unit_id).await }
        })
        .await;

        Ok(critical && !outcome.failed.is_empty())
    }

    fn unit_upstream_ready(&self, phase: &PhaseDefinition, unit: &state_store::UnitMapping, job: &JobV2) -> bool {
        let by_id: HashMap<&str, &PhaseDefinition> =
            job.phase_definitions.iter().map(|p| (p.id.as_str(), p)).collect();
        phase.depends_on.iter().all(|dep_id| {
            let Some(dep_def) = by_id.get(dep_id.as_str()) else { return false };
            if dep_def.per_unit {
                matches!(
                    unit.phase_status.get(dep_id.as_str()),
                    Some(PhaseStatus::Completed) | Some(PhaseStatus::Skipped)
                )
            } else {
                matches!(
                    job.global_phase_status.get(dep_id.as_str()),
                    Some(PhaseStatus::Completed) | Some(PhaseStatus::Skipped)
                )
            }
        })
    }

    async fn run_one_unit(
        self: Arc<Self>,
        job_id: Uuid,
        phase: Arc<PhaseDefinition>,
        unit_id: String,
    ) -> Result<(), phase_registry::PhaseExecError> {
        if phase.activation_slot == Some(state_store::ActivationSlot::Acquire) {
            if let Some(semaphore) = self.activation_semaphores.get(&job_id).map(|s| s.clone()) {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| phase_registry::PhaseExecError::Internal(e.to_string()))?;
                self.activation_permits.insert((job_id, unit_id.clone()), permit);
            }
        }

        let cancel_flag = self.cancel_flags.get(&job_id).map(|f| f.clone()).unwrap_or_default();
        let result = run_phase_instance(
            self.state.clone(),
            self.registry.clone(),
            self.tracker.clone(),
            self.events.clone(),
            job_id,
            &phase,
            Some(&unit_id),
            cancel_flag,
            self.activity_deadline_secs,
        )
        .await;

        if phase.activation_slot == Some(state_store::ActivationSlot::Release) {
            self.activation_permits.remove(&(job_id, unit_id));
        }

        result.map(|_| ())
    }

    async fn publish_progress(&self, job_id: Uuid) {
        if let Ok(Some(job)) = self.state.get_job(job_id).await {
            let progress = compute_progress(&job);
            self.events.progress(job_id, progress).await;
        }
    }

    async fn transition_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), BrainError> {
        self.state
            .update_job(
                job_id,
                Box::new(move |mut job| {
                    job.status = status;
                    Ok(job)
                }),
            )
            .await?;
        Ok(())
    }

    async fn finalize_job(&self, job_id: Uuid) -> Result<(), BrainError> {
        let job = self.state.get_job(job_id).await?.ok_or(BrainError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            return Ok(());
        }

        let any_critical_failure = job.phase_definitions.iter().any(|p| {
            p.critical && job.global_phase_status.get(&p.id) == Some(&PhaseStatus::Failed)
        });
        let deadline_exceeded = job.errors.iter().any(|e| e.phase_id == JOB_DEADLINE_PHASE_ID);

        let final_status = if job.cancel_requested {
            JobStatus::Cancelled
        } else if any_critical_failure || deadline_exceeded {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };

        self.state
            .update_job(
                job_id,
                Box::new(move |mut job| {
                    job.status = final_status;
                    job.completed_at = Some(chrono::Utc::now());
                    for unit in job.unit_mappings.values_mut() {
                        if unit.status != PhaseStatus::Failed {
                            unit.status = PhaseStatus::Completed;
                        }
                    }
                    Ok(job)
                }),
            )
            .await?;

        let job = self.state.get_job(job_id).await?.ok_or(BrainError::JobNotFound(job_id))?;
        let total_phases = job.phase_definitions.len();
        let completed_phases = job
            .global_phase_status
            .values()
            .filter(|s| **s == PhaseStatus::Completed)
            .count();
        let failed_phases = job
            .global_phase_status
            .values()
            .filter(|s| **s == PhaseStatus::Failed)
            .count();

        match final_status {
            JobStatus::Completed => {
                let duration = job
                    .completed_at
                    .zip(job.started_at)
                    .map(|(c, s)| (c - s).num_milliseconds() as f64 / 1000.0);
                self.events
                    .job_completed(
                        job_id,
                        "COMPLETED",
                        json!(job.created_resources),
                        total_phases,
                        completed_phases,
                        failed_phases,
                        duration,
                    )
                    .await;
            }
            JobStatus::Failed => {
                self.events
                    .job_failed(job_id, "FAILED", json!(job.errors), total_phases, completed_phases, failed_phases)
                    .await;
            }
            JobStatus::Cancelled => {
                self.events.job_cancelled(job_id, "CANCELLED").await;
            }
            _ => {}
        }

        info!(%job_id, status = ?final_status, "job reached terminal status");
        Ok(())
    }

    /// `resume_all` (spec.md §4.7 "Resume"): leases every `RUNNING` job this
    /// worker can claim, re-registers its tracker state (already durable),
    /// and re-enters the loop at the persisted state.
    pub async fn resume_all(self: &Arc<Self>) -> Result<usize, BrainError> {
        let running = self
            .state
            .list_jobs(JobFilter {
                status: Some(JobStatus::Running),
                ..Default::default()
            })
            .await?;

        let mut resumed = 0;
        for job in running {
            if self.state.try_acquire_owner(job.id, &self.worker_id).await? {
                self.tracker
                    .recover()
                    .await
                    .map_err(|e| BrainError::StateStore(state_store::StateStoreError::Mutator(e.to_string())))?;
                self.cancel_flags.insert(job.id, Arc::new(AtomicBool::new(job.cancel_requested)));
                if !self.activation_semaphores.contains_key(&job.id) {
                    if let Some(workflow) = self.get_workflow(&job.workflow_name) {
                        self.activation_semaphores
                            .insert(job.id, Arc::new(Semaphore::new(workflow.max_activation_slots as usize)));
                    }
                }
                self.spawn_run_job(job.id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }
}

fn merge_options(defaults: &Value, overrides: &Value) -> Value {
    let mut merged = defaults.as_object().cloned().unwrap_or_default();
    if let Some(obj) = overrides.as_object() {
        for (k, v) in obj {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

fn compute_progress(job: &JobV2) -> Value {
    let total_units = job.unit_mappings.len();
    let completed_units = job
        .unit_mappings
        .values()
        .filter(|u| u.status == PhaseStatus::Completed)
        .count();
    let failed_units = job
        .unit_mappings
        .values()
        .filter(|u| u.status == PhaseStatus::Failed)
        .count();
    json!({
        "total_units": total_units,
        "completed_units": completed_units,
        "failed_units": failed_units,
    })
}

