use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use activity_tracker::ActivityTracker;
use event_publisher::EventPublisher;
use phase_registry::{PhaseExecError, PhaseRegistry};
use state_store::{JobError, JobMutator, PhaseDefinition, PhaseStatus, StateStore};
use uuid::Uuid;

use crate::context::PhaseContext;
use crate::resolve::resolve_inputs;

/// Runs one phase instance end to end: resolve inputs, validate the
/// contract, invoke the executor, persist outputs, and publish the
/// `phase_started`/`phase_completed` pair (spec.md §4.6 points 1-4). This is
/// the runtime's unit of work; the Brain calls it once per global phase and
/// once per eligible unit for per-unit phases.
#[allow(clippy::too_many_arguments)]
pub async fn run_phase_instance(
    state: Arc<dyn StateStore>,
    registry: Arc<PhaseRegistry>,
    tracker: Arc<ActivityTracker>,
    events: EventPublisher,
    job_id: Uuid,
    phase: &PhaseDefinition,
    unit_id: Option<&str>,
    cancel_flag: Arc<AtomicBool>,
    activity_deadline_secs: i64,
) -> Result<serde_json::Value, PhaseExecError> {
    let job = state
        .get_job(job_id)
        .await
        .map_err(|e| PhaseExecError::Internal(e.to_string()))?
        .ok_or_else(|| PhaseExecError::Internal(format!("job '{job_id}' vanished")))?;

    let executor = registry
        .get(&phase.executor)
        .map_err(|e| PhaseExecError::SetupError(e.to_string()))?;
    let contract = executor.contract();

    let resolved = resolve_inputs(&registry, phase, &job, unit_id)?;
    contract.validate_inputs(&resolved)?;

    let unit_number = unit_id.and_then(|id| job.unit_mappings.get(id)).map(|u| u.unit_number.clone());

    events
        .phase_started(job_id, &phase.id, &phase.name, unit_id)
        .await;

    let ctx = PhaseContext::new(
        state.clone(),
        tracker,
        events.clone(),
        job_id,
        phase.id.clone(),
        unit_id.map(str::to_string),
        unit_number,
        job.tenant_id.clone(),
        job.venue_id.clone(),
        job.controller_id.clone(),
        job.options.clone(),
        cancel_flag,
        activity_deadline_secs,
    );

    let started = Instant::now();
    let outcome = executor.execute(resolved, &ctx).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    record_outcome(&state, job_id, phase, unit_id, &outcome, duration_ms).await;

    events
        .phase_completed(job_id, &phase.id, &phase.name, unit_id, Some(duration_ms))
        .await;

    outcome
}

async fn record_outcome(
    state: &Arc<dyn StateStore>,
    job_id: Uuid,
    phase: &PhaseDefinition,
    unit_id: Option<&str>,
    outcome: &Result<serde_json::Value, PhaseExecError>,
    _duration_ms: i64,
) {
    let phase_id = phase.id.clone();
    let critical = phase.critical;
    let unit_id = unit_id.map(str::to_string);
    let outcome = outcome.clone();

    let mutator: JobMutator = Box::new(move |mut job| {
        match &unit_id {
            Some(unit_id) => {
                if let Some(unit) = job.unit_mappings.get_mut(unit_id) {
                    match &outcome {
                        Ok(outputs) => {
                            unit.phase_status.insert(phase_id.clone(), PhaseStatus::Completed);
                            unit.phase_outputs.insert(phase_id.clone(), outputs.clone());
                        }
                        Err(e) => {
                            unit.phase_status.insert(phase_id.clone(), PhaseStatus::Failed);
                            if critical {
                                unit.status = PhaseStatus::Failed;
                            }
                            unit.error = Some(JobError {
                                phase_id: phase_id.clone(),
                                unit_id: Some(unit_id.clone()),
                                message: e.to_string(),
                                category: Some(e.category()),
                                timestamp: chrono::Utc::now(),
                            });
                        }
                    }
                }
            }
            None => match &outcome {
                Ok(outputs) => {
                    job.global_phase_status.insert(phase_id.clone(), PhaseStatus::Completed);
                    job.global_phase_outputs.insert(phase_id.clone(), outputs.clone());
                }
                Err(_) => {
                    job.global_phase_status.insert(phase_id.clone(), PhaseStatus::Failed);
                }
            },
        }
        if let Err(e) = &outcome {
            job.record_error(JobError {
                phase_id: phase_id.clone(),
                unit_id: unit_id.clone(),
                message: e.to_string(),
                category: Some(e.category()),
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(job)
    });

    if let Err(e) = state.update_job(job_id, mutator).await {
        tracing::warn!(%job_id, phase_id = %phase.id, error = %e, "failed to persist phase outcome");
    }
}
