use std::sync::Arc;

use serde_json::Value;
use state_store::StateStore;
use tracing::warn;
use uuid::Uuid;

use crate::events::{EventEnvelope, WorkflowEvent};

/// Publishes structured progress records to a job's event channel
/// (spec.md §4.5). This is the only component that writes to the channel;
/// everything else observes it through `StateStore::subscribe`.
#[derive(Clone)]
pub struct EventPublisher {
    state: Arc<dyn StateStore>,
}

impl EventPublisher {
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    /// Publishes `event` on `job_id`'s channel. Never fails the caller:
    /// serialization or publish errors are logged and swallowed, matching
    /// `workflow/events.py`'s log-and-continue body ("publisher failures
    /// must not crash the Brain").
    pub async fn publish(&self, job_id: Uuid, event: WorkflowEvent) {
        let envelope = EventEnvelope::new(event);
        match serde_json::to_value(&envelope) {
            Ok(value) => self.state.publish_event(job_id, value).await,
            Err(e) => warn!(%job_id, error = %e, "failed to serialize workflow event"),
        }
    }

    pub async fn job_started(&self, job_id: Uuid, workflow_name: &str, total_phases: usize, venue_id: &str) {
        self.publish(
            job_id,
            WorkflowEvent::JobStarted {
                job_id,
                workflow_name: workflow_name.to_string(),
                total_phases,
                venue_id: venue_id.to_string(),
            },
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn job_completed(
        &self,
        job_id: Uuid,
        status: &str,
        created_resources: Value,
        total_phases: usize,
        completed_phases: usize,
        failed_phases: usize,
        duration_seconds: Option<f64>,
    ) {
        self.publish(
            job_id,
            WorkflowEvent::JobCompleted {
                job_id,
                status: status.to_string(),
                created_resources,
                total_phases,
                completed_phases,
                failed_phases,
                duration_seconds,
            },
        )
        .await;
    }

    pub async fn job_failed(
        &self,
        job_id: Uuid,
        status: &str,
        errors: Value,
        total_phases: usize,
        completed_phases: usize,
        failed_phases: usize,
    ) {
        self.publish(
            job_id,
            WorkflowEvent::JobFailed {
                job_id,
                status: status.to_string(),
                errors,
                total_phases,
                completed_phases,
                failed_phases,
            },
        )
        .await;
    }

    pub async fn job_cancelled(&self, job_id: Uuid, status: &str) {
        self.publish(
            job_id,
            WorkflowEvent::JobCancelled {
                job_id,
                status: status.to_string(),
                message: "Job cancelled by user".to_string(),
            },
        )
        .await;
    }

    pub async fn phase_started(&self, job_id: Uuid, phase_id: &str, phase_name: &str, unit_id: Option<&str>) {
        self.publish(
            job_id,
            WorkflowEvent::PhaseStarted {
                phase_id: phase_id.to_string(),
                phase_name: phase_name.to_string(),
                unit_id: unit_id.map(str::to_string),
            },
        )
        .await;
    }

    pub async fn phase_completed(
        &self,
        job_id: Uuid,
        phase_id: &str,
        phase_name: &str,
        unit_id: Option<&str>,
        duration_ms: Option<i64>,
    ) {
        self.publish(
            job_id,
            WorkflowEvent::PhaseCompleted {
                phase_id: phase_id.to_string(),
                phase_name: phase_name.to_string(),
                unit_id: unit_id.map(str::to_string),
                duration_ms,
            },
        )
        .await;
    }

    pub async fn task_started(&self, job_id: Uuid, phase_id: &str, task_id: &str, task_name: &str) {
        self.publish(
            job_id,
            WorkflowEvent::TaskStarted {
                phase_id: phase_id.to_string(),
                task_id: task_id.to_string(),
                task_name: task_name.to_string(),
            },
        )
        .await;
    }

    pub async fn task_completed(
        &self,
        job_id: Uuid,
        phase_id: &str,
        task_id: &str,
        task_name: &str,
        status: Option<&str>,
    ) {
        self.publish(
            job_id,
            WorkflowEvent::TaskCompleted {
                phase_id: phase_id.to_string(),
                task_id: task_id.to_string(),
                task_name: task_name.to_string(),
                status: status.map(str::to_string),
            },
        )
        .await;
    }

    pub async fn progress(&self, job_id: Uuid, progress: Value) {
        self.publish(job_id, WorkflowEvent::Progress { progress }).await;
    }

    pub async fn message(&self, job_id: Uuid, message: &str, level: &str, details: Option<Value>) {
        self.publish(
            job_id,
            WorkflowEvent::Message {
                message: message.to_string(),
                level: level.to_string(),
                details: details.unwrap_or_else(|| Value::Object(Default::default())),
            },
        )
        .await;
    }
}
