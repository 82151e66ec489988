use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One event type per spec.md §4.5: `job_started`, `job_completed`,
/// `job_failed`, `job_cancelled`, `phase_started`, `phase_completed`,
/// `task_started`, `task_completed`, `progress`, `message`. Each variant
/// carries a typed payload instead of a loose map, so callers get compile-time
/// field checking while the wire shape still serializes to the flat
/// `{type, timestamp, data}` envelope the original publisher used.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    JobStarted {
        job_id: Uuid,
        workflow_name: String,
        total_phases: usize,
        venue_id: String,
    },
    JobCompleted {
        job_id: Uuid,
        status: String,
        created_resources: Value,
        total_phases: usize,
        completed_phases: usize,
        failed_phases: usize,
        duration_seconds: Option<f64>,
    },
    JobFailed {
        job_id: Uuid,
        status: String,
        errors: Value,
        total_phases: usize,
        completed_phases: usize,
        failed_phases: usize,
    },
    JobCancelled {
        job_id: Uuid,
        status: String,
        message: String,
    },
    PhaseStarted {
        phase_id: String,
        phase_name: String,
        unit_id: Option<String>,
    },
    PhaseCompleted {
        phase_id: String,
        phase_name: String,
        unit_id: Option<String>,
        duration_ms: Option<i64>,
    },
    TaskStarted {
        phase_id: String,
        task_id: String,
        task_name: String,
    },
    TaskCompleted {
        phase_id: String,
        task_id: String,
        task_name: String,
        status: Option<String>,
    },
    Progress {
        progress: Value,
    },
    Message {
        message: String,
        level: String,
        details: Value,
    },
}

/// The wire envelope every event serializes into: `{type, timestamp, data}`
/// (spec.md §4.5). `#[serde(flatten)]` spreads `WorkflowEvent`'s own
/// `#[serde(tag/content)]` fields alongside `timestamp`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl EventEnvelope {
    pub fn new(event: WorkflowEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
