use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use activity_tracker::{ActivityResult, ActivityTracker};
use async_trait::async_trait;
use chrono::Utc;
use event_publisher::EventPublisher;
use phase_registry::{ExecutionContext, MessageLevel, PhaseExecError};
use state_store::{JobMutator, ResourceRecord, StateStore};
use uuid::Uuid;

/// Concrete capability set handed to a running phase instance, implementing
/// `phase_registry::ExecutionContext`. One instance per phase invocation;
/// cheap to construct since every field is a shared handle or a plain value
/// (spec.md §4.6 point 5, §9 "capability set, not inheritance").
pub struct PhaseContext {
    pub(crate) state: Arc<dyn StateStore>,
    pub(crate) tracker: Arc<ActivityTracker>,
    pub(crate) events: EventPublisher,
    pub(crate) job_id: Uuid,
    pub(crate) phase_id: String,
    pub(crate) unit_id: Option<String>,
    pub(crate) unit_number: Option<String>,
    pub(crate) tenant_id: String,
    pub(crate) venue_id: String,
    pub(crate) controller_id: String,
    pub(crate) options: serde_json::Value,
    pub(crate) cancel_flag: Arc<AtomicBool>,
    pub(crate) activity_deadline_secs: i64,
}

impl PhaseContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<dyn StateStore>,
        tracker: Arc<ActivityTracker>,
        events: EventPublisher,
        job_id: Uuid,
        phase_id: String,
        unit_id: Option<String>,
        unit_number: Option<String>,
        tenant_id: String,
        venue_id: String,
        controller_id: String,
        options: serde_json::Value,
        cancel_flag: Arc<AtomicBool>,
        activity_deadline_secs: i64,
    ) -> Self {
        Self {
            state,
            tracker,
            events,
            job_id,
            phase_id,
            unit_id,
            unit_number,
            tenant_id,
            venue_id,
            controller_id,
            options,
            cancel_flag,
            activity_deadline_secs,
        }
    }
}

#[async_trait]
impl ExecutionContext for PhaseContext {
    fn job_id(&self) -> Uuid {
        self.job_id
    }
    fn phase_id(&self) -> &str {
        &self.phase_id
    }
    fn unit_id(&self) -> Option<&str> {
        self.unit_id.as_deref()
    }
    fn unit_number(&self) -> Option<&str> {
        self.unit_number.as_deref()
    }
    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
    fn venue_id(&self) -> &str {
        &self.venue_id
    }
    fn controller_id(&self) -> &str {
        &self.controller_id
    }
    fn options(&self) -> &serde_json::Value {
        &self.options
    }
    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    async fn emit(&self, message: &str, level: MessageLevel, details: Option<serde_json::Value>) {
        let level_str = match level {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
            MessageLevel::Success => "success",
        };
        self.events.message(self.job_id, message, level_str, details).await;
    }

    async fn fire_and_wait(&self, request_id: String) -> Result<(), PhaseExecError> {
        if self.is_cancelled() {
            return Err(PhaseExecError::Cancelled);
        }

        let deadline = Utc::now() + chrono::Duration::seconds(self.activity_deadline_secs);
        self.tracker
            .register(
                request_id.clone(),
                self.job_id,
                self.unit_id.clone(),
                self.phase_id.clone(),
                self.controller_id.clone(),
                Some(deadline),
            )
            .await
            .map_err(|e| PhaseExecError::Internal(e.to_string()))?;

        match self
            .tracker
            .wait(&request_id)
            .await
            .map_err(|e| PhaseExecError::Internal(e.to_string()))?
        {
            ActivityResult::Success => Ok(()),
            ActivityResult::Failed(reason) if reason == "cancelled" => Err(PhaseExecError::Cancelled),
            ActivityResult::Failed(reason) => Err(PhaseExecError::RemoteError(reason)),
            ActivityResult::Timeout => Err(PhaseExecError::ActivityTimeout),
        }
    }

    async fn wait_batch(&self, request_ids: Vec<String>) -> Result<Vec<Result<(), PhaseExecError>>, PhaseExecError> {
        if self.is_cancelled() {
            return Err(PhaseExecError::Cancelled);
        }
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = Utc::now() + chrono::Duration::seconds(self.activity_deadline_secs);
        for request_id in &request_ids {
            self.tracker
                .register(
                    request_id.clone(),
                    self.job_id,
                    self.unit_id.clone(),
                    self.phase_id.clone(),
                    self.controller_id.clone(),
                    Some(deadline),
                )
                .await
                .map_err(|e| PhaseExecError::Internal(e.to_string()))?;
        }

        let results = self
            .tracker
            .wait_batch(&request_ids)
            .await
            .map_err(|e| PhaseExecError::Internal(e.to_string()))?;

        Ok(results
            .into_iter()
            .map(|result| match result {
                ActivityResult::Success => Ok(()),
                ActivityResult::Failed(reason) if reason == "cancelled" => Err(PhaseExecError::Cancelled),
                ActivityResult::Failed(reason) => Err(PhaseExecError::RemoteError(reason)),
                ActivityResult::Timeout => Err(PhaseExecError::ActivityTimeout),
            })
            .collect())
    }

    async fn track_resource(&self, resource_type: &str, record: ResourceRecord) {
        let resource_type = resource_type.to_string();
        let mutator: JobMutator = Box::new(move |mut job| {
            job.track_resource(&resource_type, record);
            Ok(job)
        });
        if let Err(e) = self.state.update_job(self.job_id, mutator).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "failed to record tracked resource");
        }
    }
}
