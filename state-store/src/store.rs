use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StateStoreResult;
use crate::model::{ActivityRef, JobStatus, JobV2};

/// A boxed read-modify-write step for `StateStore::update_job`. Receives the
/// current snapshot, returns the snapshot to persist. Runs synchronously
/// inside the store's per-job critical section — keep it cheap and
/// side-effect free (spec §4.1: "atomic read-modify-write").
pub type JobMutator = Box<dyn FnOnce(JobV2) -> StateStoreResult<JobV2> + Send>;

/// Optional filter for `StateStore::list_jobs`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub workflow_name: Option<String>,
    pub owner: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &JobV2) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(name) = &self.workflow_name {
            if &job.workflow_name != name {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if job.owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Durable job persistence, event pub/sub, and outstanding-activity index.
/// See spec §4.1. Implementations must never hold state for one job while
/// servicing another, and must survive process restart so the Brain can
/// resume (spec §4.7 "Resume").
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create a new job record. Fails if `job.id` already exists.
    async fn create_job(&self, job: JobV2) -> StateStoreResult<()>;

    /// Fetch a job snapshot by id.
    async fn get_job(&self, job_id: Uuid) -> StateStoreResult<Option<JobV2>>;

    /// Atomic read-modify-write. The mutator receives a fresh snapshot and
    /// returns the new one to persist; concurrent updates to the same job
    /// are serialized.
    async fn update_job(&self, job_id: Uuid, mutator: JobMutator) -> StateStoreResult<JobV2>;

    /// List jobs matching an optional filter (admin overview, resume scan).
    async fn list_jobs(&self, filter: JobFilter) -> StateStoreResult<Vec<JobV2>>;

    /// Attempt to take ownership of a job for this worker process (spec §5
    /// leasing: "every job record has an `owner` field set by CAS"). Returns
    /// `true` if ownership was acquired or already held by `worker_id`.
    async fn try_acquire_owner(&self, job_id: Uuid, worker_id: &str) -> StateStoreResult<bool>;

    /// Release ownership if currently held by `worker_id`.
    async fn release_owner(&self, job_id: Uuid, worker_id: &str) -> StateStoreResult<()>;

    /// Fire-and-forget broadcast of a pre-serialized event onto
    /// `events:{job_id}`. Must never fail the caller even if no subscriber
    /// exists (spec §4.5: "publisher failures must not crash the Brain").
    async fn publish_event(&self, job_id: Uuid, event: serde_json::Value);

    /// Subscribe to `events:{job_id}`. Used by event consumers (e.g. an
    /// SSE relay) — out of scope for this crate beyond the channel itself.
    fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<serde_json::Value>;

    async fn put_activity(&self, activity: ActivityRef) -> StateStoreResult<()>;
    async fn get_activity(&self, request_id: &str) -> StateStoreResult<Option<ActivityRef>>;
    async fn delete_activity(&self, request_id: &str) -> StateStoreResult<()>;
    async fn list_activities(&self, job_id: Uuid) -> StateStoreResult<Vec<ActivityRef>>;

    /// All activities still `PENDING`, across every job. The Activity
    /// Tracker's poll loop and its restart recovery both enumerate this set
    /// rather than keeping a parallel in-memory index (spec §4.4: "Tracker
    /// survives Brain restart by re-reading outstanding activities from the
    /// state store").
    async fn list_pending_activities(&self) -> StateStoreResult<Vec<ActivityRef>>;

    /// Remove terminal jobs (and their activities/event channels) whose
    /// `completed_at` is older than `ttl`. Spec §4.1 TTL policy: "completed
    /// jobs retained for at least 24h".
    async fn cleanup_terminal(&self, ttl: Duration) -> StateStoreResult<usize>;
}
