use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StateStoreError, StateStoreResult};
use crate::model::{ActivityRef, ActivityStatus, JobV2};
use crate::store::{JobFilter, JobMutator, StateStore};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// In-process `StateStore` backed by `DashMap` + `parking_lot::RwLock`,
/// following `WorkflowManager`'s `Arc<DashMap<Uuid, ManagedWorkflow>>` shape:
/// sharded concurrent maps for jobs and activities, one broadcast channel per
/// job for `events:{job_id}`. Suitable as the single store for one worker
/// process; a durable backend (e.g. Redis, as the original implementation
/// used) would implement the same trait.
#[derive(Debug)]
pub struct InMemoryStateStore {
    jobs: DashMap<Uuid, RwLock<JobV2>>,
    activities: DashMap<String, ActivityRef>,
    channels: DashMap<Uuid, broadcast::Sender<serde_json::Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: DashMap::new(),
            activities: DashMap::new(),
            channels: DashMap::new(),
        })
    }

    fn channel_for(&self, job_id: Uuid) -> broadcast::Sender<serde_json::Value> {
        self.channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Spawn the background sweep that enforces the TTL policy of spec §4.1.
    /// Mirrors the Activity Tracker's `tokio::time::interval` poll loop.
    pub fn spawn_ttl_sweeper(self: &Arc<Self>, ttl: Duration, interval: StdDuration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match store.cleanup_terminal(ttl).await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "state store TTL sweep removed terminal jobs");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "state store TTL sweep failed"),
                }
            }
        })
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_job(&self, job: JobV2) -> StateStoreResult<()> {
        let id = job.id;
        if self.jobs.contains_key(&id) {
            return Err(StateStoreError::AlreadyExists(id));
        }
        self.jobs.insert(id, RwLock::new(job));
        debug!(job_id = %id, "created job");
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> StateStoreResult<Option<JobV2>> {
        Ok(self.jobs.get(&job_id).map(|entry| entry.read().clone()))
    }

    async fn update_job(&self, job_id: Uuid, mutator: JobMutator) -> StateStoreResult<JobV2> {
        let entry = self
            .jobs
            .get(&job_id)
            .ok_or(StateStoreError::NotFound(job_id))?;

        let mut guard = entry.write();
        let snapshot = guard.clone();
        let updated = mutator(snapshot)?;
        *guard = updated.clone();
        Ok(updated)
    }

    async fn list_jobs(&self, filter: JobFilter) -> StateStoreResult<Vec<JobV2>> {
        Ok(self
            .jobs
            .iter()
            .map(|entry| entry.read().clone())
            .filter(|job| filter.matches(job))
            .collect())
    }

    async fn try_acquire_owner(&self, job_id: Uuid, worker_id: &str) -> StateStoreResult<bool> {
        let entry = self
            .jobs
            .get(&job_id)
            .ok_or(StateStoreError::NotFound(job_id))?;
        let mut guard = entry.write();
        match &guard.owner {
            None => {
                guard.owner = Some(worker_id.to_string());
                Ok(true)
            }
            Some(current) if current == worker_id => Ok(true),
            Some(_) => Ok(false),
        }
    }

    async fn release_owner(&self, job_id: Uuid, worker_id: &str) -> StateStoreResult<()> {
        let entry = self
            .jobs
            .get(&job_id)
            .ok_or(StateStoreError::NotFound(job_id))?;
        let mut guard = entry.write();
        if guard.owner.as_deref() == Some(worker_id) {
            guard.owner = None;
        }
        Ok(())
    }

    async fn publish_event(&self, job_id: Uuid, event: serde_json::Value) {
        let tx = self.channel_for(job_id);
        // Fire-and-forget: no subscriber is not an error (spec §4.5).
        let _ = tx.send(event);
    }

    fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<serde_json::Value> {
        self.channel_for(job_id).subscribe()
    }

    async fn put_activity(&self, activity: ActivityRef) -> StateStoreResult<()> {
        self.activities.insert(activity.request_id.clone(), activity);
        Ok(())
    }

    async fn get_activity(&self, request_id: &str) -> StateStoreResult<Option<ActivityRef>> {
        Ok(self.activities.get(request_id).map(|e| e.clone()))
    }

    async fn delete_activity(&self, request_id: &str) -> StateStoreResult<()> {
        self.activities.remove(request_id);
        Ok(())
    }

    async fn list_activities(&self, job_id: Uuid) -> StateStoreResult<Vec<ActivityRef>> {
        Ok(self
            .activities
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn list_pending_activities(&self) -> StateStoreResult<Vec<ActivityRef>> {
        Ok(self
            .activities
            .iter()
            .filter(|e| e.status == ActivityStatus::Pending)
            .map(|e| e.clone())
            .collect())
    }

    async fn cleanup_terminal(&self, ttl: Duration) -> StateStoreResult<usize> {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter_map(|entry| {
                let job = entry.read();
                match job.completed_at {
                    Some(completed_at) if job.status.is_terminal() && now - completed_at > ttl => {
                        Some(job.id)
                    }
                    _ => None,
                }
            })
            .collect();

        for job_id in &expired {
            self.jobs.remove(job_id);
            self.channels.remove(job_id);
            self.activities.retain(|_, a| a.job_id != *job_id);
        }

        Ok(expired.len())
    }
}
