use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use state_store::{ActivityRef, ActivityStatus, StateStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::types::{ActivityResult, RemoteActivityQuery, TrackerConfig};

/// Centralizes polling of the external controller's asynchronous operations
/// (spec §4.4). Holds no activity state of its own beyond in-flight waiters;
/// the source of truth is always the state store, so a restarted process
/// picks up exactly where the previous one left off.
pub struct ActivityTracker {
    state: Arc<dyn StateStore>,
    remote: Arc<dyn RemoteActivityQuery>,
    waiters: DashMap<String, Vec<oneshot::Sender<ActivityResult>>>,
    config: TrackerConfig,
}

impl ActivityTracker {
    pub fn new(
        state: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteActivityQuery>,
        config: TrackerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            remote,
            waiters: DashMap::new(),
            config,
        })
    }

    /// Records a new outstanding activity (spec §4.4
    /// `register(request_id, job_id, unit_id?, phase_id, deadline?)`).
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        request_id: String,
        job_id: Uuid,
        unit_id: Option<String>,
        phase_id: String,
        controller_id: String,
        deadline: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), TrackerError> {
        let started_at = Utc::now();
        let deadline = deadline.unwrap_or_else(|| {
            started_at + Duration::seconds(self.config.default_activity_deadline_secs)
        });
        self.state
            .put_activity(ActivityRef {
                request_id,
                job_id,
                unit_id,
                phase_id,
                controller_id,
                status: ActivityStatus::Pending,
                started_at,
                deadline,
                error: None,
            })
            .await?;
        Ok(())
    }

    /// Suspends until `request_id` resolves. Returns immediately if it has
    /// already resolved (spec §4.4: "a call to wait on an id that is already
    /// resolved returns immediately").
    pub async fn wait(&self, request_id: &str) -> Result<ActivityResult, TrackerError> {
        let activity = self
            .state
            .get_activity(request_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(request_id.to_string()))?;

        if let Some(result) = resolved_result(&activity) {
            return Ok(result);
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.entry(request_id.to_string()).or_default().push(tx);

        // Re-check after registering the waiter in case the poll loop
        // resolved it between the read above and the push.
        if let Some(activity) = self.state.get_activity(request_id).await? {
            if let Some(result) = resolved_result(&activity) {
                self.wake(request_id, result.clone());
                return Ok(result);
            }
        }

        rx.await
            .map_err(|_| TrackerError::RemoteQuery("waiter channel dropped".into()))
    }

    /// Same as `wait`, for multiple ids; order-preserving (spec §4.4).
    pub async fn wait_batch(
        &self,
        request_ids: &[String],
    ) -> Result<Vec<ActivityResult>, TrackerError> {
        let mut results = Vec::with_capacity(request_ids.len());
        for id in request_ids {
            results.push(self.wait(id).await?);
        }
        Ok(results)
    }

    /// Resolves every outstanding activity for `job_id` as `FAILED` with
    /// reason "cancelled" (spec §4.4 cancellation policy).
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), TrackerError> {
        let activities = self.state.list_activities(job_id).await?;
        for activity in activities {
            if activity.status == ActivityStatus::Pending {
                self.resolve(&activity.request_id, ActivityStatus::Failed, Some("cancelled".into()))
                    .await?;
            }
        }
        Ok(())
    }

    /// One tick of the poll loop: deadline sweep, then a bulk poll per
    /// controller group (spec §4.4).
    pub async fn tick(&self) -> Result<(), TrackerError> {
        let pending = self.state.list_pending_activities().await?;
        let now = Utc::now();

        let mut still_pending = Vec::new();
        for activity in pending {
            if activity.deadline <= now {
                self.resolve(&activity.request_id, ActivityStatus::Timeout, None)
                    .await?;
            } else {
                still_pending.push(activity);
            }
        }

        let mut by_controller: HashMap<String, Vec<String>> = HashMap::new();
        for activity in &still_pending {
            by_controller
                .entry(activity.controller_id.clone())
                .or_default()
                .push(activity.request_id.clone());
        }

        for (controller_id, request_ids) in by_controller {
            let polled = match self.remote.poll_bulk(&controller_id, &request_ids).await {
                Ok(polled) => polled,
                Err(e) => {
                    warn!(controller_id, error = %e, "bulk poll failed, will retry next tick");
                    continue;
                }
            };
            for result in polled {
                if !result.done {
                    continue;
                }
                let status = if result.error.is_some() {
                    ActivityStatus::Failed
                } else {
                    ActivityStatus::Success
                };
                self.resolve(&result.request_id, status, result.error).await?;
            }
        }

        Ok(())
    }

    /// Spawns the `tokio::time::interval`-driven poll loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = std::time::Duration::from_secs(self.config.poll_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    warn!(error = %e, "activity tracker poll tick failed");
                }
            }
        })
    }

    async fn resolve(
        &self,
        request_id: &str,
        status: ActivityStatus,
        error: Option<String>,
    ) -> Result<(), TrackerError> {
        let Some(mut activity) = self.state.get_activity(request_id).await? else {
            return Ok(());
        };
        if activity.status != ActivityStatus::Pending {
            return Ok(());
        }
        activity.status = status;
        activity.error = error.clone();
        self.state.put_activity(activity).await?;

        let result = match status {
            ActivityStatus::Success => ActivityResult::Success,
            ActivityStatus::Failed => ActivityResult::Failed(error.unwrap_or_default()),
            ActivityStatus::Timeout => ActivityResult::Timeout,
            ActivityStatus::Pending => unreachable!("resolve called with Pending status"),
        };
        debug!(request_id, ?status, "activity resolved");
        self.wake(request_id, result);
        Ok(())
    }

    fn wake(&self, request_id: &str, result: ActivityResult) {
        if let Some((_, senders)) = self.waiters.remove(request_id) {
            for tx in senders {
                let _ = tx.send(result.clone());
            }
        }
    }

    /// Re-registers the poll loop's view of outstanding activities after a
    /// process restart. Since this tracker keeps no state beyond in-flight
    /// waiters, recovery is simply the next `tick()` reading the state store
    /// (spec §4.4: "survives Brain restart by re-reading outstanding
    /// activities from the state store"). Callers that need to log recovery
    /// can use this to report the count.
    pub async fn recover(&self) -> Result<usize, TrackerError> {
        let pending = self.state.list_pending_activities().await?;
        info!(count = pending.len(), "activity tracker recovered outstanding activities");
        Ok(pending.len())
    }
}

fn resolved_result(activity: &ActivityRef) -> Option<ActivityResult> {
    match activity.status {
        ActivityStatus::Pending => None,
        ActivityStatus::Success => Some(ActivityResult::Success),
        ActivityStatus::Failed => Some(ActivityResult::Failed(
            activity.error.clone().unwrap_or_default(),
        )),
        ActivityStatus::Timeout => Some(ActivityResult::Timeout),
    }
}
