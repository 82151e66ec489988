//! Durable job persistence, event pub/sub, and activity indexing.
//!
//! This crate owns the Workflow Brain's data model (`JobV2`, `UnitMapping`,
//! `ActivityRef`, and friends) and the `StateStore` trait that the rest of
//! the Brain depends on for persistence. See spec §3 and §4.1.

pub mod error;
pub mod memory;
pub mod model;
pub mod store;

pub use error::{StateStoreError, StateStoreResult};
pub use memory::InMemoryStateStore;
pub use model::*;
pub use store::{JobFilter, JobMutator, StateStore};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_phase(id: &str, per_unit: bool, critical: bool, depends_on: &[&str]) -> PhaseDefinition {
        PhaseDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            executor: format!("test::{id}"),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            per_unit,
            critical,
            skip_if: None,
            inputs: vec![],
            outputs: vec![],
            api_calls_per_unit: ApiCallHint::Fixed(1),
            activation_slot: None,
        }
    }

    fn sample_job() -> JobV2 {
        JobV2::new(
            "test_workflow".to_string(),
            "user-1".to_string(),
            "controller-1".to_string(),
            "venue-1".to_string(),
            "tenant-1".to_string(),
            vec![sample_phase("validate", false, true, &[])],
            json!({}),
            json!({}),
        )
    }

    #[tokio::test]
    async fn create_job_fails_on_duplicate_id() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        store.create_job(job.clone()).await.unwrap();
        let err = store.create_job(job).await.unwrap_err();
        assert!(matches!(err, StateStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_job_composes_mutators() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        let id = job.id;
        store.create_job(job).await.unwrap();

        store
            .update_job(
                id,
                Box::new(|mut j| {
                    j.status = JobStatus::Validating;
                    Ok(j)
                }),
            )
            .await
            .unwrap();

        store
            .update_job(
                id,
                Box::new(|mut j| {
                    j.status = JobStatus::Running;
                    Ok(j)
                }),
            )
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn update_job_missing_returns_not_found() {
        let store = InMemoryStateStore::new();
        let err = store
            .update_job(Uuid::new_v4(), Box::new(Ok))
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn owner_lease_is_exclusive() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        let id = job.id;
        store.create_job(job).await.unwrap();

        assert!(store.try_acquire_owner(id, "worker-a").await.unwrap());
        assert!(store.try_acquire_owner(id, "worker-a").await.unwrap());
        assert!(!store.try_acquire_owner(id, "worker-b").await.unwrap());

        store.release_owner(id, "worker-a").await.unwrap();
        assert!(store.try_acquire_owner(id, "worker-b").await.unwrap());
    }

    #[tokio::test]
    async fn publish_without_subscriber_does_not_error() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        let id = job.id;
        store.create_job(job).await.unwrap();
        store.publish_event(id, json!({"type": "job_started"})).await;
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        let id = job.id;
        store.create_job(job).await.unwrap();

        let mut rx = store.subscribe(id);
        store.publish_event(id, json!({"type": "job_started"})).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event["type"], "job_started");
    }

    #[tokio::test]
    async fn activities_round_trip() {
        let store = InMemoryStateStore::new();
        let job = sample_job();
        let id = job.id;
        store.create_job(job).await.unwrap();

        let activity = ActivityRef {
            request_id: "req-1".to_string(),
            job_id: id,
            unit_id: None,
            phase_id: "validate".to_string(),
            controller_id: "controller-1".to_string(),
            status: ActivityStatus::Pending,
            started_at: chrono::Utc::now(),
            deadline: chrono::Utc::now() + chrono::Duration::minutes(3),
            error: None,
        };
        store.put_activity(activity).await.unwrap();

        let fetched = store.get_activity("req-1").await.unwrap().unwrap();
        assert_eq!(fetched.job_id, id);

        let listed = store.list_activities(id).await.unwrap();
        assert_eq!(listed.len(), 1);

        store.delete_activity("req-1").await.unwrap();
        assert!(store.get_activity("req-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_terminal_removes_expired_jobs_only() {
        let store = InMemoryStateStore::new();
        let mut job = sample_job();
        job.status = JobStatus::Completed;
        job.completed_at = Some(chrono::Utc::now() - chrono::Duration::days(2));
        let old_id = job.id;
        store.create_job(job).await.unwrap();

        let mut recent = sample_job();
        recent.status = JobStatus::Completed;
        recent.completed_at = Some(chrono::Utc::now());
        let recent_id = recent.id;
        store.create_job(recent).await.unwrap();

        let removed = store.cleanup_terminal(Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_job(old_id).await.unwrap().is_none());
        assert!(store.get_job(recent_id).await.unwrap().is_some());
    }
}
