mod events;
mod publisher;

pub use events::{EventEnvelope, WorkflowEvent};
pub use publisher::EventPublisher;

#[cfg(test)]
mod tests {
    use state_store::InMemoryStateStore;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber_with_flat_envelope() {
        let state = InMemoryStateStore::new();
        let job_id = Uuid::new_v4();
        let mut rx = state.subscribe(job_id);

        let publisher = EventPublisher::new(state);
        publisher.job_started(job_id, "activate_venue", 3, "venue-1").await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received["type"], "job_started");
        assert_eq!(received["data"]["workflow_name"], "activate_venue");
        assert!(received.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn publish_without_subscriber_does_not_panic() {
        let state = InMemoryStateStore::new();
        let publisher = EventPublisher::new(state);
        publisher
            .message(Uuid::new_v4(), "hello", "info", None)
            .await;
    }

    #[tokio::test]
    async fn message_defaults_details_to_empty_object() {
        let state = InMemoryStateStore::new();
        let job_id = Uuid::new_v4();
        let mut rx = state.subscribe(job_id);
        let publisher = EventPublisher::new(state);

        publisher.message(job_id, "hi", "warning", None).await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received["data"]["details"], serde_json::json!({}));
        assert_eq!(received["data"]["level"], "warning");
    }

    #[tokio::test]
    async fn phase_started_omits_unit_id_as_null_for_global_phases() {
        let state = InMemoryStateStore::new();
        let job_id = Uuid::new_v4();
        let mut rx = state.subscribe(job_id);
        let publisher = EventPublisher::new(state);

        publisher
            .phase_started(job_id, "validate_inputs", "Validate Inputs", None)
            .await;

        let received = rx.try_recv().unwrap();
        assert!(received["data"]["unit_id"].is_null());
    }
}
