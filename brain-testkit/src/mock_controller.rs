use std::sync::Arc;

use activity_tracker::{ActivityPollResult, RemoteActivityQuery, TrackerError};
use async_trait::async_trait;
use dashmap::DashMap;

/// A scriptable `RemoteActivityQuery` standing in for the wireless controller
/// during integration tests. Requests resolve successfully by default after
/// one poll; call `fail` or `hang` beforehand to script a different outcome
/// for a specific `request_id`.
#[derive(Default)]
pub struct MockRemoteController {
    outcomes: DashMap<String, Outcome>,
    pub poll_calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Hang,
}

impl MockRemoteController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outcomes: DashMap::new(),
            poll_calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })
    }

    pub fn fail(&self, request_id: impl Into<String>) {
        self.outcomes.insert(request_id.into(), Outcome::Fail);
    }

    pub fn hang(&self, request_id: impl Into<String>) {
        self.outcomes.insert(request_id.into(), Outcome::Hang);
    }
}

#[async_trait]
impl RemoteActivityQuery for MockRemoteController {
    async fn poll_bulk(&self, _controller_id: &str, request_ids: &[String]) -> Result<Vec<ActivityPollResult>, TrackerError> {
        self.poll_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(request_ids
            .iter()
            .filter_map(|id| match self.outcomes.get(id).map(|o| *o).unwrap_or(Outcome::Succeed) {
                Outcome::Succeed => Some(ActivityPollResult { request_id: id.clone(), done: true, error: None }),
                Outcome::Fail => Some(ActivityPollResult {
                    request_id: id.clone(),
                    done: true,
                    error: Some("remote operation failed".into()),
                }),
                Outcome::Hang => None,
            })
            .collect())
    }
}
