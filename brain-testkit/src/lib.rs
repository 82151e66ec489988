//! Shared fixtures for integration-testing the Workflow Brain: a scriptable
//! remote controller mock and a representative multi-phase workflow, reused
//! across this crate's own `tests/` and available to downstream crates that
//! want the same harness.

mod mock_controller;
mod sample_workflow;

pub use mock_controller::MockRemoteController;
pub use sample_workflow::{build_workflow, register_executors};

use std::sync::Arc;

use activity_tracker::{ActivityTracker, TrackerConfig};
use event_publisher::EventPublisher;
use phase_registry::PhaseRegistry;
use state_store::InMemoryStateStore;

/// Bundle of shared handles a test needs to construct one or more `Brain`
/// instances against the same backing store, mirroring how a real deployment
/// wires `state-store` + `activity-tracker` + `event-publisher` once and
/// hands them to every worker process.
pub struct Harness {
    pub state: Arc<InMemoryStateStore>,
    pub tracker: Arc<ActivityTracker>,
    pub events: EventPublisher,
    pub registry: Arc<PhaseRegistry>,
    pub remote: Arc<MockRemoteController>,
}

impl Harness {
    pub fn new() -> Self {
        let state = InMemoryStateStore::new();
        let remote = MockRemoteController::new();
        let config = TrackerConfig { poll_interval_secs: 1, ..TrackerConfig::default() };
        let tracker = ActivityTracker::new(state.clone(), remote.clone(), config);
        tracker.clone().spawn();
        let events = EventPublisher::new(state.clone());
        let registry = Arc::new(PhaseRegistry::new());
        register_executors(&registry);
        Self { state, tracker, events, registry, remote }
    }

    /// A second set of process-level handles sharing the same state store and
    /// activity tracker, standing in for a fresh worker process picking up
    /// after a crash.
    pub fn reattach(&self) -> (Arc<InMemoryStateStore>, Arc<ActivityTracker>, EventPublisher, Arc<PhaseRegistry>) {
        (self.state.clone(), self.tracker.clone(), self.events.clone(), self.registry.clone())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
