use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Outcome of a resolved activity, returned to `wait`/`wait_batch` callers
/// (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityResult {
    Success,
    Failed(String),
    Timeout,
}

/// One request_id's status as reported by a single `poll_bulk` round-trip.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityPollResult {
    pub request_id: String,
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// The opaque handle spec §6 describes: the one capability the Tracker needs
/// from the external controller's REST adapter. Implemented by the real
/// controller client outside this crate; `brain-testkit::MockRemoteController`
/// implements it for tests.
#[async_trait]
pub trait RemoteActivityQuery: Send + Sync {
    async fn poll_bulk(
        &self,
        controller_id: &str,
        request_ids: &[String],
    ) -> Result<Vec<ActivityPollResult>, TrackerError>;
}

/// Tracker tunables (spec §4.4: default 3s poll, 3 minute per-activity
/// deadline, 1 hour per-job deadline). Loaded via the `config` crate so a
/// deployment can override any of these from file or environment without a
/// code change, matching how the rest of the ambient stack is configured.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    pub default_activity_deadline_secs: i64,
    pub default_job_deadline_secs: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            default_activity_deadline_secs: 180,
            default_job_deadline_secs: 3600,
        }
    }
}

impl TrackerConfig {
    /// Loads programmatic defaults, then an optional TOML file, then
    /// `ACTIVITY_TRACKER__*` environment variables, each layer overriding the
    /// last. `path` is a `config::File::with_name` stem (no extension, e.g.
    /// `"activity-tracker"` resolves `activity-tracker.toml` in the process's
    /// working directory); a missing file is not an error.
    pub fn load(path: impl AsRef<str>) -> Result<Self, TrackerError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(|e| {
                TrackerError::Config(format!("failed to seed defaults: {e}"))
            })?)
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("ACTIVITY_TRACKER").separator("__"),
            );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TrackerError::Config(e.to_string()))
    }
}
