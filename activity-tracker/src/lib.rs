mod error;
mod tracker;
mod types;

pub use error::TrackerError;
pub use tracker::ActivityTracker;
pub use types::{ActivityPollResult, ActivityResult, RemoteActivityQuery, TrackerConfig};
