#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("activity '{0}' is not registered")]
    NotFound(String),

    #[error("activity timed out")]
    Timeout,

    #[error("activity failed: {0}")]
    Failed(String),

    #[error("remote poll failed: {0}")]
    RemoteQuery(String),

    #[error(transparent)]
    StateStore(#[from] state_store::StateStoreError),

    #[error("invalid tracker configuration: {0}")]
    Config(String),
}
