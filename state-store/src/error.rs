use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("job {0} already exists")]
    AlreadyExists(Uuid),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("update to job {0} conflicted with a concurrent writer after {1} retries")]
    UpdateConflict(Uuid, u32),

    #[error("job {0} is owned by worker {1}")]
    OwnedByOther(Uuid, String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mutator error: {0}")]
    Mutator(String),
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;
