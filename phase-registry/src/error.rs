/// Error taxonomy for a single phase instance invocation. See spec §7.
#[derive(Debug, thiserror::Error, Clone)]
pub enum PhaseExecError {
    #[error("setup error: {0}")]
    SetupError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("remote error: {0}")]
    RemoteError(String),

    #[error("activity timed out")]
    ActivityTimeout,

    #[error("activity failed: {0}")]
    ActivityFailed(String),

    #[error("transient error: {0}")]
    TransientError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl PhaseExecError {
    /// Maps this error onto the spec §7 error category, for persistence
    /// into `JobError::category`.
    pub fn category(&self) -> state_store::ErrorCategory {
        use state_store::ErrorCategory;
        match self {
            PhaseExecError::SetupError(_) => ErrorCategory::SetupError,
            PhaseExecError::ValidationError(_) => ErrorCategory::ValidationError,
            PhaseExecError::RemoteError(_) => ErrorCategory::RemoteError,
            PhaseExecError::ActivityTimeout => ErrorCategory::ActivityTimeout,
            PhaseExecError::ActivityFailed(_) => ErrorCategory::RemoteError,
            PhaseExecError::TransientError(_) => ErrorCategory::TransientError,
            PhaseExecError::Cancelled => ErrorCategory::Cancelled,
            PhaseExecError::Internal(_) => ErrorCategory::InternalError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("phase id '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("phase id '{0}' is not registered")]
    NotFound(String),
}
