use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error("workflow '{0}' is not registered")]
    UnknownWorkflow(String),

    #[error("workflow '{0}' is already registered")]
    WorkflowAlreadyRegistered(String),

    #[error("workflow '{0}' references unregistered executor '{1}'")]
    UnregisteredExecutor(String, String),

    #[error("workflow '{0}' has an invalid dependency graph: {1:?}")]
    InvalidGraph(String, Vec<dep_graph::GraphError>),

    #[error("job '{0}' not found")]
    JobNotFound(Uuid),

    #[error("job '{0}' is not awaiting confirmation")]
    NotAwaitingConfirmation(Uuid),

    #[error(transparent)]
    StateStore(#[from] state_store::StateStoreError),

    #[error("registry error: {0}")]
    Registry(#[from] phase_registry::RegistryError),
}
