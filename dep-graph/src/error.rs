/// A single structural defect found by `validate()`. Multiple errors are
/// collected rather than failing on the first, per spec.md §4.3
/// "`validate() -> list of errors`".
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate phase id: {0}")]
    DuplicateId(String),

    #[error("phase '{0}' depends on unknown phase '{1}'")]
    UnknownDependency(String, String),

    #[error("phase '{0}' depends on itself")]
    SelfDependency(String),

    #[error("cycle detected among phases: {0:?}")]
    Cycle(Vec<String>),
}
