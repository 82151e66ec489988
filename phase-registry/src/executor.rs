use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::contract::PhaseContract;
use crate::error::PhaseExecError;

/// Result of a dry-run validation pass (spec §4.6 point 1, the pre-flight
/// `validate` call that drives `AWAITING_CONFIRMATION`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub will_create: bool,
    #[serde(default)]
    pub will_reuse: bool,
    #[serde(default)]
    pub existing_resource_id: Option<String>,
    #[serde(default)]
    pub estimated_api_calls: u32,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ValidationResult {
    /// A validation that passes with no planned side effects; the default
    /// for executors that don't override `validate`.
    pub fn trivially_valid() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }
}

/// A single unit of work in the dependency graph (spec §4.2). Executors are
/// plain types implementing this trait directly; there is no shared base
/// class to inherit from (spec §9).
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    /// The declared input/output schema, used for validation and for
    /// resolving upstream outputs without reflection.
    fn contract(&self) -> PhaseContract;

    /// Dry-run: report what this phase would do without doing it. The
    /// default implementation reports trivially valid, for phases with no
    /// meaningful pre-flight check.
    async fn validate(
        &self,
        _inputs: serde_json::Value,
        _ctx: &dyn ExecutionContext,
    ) -> Result<ValidationResult, PhaseExecError> {
        Ok(ValidationResult::trivially_valid())
    }

    /// Run the phase against already-contract-validated inputs, returning
    /// the declared outputs object.
    async fn execute(
        &self,
        inputs: serde_json::Value,
        ctx: &dyn ExecutionContext,
    ) -> Result<serde_json::Value, PhaseExecError>;
}
