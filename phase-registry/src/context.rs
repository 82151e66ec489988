use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use state_store::ResourceRecord;
use uuid::Uuid;

use crate::error::PhaseExecError;

/// Level of a `message` event, per spec §4.5/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Capability set a running phase instance is given, in place of a shared
/// base class (spec §9 "deep inheritance" redesign note: "replace with a
/// small capability set ... provided as ... an interface; executors are pure
/// types with no ancestry"). `phase-runtime` supplies the concrete
/// implementation wired to the state store, activity tracker, and event
/// publisher; `brain-testkit`'s mock executors exercise this trait directly
/// in tests.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    fn job_id(&self) -> Uuid;
    fn phase_id(&self) -> &str;
    fn unit_id(&self) -> Option<&str>;
    fn unit_number(&self) -> Option<&str>;
    fn tenant_id(&self) -> &str;
    fn venue_id(&self) -> &str;
    fn controller_id(&self) -> &str;
    fn options(&self) -> &serde_json::Value;
    fn is_cancelled(&self) -> bool;

    /// Publish a `message` event for display to the operator.
    async fn emit(&self, message: &str, level: MessageLevel, details: Option<serde_json::Value>);

    /// Register `request_id` with the Activity Tracker and suspend until it
    /// resolves. See spec §4.4, §4.6 point 5.
    async fn fire_and_wait(&self, request_id: String) -> Result<(), PhaseExecError>;

    /// Register every id in `request_ids` with the Activity Tracker and
    /// suspend until all of them resolve, order-preserving. Each id's
    /// outcome is independent, so a batch can come back with a mix of
    /// successes and failures (spec §4.4, §4.6 point 5).
    async fn wait_batch(&self, request_ids: Vec<String>) -> Result<Vec<Result<(), PhaseExecError>>, PhaseExecError>;

    /// Append a created resource to the job's `created_resources` map
    /// (spec §4.6 point 5, §3 `created_resources` invariant: append-only).
    async fn track_resource(&self, resource_type: &str, record: ResourceRecord);
}
