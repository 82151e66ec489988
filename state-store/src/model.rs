use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a `JobV2`. See spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Validating,
    AwaitingConfirmation,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Status of a single phase instance — either a global phase or one unit's
/// view of a per-unit phase. The same set covers both, per the invariant in
/// spec §3 ("UnitMapping.status ∈ {PENDING, RUNNING, COMPLETED, FAILED, SKIPPED}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }
}

/// Status of an outstanding `ActivityRef`. See spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

/// One of `acquire` / `release` for a phase's activation-slot participation.
/// See spec §3, §4.7, §5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSlot {
    Acquire,
    Release,
}

/// `api_calls_per_unit` is either a fixed integer hint or the literal string
/// `"dynamic"` (spec §3). Used only by validation/UI, never by scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCallHint {
    Fixed(u32),
    Dynamic,
}

impl Default for ApiCallHint {
    fn default() -> Self {
        ApiCallHint::Fixed(1)
    }
}

impl Serialize for ApiCallHint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ApiCallHint::Fixed(n) => serializer.serialize_u32(*n),
            ApiCallHint::Dynamic => serializer.serialize_str("dynamic"),
        }
    }
}

impl<'de> Deserialize<'de> for ApiCallHint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u32),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(ApiCallHint::Fixed(n)),
            Raw::Str(s) if s == "dynamic" => Ok(ApiCallHint::Dynamic),
            Raw::Str(other) => Err(serde::de::Error::custom(format!(
                "invalid api_calls_per_unit: {other}"
            ))),
        }
    }
}

/// Aggregation strategy for a per-unit output field rolled up into a global
/// downstream input. See spec §4.6 point 1 and §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    Sum,
    Concat,
    Merge,
    #[default]
    List,
}

/// Immutable snapshot of one phase within a workflow, as captured into
/// `JobV2.phase_definitions` at job admission (spec §3: "so later
/// redeployments can't change a running job's shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub per_unit: bool,
    pub critical: bool,
    #[serde(default)]
    pub skip_if: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub api_calls_per_unit: ApiCallHint,
    #[serde(default)]
    pub activation_slot: Option<ActivationSlot>,
}

/// One resource created on the external controller, tracked for the cleanup
/// workflow's benefit (spec §3 `created_resources`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One entry in `JobV2.errors` or `UnitMapping.error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub phase_id: String,
    #[serde(default)]
    pub unit_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub category: Option<ErrorCategory>,
    pub timestamp: DateTime<Utc>,
}

/// Error taxonomy from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    SetupError,
    ValidationError,
    RemoteError,
    ActivityTimeout,
    TransientError,
    Cancelled,
    InternalError,
}

/// Per-unit execution record (spec §3 `UnitMapping`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMapping {
    pub unit_id: String,
    pub unit_number: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub plan: serde_json::Value,
    #[serde(default)]
    pub input_config: serde_json::Value,
    #[serde(default)]
    pub phase_status: HashMap<String, PhaseStatus>,
    #[serde(default)]
    pub phase_outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<JobError>,
}

impl UnitMapping {
    pub fn new(unit_id: String, unit_number: String, input_config: serde_json::Value) -> Self {
        Self {
            unit_id,
            unit_number,
            status: PhaseStatus::Pending,
            plan: serde_json::Value::Null,
            input_config,
            phase_status: HashMap::new(),
            phase_outputs: HashMap::new(),
            error: None,
        }
    }
}

/// The live execution record for one run of a workflow (spec §3 `JobV2`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobV2 {
    pub id: Uuid,
    pub workflow_name: String,
    pub user_id: String,
    pub controller_id: String,
    pub venue_id: String,
    pub tenant_id: String,
    pub status: JobStatus,
    pub phase_definitions: Vec<PhaseDefinition>,
    #[serde(default)]
    pub global_phase_status: HashMap<String, PhaseStatus>,
    #[serde(default)]
    pub global_phase_outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub unit_mappings: HashMap<String, UnitMapping>,
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default)]
    pub input_data: serde_json::Value,
    #[serde(default)]
    pub created_resources: HashMap<String, Vec<ResourceRecord>>,
    #[serde(default)]
    pub errors: Vec<JobError>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_job_id: Option<Uuid>,
    #[serde(default)]
    pub child_job_ids: Vec<Uuid>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl JobV2 {
    pub fn new(
        workflow_name: String,
        user_id: String,
        controller_id: String,
        venue_id: String,
        tenant_id: String,
        phase_definitions: Vec<PhaseDefinition>,
        options: serde_json::Value,
        input_data: serde_json::Value,
    ) -> Self {
        let global_phase_status = phase_definitions
            .iter()
            .filter(|p| !p.per_unit)
            .map(|p| (p.id.clone(), PhaseStatus::Pending))
            .collect();

        Self {
            id: Uuid::new_v4(),
            workflow_name,
            user_id,
            controller_id,
            venue_id,
            tenant_id,
            status: JobStatus::Pending,
            phase_definitions,
            global_phase_status,
            global_phase_outputs: HashMap::new(),
            unit_mappings: HashMap::new(),
            options,
            input_data,
            created_resources: HashMap::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            parent_job_id: None,
            child_job_ids: Vec::new(),
            owner: None,
            cancel_requested: false,
        }
    }

    pub fn track_resource(&mut self, resource_type: &str, record: ResourceRecord) {
        self.created_resources
            .entry(resource_type.to_string())
            .or_default()
            .push(record);
    }

    pub fn record_error(&mut self, error: JobError) {
        self.errors.push(error);
    }
}

/// One outstanding asynchronous operation on the external controller
/// (spec §3 `ActivityRef`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRef {
    pub request_id: String,
    pub job_id: Uuid,
    #[serde(default)]
    pub unit_id: Option<String>,
    pub phase_id: String,
    pub controller_id: String,
    pub status: ActivityStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}
