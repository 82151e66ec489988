use async_trait::async_trait;
use brain::{Phase, Workflow};
use phase_registry::{
    ExecutionContext, FieldKind, InputField, MessageLevel, OutputField, PhaseContract, PhaseExecError, PhaseExecutor,
    PhaseRegistry,
};
use serde_json::json;
use state_store::ActivationSlot;
use std::sync::Arc;

/// Global no-op preflight check.
pub struct ValidateExecutor;

#[async_trait]
impl PhaseExecutor for ValidateExecutor {
    fn contract(&self) -> PhaseContract {
        PhaseContract::new(vec![], vec![OutputField::new("ok", FieldKind::Bool)])
    }

    async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
        Ok(json!({ "ok": true }))
    }
}

/// Per-unit phase that drives a scripted remote operation through
/// `fire_and_wait`, exercising the activity tracker's poll loop end to end.
pub struct ProvisionSsidExecutor;

#[async_trait]
impl PhaseExecutor for ProvisionSsidExecutor {
    fn contract(&self) -> PhaseContract {
        PhaseContract::new(
            vec![InputField::required("unit_id", FieldKind::String)],
            vec![OutputField::new("ssid", FieldKind::String)],
        )
    }

    async fn execute(&self, inputs: serde_json::Value, ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
        let unit_id = inputs["unit_id"].as_str().unwrap_or_default().to_string();
        ctx.emit("provisioning SSID", MessageLevel::Info, None).await;
        ctx.fire_and_wait(format!("provision-{unit_id}")).await?;
        Ok(json!({ "ssid": format!("ssid-{unit_id}") }))
    }
}

/// Per-unit, non-critical phase with no remote call of its own.
pub struct ConfigureRadiosExecutor;

#[async_trait]
impl PhaseExecutor for ConfigureRadiosExecutor {
    fn contract(&self) -> PhaseContract {
        PhaseContract::new(
            vec![InputField::required("unit_id", FieldKind::String)],
            vec![OutputField::new("radios_configured", FieldKind::Number)],
        )
    }

    async fn execute(&self, _inputs: serde_json::Value, ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
        ctx.fire_and_wait(format!("radios-{}", ctx.unit_id().unwrap_or_default())).await?;
        Ok(json!({ "radios_configured": 3 }))
    }
}

/// Global rollup phase run once all units have finished radio configuration.
pub struct GenerateReportExecutor;

#[async_trait]
impl PhaseExecutor for GenerateReportExecutor {
    fn contract(&self) -> PhaseContract {
        PhaseContract::new(vec![], vec![OutputField::new("report_ready", FieldKind::Bool)])
    }

    async fn execute(&self, _inputs: serde_json::Value, _ctx: &dyn ExecutionContext) -> Result<serde_json::Value, PhaseExecError> {
        Ok(json!({ "report_ready": true }))
    }
}

/// Registers the sample executors under the names `build_workflow`'s phases
/// reference.
pub fn register_executors(registry: &PhaseRegistry) {
    registry.register("validate", Arc::new(ValidateExecutor)).unwrap();
    registry.register("provision_ssid", Arc::new(ProvisionSsidExecutor)).unwrap();
    registry.register("configure_radios", Arc::new(ConfigureRadiosExecutor)).unwrap();
    registry.register("generate_report", Arc::new(GenerateReportExecutor)).unwrap();
}

/// A representative end-to-end workflow: a global preflight, two chained
/// per-unit phases (the second non-critical), throttled by an activation
/// slot, and a final global report.
pub fn build_workflow() -> Workflow {
    Workflow::new(
        "provision_access_points",
        vec![
            Phase::new("validate", "Validate venue", "validate").per_unit(false),
            Phase::new("provision_ssid", "Provision SSID", "provision_ssid")
                .per_unit(true)
                .depends_on(["validate"])
                .activation_slot(ActivationSlot::Acquire),
            Phase::new("configure_radios", "Configure radios", "configure_radios")
                .per_unit(true)
                .critical(false)
                .depends_on(["provision_ssid"])
                .activation_slot(ActivationSlot::Release),
            Phase::new("generate_report", "Generate report", "generate_report")
                .per_unit(false)
                .depends_on(["configure_radios"]),
        ],
    )
    .requires_confirmation(false)
    .max_activation_slots(4)
}
