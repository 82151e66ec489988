use std::collections::HashMap;

use phase_registry::{PhaseExecError, PhaseRegistry};
use serde_json::{Map, Value};
use state_store::{JobV2, PhaseDefinition};

use crate::aggregate::aggregate_unit_outputs;

/// Builds the input object a phase instance sees, per spec.md §4.6 point 1:
/// direct job-level fields, the unit's resolved plan, and upstream phase
/// outputs (aggregated when a global phase sits downstream of a per-unit
/// one). Pure function of the job snapshot, so it is unit-testable without a
/// running executor or scheduler.
pub fn resolve_inputs(
    registry: &PhaseRegistry,
    phase: &PhaseDefinition,
    job: &JobV2,
    unit_id: Option<&str>,
) -> Result<Value, PhaseExecError> {
    let by_id: HashMap<&str, &PhaseDefinition> =
        job.phase_definitions.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut pool = Map::new();

    if let Some(unit_id) = unit_id {
        let unit = job.unit_mappings.get(unit_id).ok_or_else(|| {
            PhaseExecError::SetupError(format!("unit '{unit_id}' has no mapping"))
        })?;
        pool.insert("unit_id".into(), Value::String(unit.unit_id.clone()));
        pool.insert("unit_number".into(), Value::String(unit.unit_number.clone()));
        if let Value::Object(plan) = &unit.plan {
            for (k, v) in plan {
                pool.insert(k.clone(), v.clone());
            }
        }
        if let Value::Object(input_config) = &unit.input_config {
            for (k, v) in input_config {
                pool.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
    pool.insert("venue_id".into(), Value::String(job.venue_id.clone()));
    pool.insert("tenant_id".into(), Value::String(job.tenant_id.clone()));

    for dep_id in &phase.depends_on {
        let dep_def = by_id
            .get(dep_id.as_str())
            .ok_or_else(|| PhaseExecError::SetupError(format!("unknown upstream phase '{dep_id}'")))?;

        let dep_output = match (phase.per_unit, dep_def.per_unit) {
            (true, true) => {
                let unit_id = unit_id.ok_or_else(|| {
                    PhaseExecError::Internal("per-unit phase resolved with no unit_id".into())
                })?;
                let unit = job.unit_mappings.get(unit_id).ok_or_else(|| {
                    PhaseExecError::SetupError(format!("unit '{unit_id}' has no mapping"))
                })?;
                unit.phase_outputs.get(dep_id.as_str()).cloned().unwrap_or(Value::Null)
            }
            (true, false) | (false, false) => job
                .global_phase_outputs
                .get(dep_id.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            (false, true) => {
                let per_unit_values: Vec<Value> = job
                    .unit_mappings
                    .values()
                    .filter_map(|u| u.phase_outputs.get(dep_id.as_str()).cloned())
                    .collect();
                let contract = registry.get(&dep_def.executor).map(|e| e.contract()).ok();
                match contract {
                    Some(contract) => aggregate_unit_outputs(&contract.outputs, &per_unit_values),
                    None => Value::Array(per_unit_values),
                }
            }
        };

        if let Value::Object(obj) = dep_output {
            for (k, v) in obj {
                pool.insert(k, v);
            }
        }
    }

    Ok(Value::Object(pool))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use phase_registry::{ExecutionContext, FieldKind, OutputField, PhaseContract, PhaseExecutor};
    use serde_json::json;
    use state_store::{AggregationStrategy, ApiCallHint, JobV2, PhaseDefinition, UnitMapping};
    use std::sync::Arc;

    use super::*;

    struct StubExecutor(PhaseContract);

    #[async_trait]
    impl PhaseExecutor for StubExecutor {
        fn contract(&self) -> PhaseContract {
            self.0.clone()
        }
        async fn execute(
            &self,
            _inputs: Value,
            _ctx: &dyn ExecutionContext,
        ) -> Result<Value, PhaseExecError> {
            unreachable!("not invoked in these tests")
        }
    }

    fn phase_def(id: &str, executor: &str, per_unit: bool, depends_on: &[&str]) -> PhaseDefinition {
        PhaseDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            executor: executor.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            per_unit,
            critical: true,
            skip_if: None,
            inputs: vec![],
            outputs: vec![],
            api_calls_per_unit: ApiCallHint::Fixed(1),
            activation_slot: None,
        }
    }

    fn job_with(phases: Vec<PhaseDefinition>) -> JobV2 {
        JobV2::new(
            "activate_venue".into(),
            "user-1".into(),
            "controller-1".into(),
            "venue-1".into(),
            "tenant-1".into(),
            phases,
            json!({}),
            json!({}),
        )
    }

    #[test]
    fn resolves_direct_and_plan_fields_for_per_unit_phase() {
        let provision = phase_def("provision_ssid", "provision_ssid", true, &[]);
        let mut job = job_with(vec![provision]);
        let mut unit = UnitMapping::new("unit-1".into(), "Apt 101".into(), json!({"raw": true}));
        unit.plan = json!({"ssid_name": "Resident-WiFi"});
        job.unit_mappings.insert(unit.unit_id.clone(), unit);

        let registry = PhaseRegistry::new();
        let resolved = resolve_inputs(
            &registry,
            &job.phase_definitions[0],
            &job,
            Some("unit-1"),
        )
        .unwrap();

        assert_eq!(resolved["unit_id"], "unit-1");
        assert_eq!(resolved["ssid_name"], "Resident-WiFi");
        assert_eq!(resolved["venue_id"], "venue-1");
    }

    #[test]
    fn global_phase_aggregates_upstream_per_unit_outputs() {
        let provision = phase_def("provision_ssid", "provision_ssid", true, &[]);
        let summarize = phase_def("summarize", "summarize", false, &["provision_ssid"]);
        let mut job = job_with(vec![provision, summarize]);

        for (id, count) in [("unit-1", 2.0), ("unit-2", 3.0)] {
            let mut unit = UnitMapping::new(id.into(), id.into(), json!({}));
            unit.phase_outputs
                .insert("provision_ssid".into(), json!({"aps_created": count}));
            job.unit_mappings.insert(id.into(), unit);
        }

        let registry = PhaseRegistry::new();
        registry
            .register(
                "provision_ssid",
                Arc::new(StubExecutor(PhaseContract::new(
                    vec![],
                    vec![OutputField::with_aggregation(
                        "aps_created",
                        FieldKind::Number,
                        AggregationStrategy::Sum,
                    )],
                ))),
            )
            .unwrap();

        let summarize_def = job
            .phase_definitions
            .iter()
            .find(|p| p.id == "summarize")
            .unwrap()
            .clone();
        let resolved = resolve_inputs(&registry, &summarize_def, &job, None).unwrap();
        assert_eq!(resolved["aps_created"], 5.0);
    }

    #[test]
    fn per_unit_phase_reads_upstream_global_output_directly() {
        let validate = phase_def("validate", "validate", false, &[]);
        let provision = phase_def("provision_ssid", "provision_ssid", true, &["validate"]);
        let mut job = job_with(vec![validate, provision]);
        job.global_phase_outputs
            .insert("validate".into(), json!({"default_vlan": 42}));
        job.unit_mappings.insert(
            "unit-1".into(),
            UnitMapping::new("unit-1".into(), "unit-1".into(), json!({})),
        );

        let registry = PhaseRegistry::new();
        let provision_def = job
            .phase_definitions
            .iter()
            .find(|p| p.id == "provision_ssid")
            .unwrap()
            .clone();
        let resolved = resolve_inputs(&registry, &provision_def, &job, Some("unit-1")).unwrap();
        assert_eq!(resolved["default_vlan"], 42);
    }

    #[test]
    fn missing_unit_mapping_is_a_setup_error() {
        let provision = phase_def("provision_ssid", "provision_ssid", true, &[]);
        let job = job_with(vec![provision]);
        let registry = PhaseRegistry::new();
        let err = resolve_inputs(&registry, &job.phase_definitions[0], &job, Some("ghost"))
            .unwrap_err();
        assert!(matches!(err, PhaseExecError::SetupError(_)));
    }
}
