use phase_registry::PhaseRegistry;
use serde_json::Value;
use state_store::{ActivationSlot, ApiCallHint, PhaseDefinition};

/// Builder-style phase definition, mirroring the ergonomics of the original
/// `Phase` DSL: plain data with a fluent constructor, no runtime reflection.
/// `into_definition` is the `Phase::to_definition` equivalent that the
/// Dependency Graph and Phase Registry consume.
#[derive(Debug, Clone)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    pub depends_on: Vec<String>,
    pub per_unit: bool,
    pub critical: bool,
    pub skip_if: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub api_calls_per_unit: ApiCallHint,
    pub activation_slot: Option<ActivationSlot>,
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            executor: executor.into(),
            depends_on: Vec::new(),
            per_unit: true,
            critical: true,
            skip_if: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            api_calls_per_unit: ApiCallHint::Fixed(1),
            activation_slot: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn per_unit(mut self, per_unit: bool) -> Self {
        self.per_unit = per_unit;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn skip_if(mut self, expr: impl Into<String>) -> Self {
        self.skip_if = Some(expr.into());
        self
    }

    pub fn inputs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn api_calls_per_unit(mut self, hint: ApiCallHint) -> Self {
        self.api_calls_per_unit = hint;
        self
    }

    pub fn activation_slot(mut self, slot: ActivationSlot) -> Self {
        self.activation_slot = Some(slot);
        self
    }

    pub fn into_definition(self) -> PhaseDefinition {
        PhaseDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            executor: self.executor,
            depends_on: self.depends_on,
            per_unit: self.per_unit,
            critical: self.critical,
            skip_if: self.skip_if,
            inputs: self.inputs,
            outputs: self.outputs,
            api_calls_per_unit: self.api_calls_per_unit,
            activation_slot: self.activation_slot,
        }
    }
}

/// A named composition of phases (spec.md §3 "Workflow definition").
/// Immutable once registered with the Brain.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub phases: Vec<Phase>,
    pub requires_confirmation: bool,
    pub default_options: Value,
    pub max_activation_slots: u32,
}

impl Workflow {
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            phases,
            requires_confirmation: true,
            default_options: Value::Object(Default::default()),
            max_activation_slots: 12,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires_confirmation(mut self, requires: bool) -> Self {
        self.requires_confirmation = requires;
        self
    }

    pub fn default_options(mut self, options: Value) -> Self {
        self.default_options = options;
        self
    }

    pub fn max_activation_slots(mut self, slots: u32) -> Self {
        self.max_activation_slots = slots;
        self
    }

    pub fn get_phase(&self, phase_id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == phase_id)
    }

    pub fn phase_definitions(&self) -> Vec<PhaseDefinition> {
        self.phases.iter().cloned().map(Phase::into_definition).collect()
    }

    pub fn phase_ids(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id.as_str()).collect()
    }

    /// Internal-consistency check: duplicate ids, unresolved dependencies,
    /// cycles (via `dep_graph::DependencyGraph`), and executor ids not found
    /// in the registry (spec.md §4.2: "a workflow referencing an
    /// unregistered phase_id fails validation at workflow load time").
    pub fn validate_definition(&self, registry: &PhaseRegistry) -> Vec<String> {
        let mut errors = Vec::new();
        let definitions = self.phase_definitions();

        if let Err(graph_errors) = dep_graph::DependencyGraph::new(&definitions) {
            errors.extend(graph_errors.into_iter().map(|e| e.to_string()));
        }

        for phase in &self.phases {
            if registry.get(&phase.executor).is_err() {
                errors.push(format!(
                    "phase '{}' references unregistered executor '{}'",
                    phase.id, phase.executor
                ));
            }
        }

        errors
    }
}
