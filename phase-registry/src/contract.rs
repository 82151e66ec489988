use serde::{Deserialize, Serialize};
use state_store::AggregationStrategy;

/// The shape of value a contract field carries. This is a schema descriptor,
/// not a reflection mechanism (spec §9: "replace runtime reflection with a
/// small runtime schema descriptor per executor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
    Any,
}

impl FieldKind {
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
}

impl InputField {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: false,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub aggregation: AggregationStrategy,
}

impl OutputField {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            aggregation: AggregationStrategy::default(),
        }
    }

    pub fn with_aggregation(name: &str, kind: FieldKind, aggregation: AggregationStrategy) -> Self {
        Self {
            name: name.to_string(),
            kind,
            aggregation,
        }
    }
}

/// An executor's declared `Inputs`/`Outputs` schema (spec §4.2, §4.6 point 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseContract {
    pub inputs: Vec<InputField>,
    pub outputs: Vec<OutputField>,
}

impl PhaseContract {
    pub fn new(inputs: Vec<InputField>, outputs: Vec<OutputField>) -> Self {
        Self { inputs, outputs }
    }

    /// Checks a resolved input object against this contract. Missing or
    /// mistyped fields fail the phase with `SETUP_ERROR` before any side
    /// effect runs (spec §4.6 point 2).
    pub fn validate_inputs(&self, value: &serde_json::Value) -> Result<(), crate::PhaseExecError> {
        let obj = value
            .as_object()
            .ok_or_else(|| crate::PhaseExecError::SetupError("inputs must be an object".into()))?;

        for field in &self.inputs {
            match obj.get(&field.name) {
                None if field.optional => {}
                None => {
                    return Err(crate::PhaseExecError::SetupError(format!(
                        "missing required input '{}'",
                        field.name
                    )))
                }
                Some(v) if v.is_null() && field.optional => {}
                Some(v) if !field.kind.accepts(v) => {
                    return Err(crate::PhaseExecError::SetupError(format!(
                        "input '{}' has wrong type (expected {:?})",
                        field.name, field.kind
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
