use phase_registry::OutputField;
use serde_json::{Map, Value};
use state_store::AggregationStrategy;

/// Rolls up a per-unit phase's outputs across units into the values a
/// downstream **global** phase sees (spec.md §4.6 point 1: "for global
/// phases downstream of per-unit phases, the runtime automatically
/// aggregates per-unit outputs"). `outputs` declares, per field, which
/// strategy applies; a field absent from every unit's output is omitted.
pub fn aggregate_unit_outputs(outputs: &[OutputField], per_unit: &[Value]) -> Value {
    let mut aggregated = Map::new();

    for field in outputs {
        let values: Vec<&Value> = per_unit
            .iter()
            .filter_map(|v| v.as_object().and_then(|o| o.get(&field.name)))
            .collect();

        if values.is_empty() {
            continue;
        }

        let merged = match field.aggregation {
            AggregationStrategy::Sum => Value::from(sum(&values)),
            AggregationStrategy::Concat => Value::Array(concat(&values)),
            AggregationStrategy::Merge => Value::Object(merge(&values)),
            AggregationStrategy::List => Value::Array(values.into_iter().cloned().collect()),
        };
        aggregated.insert(field.name.clone(), merged);
    }

    Value::Object(aggregated)
}

fn sum(values: &[&Value]) -> f64 {
    values.iter().filter_map(|v| v.as_f64()).sum()
}

fn concat(values: &[&Value]) -> Vec<Value> {
    values
        .iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.clone(),
            other => vec![(*other).clone()],
        })
        .collect()
}

fn merge(values: &[&Value]) -> Map<String, Value> {
    let mut out = Map::new();
    for v in values {
        if let Value::Object(obj) = v {
            for (k, val) in obj.iter() {
                out.insert(k.clone(), val.clone());
            }
        }
    }
    out
}
