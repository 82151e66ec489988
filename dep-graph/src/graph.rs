use std::collections::{BTreeSet, HashMap, HashSet};

use state_store::PhaseDefinition;

use crate::error::GraphError;

/// Validated, immutable view of a workflow's phase dependencies (spec.md
/// §4.3). Pure and synchronous: no I/O, no interior mutability. Built once
/// from the job's `phase_definitions` snapshot and never mutated afterward,
/// matching `JobV2`'s invariant that the DAG is fixed at job creation.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    depends_on: HashMap<String, Vec<String>>,
    levels: Vec<BTreeSet<String>>,
}

impl DependencyGraph {
    /// Validates the phase set and, if sound, computes topological levels.
    /// Returns every structural defect found, not just the first (spec.md
    /// §4.3: `validate() -> list of errors`).
    pub fn new(phases: &[PhaseDefinition]) -> Result<Self, Vec<GraphError>> {
        let mut errors = Vec::new();
        let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen = HashSet::new();

        for phase in phases {
            if !seen.insert(phase.id.clone()) {
                errors.push(GraphError::DuplicateId(phase.id.clone()));
                continue;
            }
            depends_on.insert(phase.id.clone(), phase.depends_on.clone());
        }

        let known_ids: HashSet<&str> = depends_on.keys().map(String::as_str).collect();
        for (id, deps) in &depends_on {
            for dep in deps {
                if dep == id {
                    errors.push(GraphError::SelfDependency(id.clone()));
                } else if !known_ids.contains(dep.as_str()) {
                    errors.push(GraphError::UnknownDependency(id.clone(), dep.clone()));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        match topological_levels(&depends_on) {
            Ok(levels) => Ok(Self { depends_on, levels }),
            Err(cycle) => Err(vec![GraphError::Cycle(cycle)]),
        }
    }

    /// Phases grouped into topological levels; all phases at level k depend
    /// only on levels < k (spec.md §4.3).
    pub fn levels(&self) -> &[BTreeSet<String>] {
        &self.levels
    }

    /// Which phases are now eligible to run, given the set of phase ids that
    /// have already completed (spec.md §4.3). A phase is ready once every
    /// entry in its `depends_on` is in `completed`, and it has not itself
    /// already completed.
    pub fn ready(&self, completed: &HashSet<String>) -> BTreeSet<String> {
        self.depends_on
            .iter()
            .filter(|(id, deps)| {
                !completed.contains(*id) && deps.iter().all(|d| completed.contains(d))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn depends_on(&self, phase_id: &str) -> &[String] {
        self.depends_on
            .get(phase_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn phase_ids(&self) -> impl Iterator<Item = &str> {
        self.depends_on.keys().map(String::as_str)
    }
}

/// Kahn's algorithm, grouping nodes into levels instead of a single ordering.
/// Within a level, phases are sorted by phase_id (`BTreeSet` ordering) for
/// the deterministic tie-break spec.md §4.3 requires.
fn topological_levels(
    depends_on: &HashMap<String, Vec<String>>,
) -> Result<Vec<BTreeSet<String>>, Vec<String>> {
    let mut remaining: HashMap<&str, usize> = depends_on
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.len()))
        .collect();

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, deps) in depends_on {
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    let mut levels = Vec::new();
    let mut resolved = 0usize;

    loop {
        let level: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id.to_string())
            .collect();

        if level.is_empty() {
            break;
        }

        for id in &level {
            remaining.remove(id.as_str());
            resolved += 1;
            if let Some(children) = dependents.get(id.as_str()) {
                for child in children {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                    }
                }
            }
        }

        levels.push(level);
    }

    if resolved != depends_on.len() {
        let stuck: Vec<String> = remaining.keys().map(|s| s.to_string()).collect();
        return Err(stuck);
    }

    Ok(levels)
}
