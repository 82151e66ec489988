mod error;
mod graph;

pub use error::GraphError;
pub use graph::DependencyGraph;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use state_store::{ApiCallHint, PhaseDefinition};

    use super::*;

    fn phase(id: &str, depends_on: &[&str]) -> PhaseDefinition {
        PhaseDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            executor: id.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            per_unit: false,
            critical: true,
            skip_if: None,
            inputs: vec![],
            outputs: vec![],
            api_calls_per_unit: ApiCallHint::Fixed(1),
            activation_slot: None,
        }
    }

    #[test]
    fn levels_groups_independent_phases_together() {
        let phases = vec![phase("a", &[]), phase("b", &[]), phase("c", &["a", "b"])];
        let graph = DependencyGraph::new(&phases).unwrap();
        let levels = graph.levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(
            levels[0],
            ["a", "b"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(levels[1], ["c"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn ready_respects_completed_set() {
        let phases = vec![phase("a", &[]), phase("b", &["a"]), phase("c", &["a"])];
        let graph = DependencyGraph::new(&phases).unwrap();

        let none_completed = HashSet::new();
        assert_eq!(
            graph.ready(&none_completed),
            ["a"].iter().map(|s| s.to_string()).collect()
        );

        let a_completed: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(
            graph.ready(&a_completed),
            ["b", "c"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let phases = vec![phase("a", &[]), phase("a", &[])];
        let errors = DependencyGraph::new(&phases).unwrap_err();
        assert!(errors.contains(&GraphError::DuplicateId("a".into())));
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let phases = vec![phase("a", &["ghost"])];
        let errors = DependencyGraph::new(&phases).unwrap_err();
        assert!(errors.contains(&GraphError::UnknownDependency("a".into(), "ghost".into())));
    }

    #[test]
    fn validate_rejects_self_dependency() {
        let phases = vec![phase("a", &["a"])];
        let errors = DependencyGraph::new(&phases).unwrap_err();
        assert!(errors.contains(&GraphError::SelfDependency("a".into())));
    }

    #[test]
    fn validate_rejects_cycles() {
        let phases = vec![phase("a", &["b"]), phase("b", &["a"])];
        let errors = DependencyGraph::new(&phases).unwrap_err();
        assert!(matches!(errors.as_slice(), [GraphError::Cycle(_)]));
    }

    #[test]
    fn depends_on_and_phase_ids_reflect_input() {
        let phases = vec![phase("a", &[]), phase("b", &["a"])];
        let graph = DependencyGraph::new(&phases).unwrap();
        assert_eq!(graph.depends_on("b"), ["a".to_string()]);
        assert!(graph.depends_on("a").is_empty());

        let mut ids: Vec<&str> = graph.phase_ids().collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
