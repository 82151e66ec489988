use std::sync::Arc;

use dashmap::DashMap;

use crate::error::RegistryError;
use crate::executor::PhaseExecutor;

/// Lookup table of executor id -> implementation (spec §4.2). Analogous to
/// the teacher's `HashMap<String, Box<dyn Command>>` command tables, but
/// shared across tasks so the Brain can dispatch concurrently.
#[derive(Default)]
pub struct PhaseRegistry {
    executors: DashMap<String, Arc<dyn PhaseExecutor>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self {
            executors: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        executor_id: impl Into<String>,
        executor: Arc<dyn PhaseExecutor>,
    ) -> Result<(), RegistryError> {
        let executor_id = executor_id.into();
        if self.executors.contains_key(&executor_id) {
            return Err(RegistryError::AlreadyRegistered(executor_id));
        }
        self.executors.insert(executor_id, executor);
        Ok(())
    }

    pub fn get(&self, executor_id: &str) -> Result<Arc<dyn PhaseExecutor>, RegistryError> {
        self.executors
            .get(executor_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::NotFound(executor_id.to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        self.executors.iter().map(|e| e.key().clone()).collect()
    }
}
