//! Task family registry and instance resolver
//!
//! Families are registered as factories keyed by name. The resolver caches
//! constructed instances by canonical identity, so every `(family, params)`
//! pair resolves to exactly one shared instance no matter how many
//! dependency declarations reference it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BuildError;
use crate::params::Params;
use crate::task::{Task, TaskKey, TaskSpec};

/// Constructor for one task family. Validates parameters and returns a
/// ready instance, or a `BuildError` for missing/mistyped parameters.
pub type TaskFactory = Arc<dyn Fn(&Params) -> Result<Arc<dyn Task>, BuildError> + Send + Sync>;

/// Registry of task families known to the engine
#[derive(Default, Clone)]
pub struct TaskSet {
    factories: HashMap<String, TaskFactory>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family by name. Re-registering replaces the factory.
    pub fn register<F>(mut self, family: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Params) -> Result<Arc<dyn Task>, BuildError> + Send + Sync + 'static,
    {
        self.factories.insert(family.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, family: &str) -> bool {
        self.factories.contains_key(family)
    }

    fn factory(&self, family: &str) -> Result<&TaskFactory, BuildError> {
        self.factories
            .get(family)
            .ok_or_else(|| BuildError::UnknownFamily {
                family: family.to_string(),
            })
    }
}

/// Per-run instance cache keyed by canonical identity
pub struct Resolver<'a> {
    set: &'a TaskSet,
    instances: HashMap<TaskKey, Arc<dyn Task>>,
}

impl<'a> Resolver<'a> {
    pub fn new(set: &'a TaskSet) -> Self {
        Self {
            set,
            instances: HashMap::new(),
        }
    }

    /// Resolve a spec to its unique instance, constructing it on first use.
    ///
    /// Factory errors are wrapped with the offending task's display name so
    /// the report points at the declaration, not just the parameter.
    pub fn resolve(&mut self, spec: &TaskSpec) -> Result<Arc<dyn Task>, BuildError> {
        let key = spec.key();
        if let Some(task) = self.instances.get(&key) {
            return Ok(Arc::clone(task));
        }

        let factory = self.set.factory(&spec.family)?;
        let task = factory(&spec.params).map_err(|source| BuildError::Declaration {
            task: spec.to_string(),
            source: Box::new(source),
        })?;
        self.instances.insert(key, Arc::clone(&task));
        Ok(task)
    }
}
