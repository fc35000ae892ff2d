//! The Task model: the engine's sole extension point
//!
//! A task is a named, parameterized unit of work with declared upstream
//! dependencies and one output target. Identity is `(family, parameters)`:
//! two instances with equal identity are the same logical task and collapse
//! to a single graph node.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::params::Params;
use crate::target::Target;

/// A `(family, parameters)` pair: the request form used at the run
/// interface and in dependency declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub family: String,
    pub params: Params,
}

impl TaskSpec {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Canonical identity key for this spec
    pub fn key(&self) -> TaskKey {
        TaskKey {
            family: self.family.clone(),
            canonical: self.params.canonical(),
        }
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.family)
        } else {
            write!(f, "{}({})", self.family, self.params)
        }
    }
}

/// Canonical, hashable task identity derived from a [`TaskSpec`].
///
/// Structurally equal parameter mappings produce equal keys regardless of
/// construction order, so diamond dependencies deduplicate to one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    family: String,
    canonical: String,
}

impl TaskKey {
    pub fn family(&self) -> &str {
        &self.family
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.canonical == "{}" {
            write!(f, "{}", self.family)
        } else {
            write!(f, "{}{}", self.family, self.canonical)
        }
    }
}

/// A named unit of work with typed parameters, declared dependencies and
/// an output target.
///
/// The engine calls `run()` only after every dependency's target exists,
/// and never calls it at all when the task's own target already exists.
/// After a successful `run()`, `output().exists()` must report true; a
/// violation is surfaced as a postcondition failure.
#[async_trait]
pub trait Task: Send + Sync {
    /// The identity this instance was constructed from. Must be
    /// deterministic for identical parameters.
    fn spec(&self) -> TaskSpec;

    /// Declared upstream dependencies, in a deterministic order
    fn dependencies(&self) -> Vec<TaskSpec> {
        Vec::new()
    }

    /// The output target this task materializes
    fn output(&self) -> Arc<dyn Target>;

    /// Execute the work. The cancellation token is signalled when the run
    /// is cancelled; long-running tasks should check it cooperatively.
    async fn run(&self, cancel: &CancellationToken) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_parameter_order() {
        let a = TaskSpec::new("Assemble").with("sample", "s1").with("threads", 4);
        let b = TaskSpec::new("Assemble").with("threads", 4).with("sample", "s1");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_distinguishes_params_and_families() {
        let a = TaskSpec::new("A").with("param", 1);
        let b = TaskSpec::new("A").with("param", 2);
        let c = TaskSpec::new("B").with("param", 1);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn display_forms() {
        let bare = TaskSpec::new("Cleanup");
        assert_eq!(bare.to_string(), "Cleanup");
        assert_eq!(bare.key().to_string(), "Cleanup");

        let with_params = TaskSpec::new("A").with("param", 1);
        assert_eq!(with_params.to_string(), "A(param=1)");
        assert_eq!(with_params.key().to_string(), r#"A{"param":1}"#);
    }
}
