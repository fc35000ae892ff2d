//! Error types with fix suggestions
//!
//! The taxonomy separates structural errors (cycles, bad declarations) that
//! abort a run before any task executes from per-node failures that are
//! contained to the failing node's downstream closure.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// A target existence check failed.
///
/// This is distinct from the target cleanly reporting "does not exist":
/// the underlying resource could not be queried at all (permissions,
/// connectivity, and so on).
#[derive(Error, Debug)]
#[error("cannot check target '{identity}': {detail}")]
pub struct TargetError {
    pub identity: String,
    pub detail: String,
}

impl TargetError {
    pub fn new(identity: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self {
            identity: identity.into(),
            detail: detail.to_string(),
        }
    }
}

/// A task's `run()` failed. Constructed by task implementations.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    Msg(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Shorthand for a plain-message task failure
    pub fn msg(msg: impl Into<String>) -> Self {
        TaskError::Msg(msg.into())
    }
}

/// A malformed task or parameter declaration. Fatal for the whole run,
/// raised during graph construction before any task executes.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("unknown task family '{family}'")]
    UnknownFamily { family: String },

    #[error("missing parameter '{name}'")]
    MissingParam { name: String },

    #[error("parameter '{name}': expected {expected}, got {got}")]
    ParamType {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("task {task}: {source}")]
    Declaration {
        task: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("invalid declaration: {0}")]
    Invalid(String),
}

/// Top-level engine error returned by the run controller.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dependency cycle: {chain}")]
    Cycle { chain: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("worker pool size must be at least 1")]
    NoWorkers,
}

/// Terminal failure detail for a single task node.
///
/// `Upstream` names the originating failed task, not the immediate
/// predecessor, so the causal chain stays traceable across deep graphs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("target check failed: {0}")]
    Check(String),

    #[error("task failed: {0}")]
    Run(String),

    #[error("task reported success but target '{target}' does not exist")]
    Postcondition { target: String },

    #[error("upstream task {origin} failed")]
    Upstream { origin: String },

    #[error("run cancelled before the task could execute")]
    Cancelled,
}

impl FixSuggestion for EngineError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            EngineError::Cycle { .. } => {
                Some("Break the cycle: a task cannot transitively depend on itself")
            }
            EngineError::Build(e) => e.fix_suggestion(),
            EngineError::NoWorkers => Some("Configure the runner with workers(n) where n >= 1"),
        }
    }
}

impl FixSuggestion for BuildError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BuildError::UnknownFamily { .. } => {
                Some("Register the task family on the TaskSet before requesting it")
            }
            BuildError::MissingParam { .. } => {
                Some("Pass the parameter in the request or dependency declaration")
            }
            BuildError::ParamType { .. } => Some("Check the parameter value type"),
            BuildError::Declaration { source, .. } => source.fix_suggestion(),
            BuildError::Invalid(_) => None,
        }
    }
}

impl FixSuggestion for TaskFailure {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TaskFailure::Check(_) => Some("Check permissions/connectivity for the target backend"),
            TaskFailure::Run(_) => None,
            TaskFailure::Postcondition { .. } => {
                Some("The task must create its output target before returning success")
            }
            TaskFailure::Upstream { .. } => Some("Fix the originating task and re-run"),
            TaskFailure::Cancelled => Some("Re-run; completed work is skipped via target checks"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_error_display() {
        let e = TargetError::new("/data/out.fasta", "permission denied");
        assert_eq!(
            e.to_string(),
            "cannot check target '/data/out.fasta': permission denied"
        );
    }

    #[test]
    fn declaration_error_wraps_source() {
        let e = BuildError::Declaration {
            task: "Assemble(sample=\"s1\")".to_string(),
            source: Box::new(BuildError::MissingParam {
                name: "threads".to_string(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("Assemble"));
        assert!(msg.contains("threads"));
        assert!(e.fix_suggestion().is_some());
    }

    #[test]
    fn upstream_failure_names_origin() {
        let f = TaskFailure::Upstream {
            origin: "Fetch(id=7)".to_string(),
        };
        assert!(f.to_string().contains("Fetch(id=7)"));
    }

    #[test]
    fn cycle_suggestion() {
        let e = EngineError::Cycle {
            chain: "a -> b -> a".to_string(),
        };
        assert!(e.fix_suggestion().unwrap().contains("cycle"));
    }
}
