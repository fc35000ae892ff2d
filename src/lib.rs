//! Windlass - idempotent DAG task scheduler

pub mod error;
pub mod event_log;
pub mod graph;
pub mod params;
pub mod registry;
pub mod run;
pub mod target;
pub mod task;

mod scheduler;

pub use error::{BuildError, EngineError, FixSuggestion, TargetError, TaskError, TaskFailure};
pub use event_log::{Event, EventKind, EventLog};
pub use graph::TaskGraph;
pub use params::Params;
pub use registry::{Resolver, TaskFactory, TaskSet};
pub use run::{RerunPolicy, RunReport, Runner, TaskReport, TaskStatus};
pub use target::{FsTarget, MemTarget, Target};
pub use task::{Task, TaskKey, TaskSpec};

pub use tokio_util::sync::CancellationToken;
