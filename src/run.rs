//! Run controller: the single entry point for executing a set of tasks
//!
//! `Runner` owns run-wide configuration (worker pool size, re-run policy,
//! cancellation) and turns a list of requested specs into a `RunReport`
//! covering every node the run touched.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{EngineError, TaskFailure};
use crate::event_log::{EventKind, EventLog};
use crate::graph::TaskGraph;
use crate::registry::TaskSet;
use crate::scheduler::{NodeState, Scheduler};
use crate::task::{TaskKey, TaskSpec};

/// How pre-existing output targets are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerunPolicy {
    /// A task whose target exists never runs
    #[default]
    Conservative,
    /// Directly requested tasks run even when their target exists;
    /// transitive dependencies still skip on existing targets
    ForceRequested,
}

/// Configured run entry point
pub struct Runner {
    set: TaskSet,
    workers: usize,
    rerun: RerunPolicy,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(set: TaskSet) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            set,
            workers,
            rerun: RerunPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Maximum number of tasks executing concurrently
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn rerun(mut self, policy: RerunPolicy) -> Self {
        self.rerun = policy;
        self
    }

    /// Token that cancels the run when triggered. Waiting tasks are
    /// reported as cancelled; running tasks see the signal cooperatively.
    ///
    /// Cancellation is permanent for this runner: once the token is
    /// triggered every later `run()` call reports its tasks as cancelled
    /// too. Build a fresh `Runner` to execute again.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the dependency graph for the requested specs and execute it.
    ///
    /// Structural problems (unknown families, bad declarations, cycles)
    /// return an error before any task runs. Per-task failures do not:
    /// they are contained to the failing task's downstream closure and
    /// reported in the `RunReport`.
    pub async fn run(&self, requests: &[TaskSpec]) -> Result<RunReport, EngineError> {
        if self.workers == 0 {
            return Err(EngineError::NoWorkers);
        }

        let graph = TaskGraph::build(&self.set, requests)?;
        let events = EventLog::new();
        events.emit(EventKind::RunStarted {
            task_count: graph.len(),
        });
        info!(tasks = graph.len(), workers = self.workers, "run started");

        let scheduler = Scheduler::new(
            &graph,
            self.workers,
            self.rerun,
            events.clone(),
            self.cancel.clone(),
        );
        let (states, required) = scheduler.execute().await;

        let mut tasks = Vec::new();
        for (id, state) in states.iter().enumerate() {
            if !required[id] {
                continue;
            }
            let node = graph.node(id);
            let status = match state {
                NodeState::Done { ran } => TaskStatus::Done { ran: *ran },
                NodeState::Failed(f) => TaskStatus::Failed(f.clone()),
                // execute() settles every required node
                _ => TaskStatus::Failed(TaskFailure::Cancelled),
            };
            tasks.push(TaskReport {
                key: node.key.clone(),
                requested: graph.requested.contains(&id),
                status,
            });
        }

        let completed = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Done { ran: true }))
            .count();
        let skipped = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Done { ran: false }))
            .count();
        let failed = tasks.len() - completed - skipped;

        if failed == 0 {
            events.emit(EventKind::RunCompleted { completed, skipped });
            info!(completed, skipped, "run completed");
        } else {
            events.emit(EventKind::RunFailed { completed, failed });
            warn!(completed, failed, "run failed");
        }

        Ok(RunReport { tasks, events })
    }
}

// ============================================================
// Report
// ============================================================

/// Terminal status of one task node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// `ran` is false when a pre-existing target satisfied the task
    Done { ran: bool },
    Failed(TaskFailure),
}

impl TaskStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done { .. })
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Done { ran: true } => write!(f, "done"),
            TaskStatus::Done { ran: false } => write!(f, "skipped (target exists)"),
            TaskStatus::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// Outcome of one task node in the run
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub key: TaskKey,
    /// Named directly in the run request (vs pulled in as a dependency)
    pub requested: bool,
    pub status: TaskStatus,
}

/// Full outcome of one run: a status per touched node plus the event log
#[derive(Debug)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
    pub events: EventLog,
}

impl RunReport {
    /// True iff every touched task is done (ran or already satisfied)
    pub fn succeeded(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_done())
    }

    /// Status of one task by spec, if it was part of the run
    pub fn status(&self, spec: &TaskSpec) -> Option<&TaskStatus> {
        let key = spec.key();
        self.tasks.iter().find(|t| t.key == key).map(|t| &t.status)
    }

    /// Tasks that actually executed
    pub fn completed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Done { ran: true }))
            .count()
    }

    /// Tasks satisfied by pre-existing targets
    pub fn skipped(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Done { ran: false }))
            .count()
    }

    pub fn failed(&self) -> Vec<&TaskReport> {
        self.tasks
            .iter()
            .filter(|t| !t.status.is_done())
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            writeln!(f, "{}: {}", task.key, task.status)?;
        }
        Ok(())
    }
}
