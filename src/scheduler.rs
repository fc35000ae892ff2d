//! Scheduler: readiness tracking and the bounded worker pool
//!
//! One coordinating loop owns all node state; workers only execute tasks
//! and report verdicts back over a channel, so bookkeeping needs no locks.
//! A node becomes ready when every dependency is done, runs at most once,
//! and on failure poisons its entire downstream closure with the
//! originating task's name.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TaskFailure;
use crate::event_log::{EventKind, EventLog};
use crate::graph::{NodeId, TaskGraph};
use crate::run::RerunPolicy;

/// Per-node lifecycle state
#[derive(Debug, Clone)]
pub(crate) enum NodeState {
    Pending,
    Ready,
    Running,
    /// `ran` is false when the node was satisfied by a pre-existing target
    Done {
        ran: bool,
    },
    Failed(TaskFailure),
}

/// Worker verdict for one executed task
enum Verdict {
    Done,
    Failed(TaskFailure),
}

pub(crate) struct Scheduler<'a> {
    graph: &'a TaskGraph,
    workers: usize,
    rerun: RerunPolicy,
    events: EventLog,
    cancel: CancellationToken,
    states: Vec<NodeState>,
    /// Nodes that must reach Done for the run to succeed. Satisfied tasks
    /// do not pull their upstream into this set.
    required: Vec<bool>,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        graph: &'a TaskGraph,
        workers: usize,
        rerun: RerunPolicy,
        events: EventLog,
        cancel: CancellationToken,
    ) -> Self {
        let n = graph.len();
        Self {
            graph,
            workers,
            rerun,
            events,
            cancel,
            states: vec![NodeState::Pending; n],
            required: vec![false; n],
        }
    }

    /// Execute the graph and return the final state of every node.
    /// Nodes outside the required set stay `Pending`.
    pub(crate) async fn execute(mut self) -> (Vec<NodeState>, Vec<bool>) {
        self.survey();
        self.poison_initial_failures();
        self.run_pool().await;

        // anything still waiting at this point was starved by cancellation
        for id in 0..self.graph.len() {
            if self.required[id] && matches!(self.states[id], NodeState::Pending | NodeState::Ready)
            {
                self.states[id] = NodeState::Failed(TaskFailure::Cancelled);
            }
        }
        (self.states, self.required)
    }

    // ============================================================
    // Phase 1: survey targets and settle the required set
    // ============================================================

    /// Walk down from the requested nodes checking output targets.
    /// A node whose target already exists is done without running and the
    /// walk does not descend into its dependencies; they only run if some
    /// other unsatisfied node needs them.
    fn survey(&mut self) {
        let mut stack: Vec<NodeId> = self.graph.requested.clone();
        while let Some(id) = stack.pop() {
            if self.required[id] {
                continue;
            }
            self.required[id] = true;

            let node = self.graph.node(id);
            let force = matches!(self.rerun, RerunPolicy::ForceRequested)
                && self.graph.requested.contains(&id);

            match node.task.output().exists() {
                Ok(true) if !force => {
                    debug!(task = %node.key, "target exists, skipping");
                    self.states[id] = NodeState::Done { ran: false };
                    self.events.emit(EventKind::TaskSkipped {
                        task_id: node.key.to_string().into(),
                    });
                }
                Ok(_) => {
                    self.events.emit(EventKind::TaskScheduled {
                        task_id: node.key.to_string().into(),
                        dependencies: node
                            .deps
                            .iter()
                            .map(|&d| self.graph.node(d).key.to_string().into())
                            .collect(),
                    });
                    stack.extend(&node.deps);
                }
                Err(e) => {
                    self.states[id] = NodeState::Failed(TaskFailure::Check(e.to_string()));
                    self.events.emit(EventKind::TaskFailed {
                        task_id: node.key.to_string().into(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Nodes whose target check failed during the survey poison their
    /// downstream before any worker starts.
    fn poison_initial_failures(&mut self) {
        for id in 0..self.graph.len() {
            if matches!(self.states[id], NodeState::Failed(TaskFailure::Check(_))) {
                let origin = self.graph.node(id).key.to_string();
                self.fail_downstream(id, &origin);
            }
        }
    }

    // ============================================================
    // Phase 2: worker pool
    // ============================================================

    async fn run_pool(&mut self) {
        // dependencies not yet Done, per required pending node
        let mut unmet: Vec<usize> = vec![0; self.graph.len()];
        let mut ready: VecDeque<NodeId> = VecDeque::new();

        for id in 0..self.graph.len() {
            if !self.required[id] || !matches!(self.states[id], NodeState::Pending) {
                continue;
            }
            let pending_deps = self.graph.node(id).deps.iter().filter(|&&d| {
                !matches!(self.states[d], NodeState::Done { .. })
            });
            unmet[id] = pending_deps.count();
            if unmet[id] == 0 {
                self.states[id] = NodeState::Ready;
                ready.push_back(id);
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<(NodeId, Verdict, u64)>();
        let mut running = 0usize;

        loop {
            while running < self.workers && !self.cancel.is_cancelled() {
                let Some(id) = ready.pop_front() else { break };
                if !matches!(self.states[id], NodeState::Ready) {
                    continue;
                }
                self.states[id] = NodeState::Running;
                running += 1;
                self.spawn_worker(id, tx.clone());
            }

            if running == 0 {
                break;
            }

            let Some((id, verdict, duration_ms)) = rx.recv().await else {
                break;
            };
            running -= 1;

            let key = self.graph.node(id).key.to_string();
            match verdict {
                Verdict::Done => {
                    self.states[id] = NodeState::Done { ran: true };
                    self.events.emit(EventKind::TaskCompleted {
                        task_id: key.into(),
                        duration_ms,
                    });
                    for &dep in &self.graph.node(id).dependents {
                        if self.required[dep] && matches!(self.states[dep], NodeState::Pending) {
                            unmet[dep] -= 1;
                            if unmet[dep] == 0 {
                                self.states[dep] = NodeState::Ready;
                                ready.push_back(dep);
                            }
                        }
                    }
                }
                Verdict::Failed(failure) => {
                    self.events.emit(EventKind::TaskFailed {
                        task_id: key.clone().into(),
                        error: failure.to_string(),
                    });
                    self.states[id] = NodeState::Failed(failure);
                    self.fail_downstream(id, &key);
                }
            }
        }
    }

    fn spawn_worker(&self, id: NodeId, tx: mpsc::UnboundedSender<(NodeId, Verdict, u64)>) {
        let node = self.graph.node(id);
        let task = Arc::clone(&node.task);
        let cancel = self.cancel.clone();

        self.events.emit(EventKind::TaskStarted {
            task_id: node.key.to_string().into(),
        });
        debug!(task = %node.key, "starting");

        tokio::spawn(async move {
            let started = Instant::now();
            let verdict = match task.run(&cancel).await {
                // a clean return still has to materialize the output
                Ok(()) => match task.output().exists() {
                    Ok(true) => Verdict::Done,
                    Ok(false) => Verdict::Failed(TaskFailure::Postcondition {
                        target: task.output().identity(),
                    }),
                    Err(e) => Verdict::Failed(TaskFailure::Check(e.to_string())),
                },
                Err(e) => Verdict::Failed(TaskFailure::Run(e.to_string())),
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            // receiver dropping means the run is over; nothing to report to
            let _ = tx.send((id, verdict, duration_ms));
        });
    }

    /// Mark every waiting node downstream of `id` as failed, carrying the
    /// originating task's name through the whole closure.
    fn fail_downstream(&mut self, id: NodeId, origin: &str) {
        let mut stack: Vec<NodeId> = self.graph.node(id).dependents.clone();
        while let Some(next) = stack.pop() {
            if !self.required[next]
                || !matches!(self.states[next], NodeState::Pending | NodeState::Ready)
            {
                continue;
            }
            self.states[next] = NodeState::Failed(TaskFailure::Upstream {
                origin: origin.to_string(),
            });
            self.events.emit(EventKind::TaskFailed {
                task_id: self.graph.node(next).key.to_string().into(),
                error: format!("upstream task {origin} failed"),
            });
            stack.extend(&self.graph.node(next).dependents);
        }
    }
}
