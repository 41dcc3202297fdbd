use crate::address::Address;
use crate::graph::{TaskFilter, TaskGraph};
use crate::task::{Task, TaskStatus};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const TASKS_NOT_EXECUTED_TITLE: &str = "Tasks that were not executed due to failing dependencies";

/// Receives lifecycle events from the graph executor. Every method defaults to doing nothing.
///
/// Task events may arrive from worker threads, so implementations must be thread safe.
#[allow(unused_variables)]
pub trait GraphExecutorObserver: Send + Sync {
    fn before_execute_graph(&self, graph: &TaskGraph) {}

    fn before_prepare_task(&self, task: &Task) {}

    fn after_prepare_task(&self, task: &Task, status: &TaskStatus) {}

    fn before_execute_task(&self, task: &Task, status: &TaskStatus) {}

    fn on_task_output(&self, task: &Task, chunk: &str) {}

    fn after_execute_task(&self, task: &Task, status: &TaskStatus) {}

    fn before_teardown_task(&self, task: &Task) {}

    fn after_teardown_task(&self, task: &Task, status: &TaskStatus) {}

    fn after_execute_graph(&self, graph: &TaskGraph) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl GraphExecutorObserver for NullObserver {}

#[derive(Debug, Default)]
struct Record {
    statuses: Vec<(Address, TaskStatus)>,
    started: HashMap<Address, Instant>,
    durations: HashMap<Address, Duration>,
}

impl Record {
    fn set(&mut self, address: &Address, status: &TaskStatus) {
        match self.statuses.iter_mut().find(|(a, _)| a == address) {
            Some(entry) => entry.1 = status.clone(),
            None => self.statuses.push((address.clone(), status.clone())),
        }
    }
}

/// Logs task lifecycle events, forwards task output to stdout and prints a summary once
/// the graph is done.
#[derive(Debug, Default)]
pub struct LoggingObserver {
    record: Mutex<Record>,
    quiet: bool,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Don't forward task output or print the summary; only log.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_report(task: &Task, status: &TaskStatus) -> bool {
        !(task.is_group() && status.is_skipped())
    }

    /// The end of build report: every reported status with its duration, followed by the
    /// tasks that never ran.
    pub fn summary(&self, graph: &TaskGraph) -> String {
        let record = self.record();
        let mut out = String::from("\nBuild summary\n\n");
        for (address, status) in &record.statuses {
            let reported = graph
                .get_task(address)
                .is_none_or(|task| Self::should_report(&task, status));
            if !reported {
                continue;
            }
            let _ = write!(out, "  {address} {status}");
            if let Some(duration) = record.durations.get(address) {
                let _ = write!(out, " [{:.3}s]", duration.as_secs_f64());
            }
            out.push('\n');
        }

        let not_executed: Vec<_> = graph
            .tasks(TaskFilter::NOT_EXECUTED)
            .into_iter()
            .filter(|task| !task.is_group())
            .collect();
        if !not_executed.is_empty() {
            let _ = write!(out, "\n{TASKS_NOT_EXECUTED_TITLE}\n\n");
            for task in not_executed {
                let _ = writeln!(out, "  {}", task.address());
            }
        }
        out
    }
}

impl GraphExecutorObserver for LoggingObserver {
    fn before_execute_graph(&self, graph: &TaskGraph) {
        info!("Start build ({} task(s))", graph.len());
    }

    fn after_prepare_task(&self, task: &Task, status: &TaskStatus) {
        debug!("Prepared {task}: {status}");
    }

    fn before_execute_task(&self, task: &Task, _status: &TaskStatus) {
        info!("> {task}");
        self.record().started.insert(task.address().clone(), Instant::now());
    }

    fn on_task_output(&self, _task: &Task, chunk: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }

    fn after_execute_task(&self, task: &Task, status: &TaskStatus) {
        if Self::should_report(task, status) {
            if status.is_not_ok() {
                warn!("> {task} {status}");
            } else {
                info!("> {task} {status}");
            }
        }
        let mut record = self.record();
        record.set(task.address(), status);
        if let Some(started) = record.started.get(task.address()).copied() {
            record.durations.insert(task.address().clone(), started.elapsed());
        }
    }

    fn before_teardown_task(&self, task: &Task) {
        info!("X {task}");
    }

    fn after_teardown_task(&self, task: &Task, status: &TaskStatus) {
        info!("X {task} {status}");
        self.record().set(task.address(), status);
    }

    fn after_execute_graph(&self, graph: &TaskGraph) {
        if self.quiet {
            return;
        }
        println!("{}", self.summary(graph));
    }
}
