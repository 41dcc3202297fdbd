use super::interrupt::Interrupt;
use super::observer::GraphExecutorObserver;
use super::rememberer::TaskRememberer;
use crate::graph::TaskGraph;
use crate::task::{Task, TaskIo, TaskStatus, TaskTag};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Runs a single task body. Called on a blocking worker thread.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute_task(&self, task: &Task, io: &TaskIo) -> TaskStatus;

    fn teardown_task(&self, task: &Task, io: &TaskIo) -> TaskStatus;
}

/// Calls the task directly, turning errors and panics into a failed status.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTaskExecutor;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

impl DefaultTaskExecutor {
    fn call<F>(task: &Task, func: F) -> TaskStatus
    where
        F: FnOnce() -> anyhow::Result<Option<TaskStatus>>,
    {
        match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(Ok(Some(status))) if status.is_pending() => {
                TaskStatus::failed(format!("bad status: {}", status.kind))
            }
            Ok(Ok(Some(status))) => status,
            Ok(Ok(None)) => TaskStatus::succeeded(),
            Ok(Err(err)) => {
                error!("{task} raised an error: {err:#}");
                TaskStatus::failed(format!("unhandled exception: {err}"))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{task} panicked: {message}");
                TaskStatus::failed(format!("unhandled exception: {message}"))
            }
        }
    }
}

impl TaskExecutor for DefaultTaskExecutor {
    fn execute_task(&self, task: &Task, io: &TaskIo) -> TaskStatus {
        Self::call(task, || task.execute(io).map(Some))
    }

    fn teardown_task(&self, task: &Task, io: &TaskIo) -> TaskStatus {
        Self::call(task, || task.teardown(io))
    }
}

enum Finished {
    Executed(Arc<Task>, TaskStatus),
    TornDown(Arc<Task>, TaskStatus),
}

enum Event {
    Joined(Option<Result<Finished, tokio::task::JoinError>>),
    Interrupted,
}

/// Executes a [`TaskGraph`], running every ready task on its own blocking thread.
///
/// Tasks that return `Started` keep running in the background and are torn down once all
/// of their dependants are done, or at the end of the build at the latest.
#[derive(Debug, Clone)]
pub struct GraphExecutor<E = DefaultTaskExecutor> {
    executor: Arc<E>,
    interrupt: Interrupt,
}

impl GraphExecutor<DefaultTaskExecutor> {
    pub fn new() -> Self {
        Self::with_executor(DefaultTaskExecutor)
    }
}

impl Default for GraphExecutor<DefaultTaskExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TaskExecutor> GraphExecutor<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor: Arc::new(executor),
            interrupt: Interrupt::new(),
        }
    }

    /// Use `interrupt` to stop the build. No new tasks are started once it is triggered.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Run `graph` until nothing is ready anymore. Whether the build succeeded is told by
    /// [`TaskGraph::is_complete`].
    pub async fn execute_graph(&self, graph: &Arc<TaskGraph>, observer: Arc<dyn GraphExecutorObserver>) {
        let mut run = Run {
            executor: Arc::clone(&self.executor),
            interrupt: self.interrupt.clone(),
            graph: Arc::clone(graph),
            observer,
            remember: TaskRememberer::new(),
            running: JoinSet::new(),
            interrupted: false,
        };

        run.observer.before_execute_graph(graph);
        loop {
            if self.interrupt.is_triggered() {
                run.interrupted = true;
            }
            if !run.interrupted && !graph.is_complete() {
                let ready = graph.ready();
                if !ready.is_empty() {
                    run.invoke_execute(ready);
                    continue;
                }
            }
            if run.running.is_empty() {
                break;
            }

            let interrupted = run.interrupted;
            let event = tokio::select! {
                joined = run.running.join_next() => Event::Joined(joined),
                _ = self.interrupt.triggered(), if !interrupted => Event::Interrupted,
            };
            match event {
                Event::Joined(Some(joined)) => run.finish(joined),
                Event::Joined(None) => break,
                Event::Interrupted => {
                    warn!("Build interrupted, waiting for {} running task(s)", run.running.len());
                    run.interrupted = true;
                }
            }
        }

        let remaining = run.remember.forget_all();
        run.invoke_teardown(remaining);
        while let Some(joined) = run.running.join_next().await {
            run.finish(joined);
        }
        run.observer.after_execute_graph(graph);
    }
}

/// State of a single graph execution.
struct Run<E> {
    executor: Arc<E>,
    interrupt: Interrupt,
    graph: Arc<TaskGraph>,
    observer: Arc<dyn GraphExecutorObserver>,
    remember: TaskRememberer,
    running: JoinSet<Finished>,
    interrupted: bool,
}

impl<E: TaskExecutor> Run<E> {
    fn io_for(&self, task: &Arc<Task>) -> TaskIo {
        let observer = Arc::clone(&self.observer);
        let owner = Arc::clone(task);
        TaskIo::new(move |chunk| observer.on_task_output(&owner, chunk), self.interrupt.clone())
    }

    fn invoke_execute(&mut self, tasks: Vec<Arc<Task>>) {
        for task in tasks {
            if self.interrupted {
                break;
            }

            let skip_tags = task.get_tags(TaskTag::SKIP);
            let status = if !skip_tags.is_empty() {
                let reasons: Vec<&str> = skip_tags.iter().map(|t| t.reason.as_str()).collect();
                TaskStatus::skipped(reasons.join("; "))
            } else {
                self.observer.before_prepare_task(&task);
                let status = task.prepare().unwrap_or_else(TaskStatus::pending);
                self.observer.after_prepare_task(&task, &status);
                if status.is_pending() {
                    self.observer.before_execute_task(&task, &status);
                    let executor = Arc::clone(&self.executor);
                    let io = self.io_for(&task);
                    self.running.spawn_blocking(move || {
                        let status = executor.execute_task(&task, &io);
                        Finished::Executed(task, status)
                    });
                    continue;
                }
                status
            };
            self.execute_done(task, status);
        }
    }

    fn invoke_teardown(&mut self, tasks: Vec<Arc<Task>>) {
        for task in tasks {
            self.observer.before_teardown_task(&task);
            let executor = Arc::clone(&self.executor);
            let io = self.io_for(&task);
            self.running.spawn_blocking(move || {
                let status = executor.teardown_task(&task, &io);
                Finished::TornDown(task, status)
            });
        }
    }

    fn finish(&mut self, joined: Result<Finished, tokio::task::JoinError>) {
        match joined {
            Ok(Finished::Executed(task, status)) => self.execute_done(task, status),
            Ok(Finished::TornDown(task, status)) => self.teardown_done(task, status),
            Err(err) => error!("A task worker did not finish: {err}"),
        }
    }

    fn set_status(&self, task: &Task, status: &TaskStatus) {
        if let Err(err) = self.graph.set_status(task, status.clone()) {
            error!("{err}");
        }
    }

    fn execute_done(&mut self, task: Arc<Task>, status: TaskStatus) {
        self.set_status(&task, &status);
        self.observer.after_execute_task(&task, &status);
        if status.is_started() {
            let dependants = self
                .graph
                .get_successors(&task, true)
                .into_iter()
                .map(|t| t.address().clone());
            debug!("{task} keeps running in the background");
            self.remember.remember(task, dependants);
        } else {
            if status.is_interrupted() {
                self.interrupted = true;
            }
            let released = self.remember.done(task.address());
            self.invoke_teardown(released);
        }
    }

    fn teardown_done(&mut self, task: Arc<Task>, status: TaskStatus) {
        if status.is_interrupted() {
            self.interrupted = true;
        }
        self.set_status(&task, &status);
        self.observer.after_teardown_task(&task, &status);
        let released = self.remember.done(task.address());
        self.invoke_teardown(released);
    }
}
