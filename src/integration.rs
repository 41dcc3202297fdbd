//! # Build sessions
//!
//! A [`BuildSession`] ties the front end to the engine for one invocation:
//!
//! ```text
//! kiln.toml ──► Context ──► full TaskGraph ──► (resume / restart)
//!                                  │
//!                      resolve selectors, trim
//!                                  │
//!                     mark excluded tasks as skipped
//!                                  │
//!                     GraphExecutor ──► save build state
//! ```
//!
//! The build state is saved after the graph ran whether or not it succeeded, so a failed
//! or interrupted build can be continued with `--resume`.
//!
//! ```rust,no_run
//! use kiln::cli::{BuildOptions, GraphOptions};
//! use kiln::executor::LoggingObserver;
//! use kiln::integration::BuildSession;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = BuildSession::open(BuildOptions::default())?;
//!     let graph = GraphOptions::with_selectors(["test"]);
//!     session.run(&graph, Arc::new(LoggingObserver::new())).await?;
//!     Ok(())
//! }
//! ```

use crate::address::Address;
use crate::cli::{BuildOptions, GraphOptions, load_context, parse_selectors};
use crate::executor::{BuildError, GraphExecutor, GraphExecutorObserver, Interrupt};
use crate::graph::{TaskFilter, TaskGraph};
use crate::state;
use crate::task::{Context as BuildContext, Task};
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const EXCLUDED_REASON: &str = "Excluded via CLI";

pub const EXCLUDED_ORIGIN: &str = "cli";

/// One invocation of the build: a loaded project tree plus where its state lives.
pub struct BuildSession {
    ctx: BuildContext,
    options: BuildOptions,
    state_name: String,
    interrupt: Interrupt,
}

impl BuildSession {
    /// Load the manifest of the project directory in `options` and every subproject it names.
    pub fn open(options: BuildOptions) -> Result<Self> {
        let project_dir = options.project_dir();
        let ctx = load_context(&project_dir, &options.build_dir())
            .with_context(|| format!("failed to load project in {}", project_dir.display()))?;
        Ok(Self::from_context(ctx, options))
    }

    /// A session for projects that were declared programmatically.
    pub fn from_context(ctx: BuildContext, options: BuildOptions) -> Self {
        let state_name = options.state_name();
        Self {
            ctx,
            options,
            state_name,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Name of the state file this session writes.
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    fn resolve(&self, selectors: &[String], set_selected: bool) -> Result<Vec<Arc<Task>>> {
        match parse_selectors(selectors)? {
            Some(selectors) => Ok(self
                .ctx
                .resolve_tasks(Some(selectors.as_slice()), &Address::root(), set_selected)?),
            None => Ok(Vec::new()),
        }
    }

    /// Build the graph `options` asks for: the full graph with any saved results applied,
    /// trimmed to the selected (or default) tasks unless `all` is set, with excluded tasks
    /// tagged to be skipped.
    pub async fn load_graph(&self, options: &GraphOptions) -> Result<Arc<TaskGraph>> {
        if options.restart && !options.resume {
            bail!("--restart can only be used together with --resume");
        }
        if !self.ctx.is_finalized() {
            self.ctx.finalize();
        }
        let full = self.ctx.build_graph()?;

        if options.resume {
            let state_dirs = self.options.state_dirs();
            let loaded = state::load(&state_dirs).await?;
            match loaded {
                _ if options.restart => info!("Restarting the build, saved results are ignored"),
                Some(state) => {
                    state.apply_to(&full);
                    full.resume();
                }
                None => bail!(
                    "cannot --resume without build state in {}",
                    state_dirs
                        .iter()
                        .map(|d| d.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        }

        for task in full.tasks(TaskFilter::ALL) {
            task.set_selected(false);
        }
        let selectors = parse_selectors(&options.selectors)?;
        let goals = self
            .ctx
            .resolve_tasks(selectors.as_deref(), &Address::root(), selectors.is_some())?;

        let graph = if options.all {
            full
        } else {
            Arc::new(full.trim(&goals)?)
        };

        let excluded = self.resolve(&options.exclude, false)?;
        let excluded_subgraphs = self.resolve(&options.exclude_subgraph, false)?;
        graph.mark_tasks_as_skipped(
            &excluded,
            &excluded_subgraphs,
            false,
            EXCLUDED_REASON,
            EXCLUDED_ORIGIN,
            true,
        );
        debug!("Selected {} task(s) for execution", graph.len());
        Ok(graph)
    }

    /// Execute the graph `options` selects and save the build state afterwards, also when the
    /// build failed. Fails with a [`BuildError`] if the graph did not complete.
    pub async fn run(
        &self,
        options: &GraphOptions,
        observer: Arc<dyn GraphExecutorObserver>,
    ) -> Result<Arc<TaskGraph>> {
        let graph = self.load_graph(options).await?;
        if graph.is_empty() {
            bail!("no tasks were selected");
        }

        GraphExecutor::new()
            .with_interrupt(self.interrupt.clone())
            .execute_graph(&graph, observer)
            .await;

        let complete = graph.is_complete();
        if !self.options.no_save {
            let saved = state::save(&self.options.state_dir(), &self.state_name, &graph).await;
            match saved {
                Ok(_) => {}
                Err(err) if complete => return Err(err).context("failed to save the build state"),
                Err(err) => error!("Failed to save the build state: {err}"),
            }
        }

        if !complete {
            return Err(BuildError::from_graph(&graph).into());
        }
        Ok(graph)
    }

    /// A listing of the graph `options` selects: tasks first, then groups, each sorted by
    /// address. Goals are marked with `*`.
    pub async fn list(&self, options: &GraphOptions) -> Result<String> {
        let graph = self.load_graph(options).await?;
        if graph.is_empty() {
            bail!("no tasks");
        }
        Ok(format_listing(&graph))
    }
}

/// Render `graph` the way `kiln ls` prints it.
pub fn format_listing(graph: &TaskGraph) -> String {
    let goals: HashSet<Address> = graph
        .tasks(TaskFilter::GOALS)
        .iter()
        .map(|t| t.address().clone())
        .collect();
    let mut tasks = graph.tasks(TaskFilter::ALL);
    tasks.sort_by_key(|t| t.address().to_string());
    let width = tasks
        .iter()
        .map(|t| t.address().to_string().len())
        .max()
        .unwrap_or(0);

    let line = |out: &mut String, task: &Task| {
        let marker = if goals.contains(task.address()) { '*' } else { ' ' };
        let mut text = format!("{marker} {:<width$}", task.address().to_string());
        if task.is_default() {
            text.push_str(" (default)");
        }
        if let Some(status) = graph.get_status(task.address()) {
            let _ = write!(text, " [{status}]");
        }
        if let Some(description) = task.describe() {
            let _ = write!(text, "  {description}");
        }
        let _ = writeln!(out, "  {}", text.trim_end());
    };

    let mut out = String::from("\nTasks\n\n");
    for task in tasks.iter().filter(|t| !t.is_group()) {
        line(&mut out, task);
    }
    if tasks.iter().any(|t| t.is_group()) {
        out.push_str("\nGroups\n\n");
        for task in tasks.iter().filter(|t| t.is_group()) {
            line(&mut out, task);
        }
    }
    out
}
