//! # Kiln
//!
//! A build orchestration engine. Projects form a tree of named tasks, addressed with a
//! small path grammar (`:lib:compile`, `**:test`, `app:`). Tasks declare typed properties
//! whose values may come from other tasks, and the dependencies implied by that lineage
//! are added to the task graph next to the declared ones.
//!
//! ## Modules
//!
//! - **[`address`]**: Parsing, normalizing and resolving task addresses
//! - **[`property`]**: Typed task properties and the lazy suppliers behind them
//! - **[`task`]**: Projects, tasks, groups and the context that resolves selectors
//! - **[`graph`]**: The task graph with per-build task status
//! - **[`executor`]**: Concurrent graph execution with deferred teardown of background tasks
//! - **[`state`]**: Persisted build state for `--resume`
//! - **[`integration`]**: A build session tying manifest, graph, executor and state together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kiln::task::{Context, FnTask, RelationshipMode, TaskStatus};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Context::new(".", "build");
//!     let root = ctx.root_project();
//!     let generate = root.task("generate", FnTask::new(|_, io| {
//!         io.write("generating\n");
//!         Ok(TaskStatus::succeeded())
//!     }))?;
//!     let compile = root.task("compile", FnTask::new(|_, _| Ok(TaskStatus::succeeded())))?;
//!     compile.depends_on(&generate, RelationshipMode::Strict);
//!     compile.set_default(true);
//!
//!     ctx.execute(None).await?;
//!     Ok(())
//! }
//! ```

pub mod address;

pub mod property;

pub mod task;

pub mod graph;

pub mod executor;

/// Persisted build state.
pub mod state;

pub mod integration;

/// File and directory names used by a build.
pub mod env;

/// Command line front end.
pub mod cli;

pub use address::{Address, AddressParseError, AddressResolutionError};
pub use executor::{BuildError, GraphExecutor, Interrupt};
pub use graph::TaskGraph;
pub use integration::BuildSession;
pub use task::{Context, Project, Task, TaskStatus};
