//! # Graph execution
//!
//! Drives a [`TaskGraph`](crate::graph::TaskGraph) to completion.
//!
//! The executor repeatedly asks the graph for ready tasks and runs each of them on its own
//! blocking worker thread. Completed tasks update the graph, which in turn makes their
//! dependants ready. A task that fails keeps every task that strictly depends on it from
//! running, while unrelated parts of the graph carry on.
//!
//! Tasks that return `STARTED` (for example a server started in the background) are
//! remembered and torn down only once every task that depends on them is done.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiln::executor::{GraphExecutor, LoggingObserver};
//! use kiln::task::{Context, FnTask, TaskStatus};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Context::new(".", "build");
//!     let task = ctx
//!         .root_project()
//!         .task("hello", FnTask::new(|_, io| {
//!             io.write("hello\n");
//!             Ok(TaskStatus::succeeded())
//!         }))?;
//!
//!     let graph = Arc::new(ctx.build_graph()?.trim(&[task])?);
//!     GraphExecutor::new()
//!         .execute_graph(&graph, Arc::new(LoggingObserver::new()))
//!         .await;
//!     assert!(graph.is_complete());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod graph_executor;
pub mod interrupt;
pub mod observer;
pub mod rememberer;


pub use error::*;
pub use graph_executor::*;
pub use interrupt::*;
pub use observer::*;
pub use rememberer::*;
