//! The task graph: dependency structure plus per-build task status.

pub mod task_graph;


pub use task_graph::*;
