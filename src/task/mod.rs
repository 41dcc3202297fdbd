//! Projects, the tasks they declare, and the context that resolves task selectors.

pub mod context;
pub mod library;
pub mod project;
pub mod status;
pub mod task;


pub use context::*;
pub use library::*;
pub use project::*;
pub use status::*;
pub use task::*;
