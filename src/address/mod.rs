//! Hierarchical addresses for projects and tasks, and their resolution against a tree.

pub mod address;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use address::*;
pub use resolver::*;
