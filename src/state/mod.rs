//! Persisted build state, used to resume a build across invocations.

pub mod store;

#[cfg(test)]
mod tests;

pub use store::*;
