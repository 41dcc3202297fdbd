//! Typed, lazily evaluated task properties and the supplier lineage behind them.

pub mod property;
pub mod supplier;
pub mod value;

#[cfg(test)]
mod tests;

pub use property::*;
pub use supplier::*;
pub use value::*;
