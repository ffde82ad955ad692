//! Statement execution and result normalization.
//!
//! Routes classified SQL to the right backend path and turns whatever the
//! backend returned into a uniform table of text cells.

pub mod executor;
mod tabular;

pub use executor::ExecutionEngine;
pub use tabular::TabularResult;
