// opkit/src/pipeline/mod.rs

//! Defines the `Pipeline` builder state, the lookup step, and the `Script` walk
//! transaction executors run.

pub mod definition;
pub mod execution;
pub mod lookup;

pub use definition::Pipeline;
pub use execution::{Execution, Script};
pub use lookup::{ContextLookup, Lookup};
