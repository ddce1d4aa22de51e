#[doc(inline)]
pub use ownerpump_macros::main;

#[doc(inline)]
pub use ownerpump_macros::test;

pub mod context;
pub use context::ContextHandle;

pub mod errors;
pub use errors::{ContextError, RunError};

pub mod queue;

pub mod runtime;
pub use runtime::{Builder, Runner, block_on};

pub mod task;
pub use task::{offload, yield_now};

mod utils;

#[cfg(test)]
mod test_utils;
