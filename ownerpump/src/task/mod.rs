// Public API
mod offload;
pub use self::offload::{Offload, offload};

mod yield_now;
pub use self::yield_now::{YieldNow, yield_now};

// Exports
pub(crate) mod root;
pub(crate) use self::root::RootTask;
