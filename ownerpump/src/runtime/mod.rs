// Public API
pub mod builder;
pub use builder::{Builder, OnCallbackPanic, SendPolicy};

pub mod runner;
pub use runner::Runner;

// Exports
pub(crate) use builder::RuntimeConfig;

#[cfg(test)]
mod tests;

/// Run `future` to completion on the calling thread with the default
/// configuration and return its output.
///
/// Shorthand for `Runner::default().block_on(future)`. Any failure of the run
/// is raised as a panic on the calling thread; a panic of the computation is
/// resumed with its original payload.
#[track_caller]
pub fn block_on<F>(future: F) -> F::Output
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Runner::default().block_on(future) {
        Ok(res) => res,
        Err(e) => e.resume(),
    }
}
