use crate::context::{self, ContextHandle, EnterGuard, SingleThreadContext};
use crate::errors::RunError;
use crate::runtime::RuntimeConfig;
use crate::task::RootTask;
use std::fmt;
use tracing::{debug, trace};

/// Drives an asynchronous computation to completion on the calling thread.
///
/// Every call to [`Runner::block_on`] creates a fresh context owned by the
/// calling thread, installs it as the ambient context, pumps its queue until the
/// computation settles and restores whatever was installed before.
#[derive(Debug)]
pub struct Runner {
    cfg: RuntimeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Installed,
    Draining,
    Restored,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Installed => "installed",
            RunState::Draining => "draining",
            RunState::Restored => "restored",
        };
        f.write_str(s)
    }
}

/// Holds the context installed for the duration of one run.
///
/// Dropping it tears the context down, releasing any thread blocked on a
/// synchronous dispatch, and then restores the ambient slot through the
/// enter guard.
struct InstalledContext {
    ctx: ContextHandle,
    _enter: EnterGuard,
}

impl InstalledContext {
    fn install(ctx: ContextHandle) -> Self {
        let enter = context::enter(ctx.clone());
        Self { ctx, _enter: enter }
    }
}

impl Drop for InstalledContext {
    fn drop(&mut self) {
        self.ctx.teardown();
    }
}

impl Runner {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Runner { cfg }
    }

    /// Run `future` to completion on the calling thread and return its output.
    ///
    /// The calling thread becomes the owner of a new context for the duration
    /// of the call. The future and every continuation it schedules run on this
    /// thread, even when they are woken from other threads.
    ///
    /// The previously installed ambient context is restored on every exit path,
    /// including when a callback panic unwinds out of the pump.
    ///
    /// # Errors
    ///
    /// * [`RunError::Context`] if the pump failed. This takes precedence over
    ///   the outcome of the computation.
    /// * [`RunError::Panicked`] if the computation panicked.
    /// * [`RunError::Unsettled`] if the queue ended before the computation
    ///   settled, which happens when user code completes the context early.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, RunError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let ctx = ContextHandle::new(SingleThreadContext::new(&self.cfg));
        let mut state = RunState::Idle;

        let installed = InstalledContext::install(ctx.clone());
        transition(&ctx, &mut state, RunState::Installed);

        let task = RootTask::new(ctx.clone(), future);

        let completer = ctx.clone();
        task.on_settled(move || completer.complete());

        task.start()?;

        transition(&ctx, &mut state, RunState::Draining);
        let drained = ctx.run_on_current_thread();

        drop(installed);
        transition(&ctx, &mut state, RunState::Restored);

        let stats = drained?;
        debug!(
            context = %ctx.id(),
            executed = stats.executed,
            settled = task.is_settled(),
            "run finished"
        );

        match task.take_outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(payload)) => Err(RunError::panicked(payload)),
            None => Err(RunError::Unsettled),
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Runner::new(RuntimeConfig::default())
    }
}

fn transition(ctx: &ContextHandle, state: &mut RunState, next: RunState) {
    trace!(context = %ctx.id(), "{} -> {}", state, next);
    *state = next;
}
