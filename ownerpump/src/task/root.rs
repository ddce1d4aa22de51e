use crate::context::ContextHandle;
use crate::errors::ContextError;
use crate::queue::State;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use tracing::trace;

type Finalizer = Box<dyn FnOnce() + Send + 'static>;

/// Adapts a future into the computation driven by a run: it can be started,
/// it accepts completion callbacks and it exposes its final outcome.
///
/// Every wake-up of the future, from any thread, is posted to the context as a
/// work item. The future is therefore only ever polled by the pump, on the
/// owner thread.
pub(crate) struct RootTask<F: Future> {
    ctx: ContextHandle,

    /// `None` once the future has settled.
    future: Mutex<Option<Pin<Box<F>>>>,

    outcome: Mutex<Option<thread::Result<F::Output>>>,

    /// Set while a poll is queued, so repeated wake-ups collapse into one.
    scheduled: AtomicBool,

    /// `None` once the finalizers have run.
    finalizers: Mutex<Option<Vec<Finalizer>>>,
}

impl<F> RootTask<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    pub(crate) fn new(ctx: ContextHandle, future: F) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            future: Mutex::new(Some(Box::pin(future))),
            outcome: Mutex::new(None),
            scheduled: AtomicBool::new(false),
            finalizers: Mutex::new(Some(Vec::new())),
        })
    }

    /// Queue the first poll.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), ContextError> {
        self.schedule()
    }

    /// Run `f` once the computation has settled, successfully or not. Runs
    /// immediately, on the calling thread, if it already has. Otherwise runs on
    /// whichever thread settles the computation.
    pub(crate) fn on_settled(&self, f: impl FnOnce() + Send + 'static) {
        let mut finalizers = self.finalizers.lock();
        match finalizers.as_mut() {
            Some(pending) => pending.push(Box::new(f)),
            None => {
                drop(finalizers);
                f();
            }
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.finalizers.lock().is_none()
    }

    pub(crate) fn take_outcome(&self) -> Option<thread::Result<F::Output>> {
        self.outcome.lock().take()
    }

    fn schedule(self: &Arc<Self>) -> Result<(), ContextError> {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let res = self
            .ctx
            .post(Some(Box::new(poll_root::<F>)), Box::new(Arc::clone(self)));

        if res.is_err() {
            self.scheduled.store(false, Ordering::Release);
        }

        res
    }

    fn run_poll(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock();
        let Some(future) = slot.as_mut() else {
            // Stale wake-up after the future settled.
            return;
        };

        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let res = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        let outcome = match res {
            Ok(Poll::Pending) => return,
            Ok(Poll::Ready(value)) => Ok(value),
            Err(payload) => Err(payload),
        };

        // Drop the future on the owner thread, before anyone observes the outcome.
        *slot = None;
        drop(slot);

        self.settle(outcome);
    }

    fn settle(&self, outcome: thread::Result<F::Output>) {
        trace!(context = %self.ctx.id(), failed = outcome.is_err(), "computation settled");
        *self.outcome.lock() = Some(outcome);

        let finalizers = self.finalizers.lock().take().unwrap_or_default();
        for f in finalizers {
            f();
        }
    }
}

fn poll_root<F>(state: State)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match state.downcast::<Arc<RootTask<F>>>() {
        Ok(task) => RootTask::run_poll(*task),
        Err(_) => unreachable!("root poll scheduled with a foreign state"),
    }
}

impl<F> Wake for RootTask<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // Late wake-ups after completion are expected, e.g. an offload thread
        // finishing after the run gave up on it.
        if let Err(e) = self.schedule() {
            trace!(context = %self.ctx.id(), "dropping wake-up: {}", e);
        }
    }
}
