use crate::context::ContextId;
use crate::context::handoff::handoff;
use crate::errors::{ContextError, panic_message};
use crate::queue::{Callback, State, Take, WorkItem, WorkQueue};
use crate::runtime::{OnCallbackPanic, RuntimeConfig, SendPolicy};
use crate::utils::tracker::{Call, Method};
#[cfg(test)]
use crate::utils::tracker::Tracker;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

/// Counters reported by a completed drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub executed: usize,
}

/// Execution context bound to the thread that created it.
///
/// Any thread may dispatch work onto the context. Queued work only ever runs
/// inside [`SingleThreadContext::run_on_current_thread`], on the owner thread,
/// one item at a time and in admission order.
#[derive(Debug)]
pub struct SingleThreadContext {
    id: ContextId,

    /// Thread on which the context was created. Never changes.
    owner: ThreadId,

    queue: WorkQueue,

    cfg: RuntimeConfig,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl SingleThreadContext {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            id: ContextId::next(),
            owner: thread::current().id(),
            queue: WorkQueue::new(),
            cfg: cfg.clone(),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn send_policy(&self) -> SendPolicy {
        self.cfg.send_policy
    }

    /// Number of work items waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_completed(&self) -> bool {
        self.queue.is_completed()
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.cfg
    }

    /// Synchronous dispatch.
    ///
    /// On the owner thread the callback runs in place before this returns, and
    /// the queue is not touched. A panic in the callback unwinds through the
    /// caller.
    ///
    /// From any other thread the callback is queued and the caller blocks until
    /// the owner thread has run it. The owner must be pumping (or start
    /// pumping) for this to return; a callback that panics on the owner thread
    /// is reported as [`ContextError::CallbackPanicked`], and a callback dropped
    /// undrained as [`ContextError::Abandoned`].
    pub fn send(&self, callback: Option<Callback>, state: State) -> Result<(), ContextError> {
        let item = WorkItem::try_new(callback, state)?;

        if self.cfg.send_policy == SendPolicy::Forbidden {
            return Err(ContextError::NotSupported);
        }

        if self.is_owner_thread() {
            self.track(Method::Send, Call::Send { inline: true });
            item.run();
            return Ok(());
        }

        self.track(Method::Send, Call::Send { inline: false });
        self.send_and_wait(item)
    }

    /// Asynchronous dispatch. Always queues, whatever the calling thread, and
    /// returns without waiting.
    pub fn post(&self, callback: Option<Callback>, state: State) -> Result<(), ContextError> {
        let item = WorkItem::try_new(callback, state)?;
        self.enqueue(item)
    }

    pub fn send_fn<F>(&self, f: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Some(Box::new(move |_| f())), Box::new(()))
    }

    pub fn post_fn<F>(&self, f: F) -> Result<(), ContextError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(Some(Box::new(move |_| f())), Box::new(()))
    }

    /// Signal that no more work will be posted. The pump returns once every
    /// item admitted before this call has run. Callable from any thread.
    pub fn complete(&self) {
        let pending = self.queue.len();
        self.track(Method::Complete, Call::Complete { pending });
        debug!(context = %self.id, "complete, work queue has {} items", pending);
        self.queue.complete();
    }

    /// Drain the queue on the owner thread until the completion signal has
    /// fired and every queued item has run.
    ///
    /// Blocks while the queue is empty but not completed. Fails with
    /// [`ContextError::WrongThread`] without running anything when called from
    /// another thread.
    ///
    /// With [`OnCallbackPanic::Propagate`] a panicking callback unwinds out of
    /// this call and the items behind it stay queued.
    pub fn run_on_current_thread(&self) -> Result<PumpStats, ContextError> {
        self.check_owner()?;

        debug!(context = %self.id, "run {} items in work queue", self.queue.len());

        let mut stats = PumpStats::default();
        let mut panicked = 0;
        let mut first_panic: Option<String> = None;

        while let Take::Item(item) = self.queue.try_take() {
            match self.cfg.on_callback_panic {
                OnCallbackPanic::Propagate => item.run(),
                OnCallbackPanic::Collect => {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || item.run()))
                    {
                        let message = panic_message(payload.as_ref());
                        warn!(context = %self.id, "callback panicked while draining: {}", message);
                        panicked += 1;
                        first_panic.get_or_insert(message);
                    }
                }
            }

            stats.executed += 1;
        }

        self.track(
            Method::Drain,
            Call::Drain {
                executed: stats.executed,
            },
        );
        trace!(context = %self.id, executed = stats.executed, "work queue drained");

        match first_panic {
            Some(message) => Err(ContextError::CallbackPanicked {
                count: panicked,
                message,
            }),
            None => Ok(stats),
        }
    }

    /// Complete the queue and drop whatever was never drained. Blocked
    /// synchronous senders are released with `Abandoned`.
    pub(crate) fn teardown(&self) {
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!(context = %self.id, "dropped {} undrained work items", dropped);
        }
    }

    fn check_owner(&self) -> Result<(), ContextError> {
        let current = thread::current().id();
        if current == self.owner {
            Ok(())
        } else {
            Err(ContextError::WrongThread {
                owner: self.owner,
                current,
            })
        }
    }

    fn enqueue(&self, item: WorkItem) -> Result<(), ContextError> {
        let len = self.queue.add(item)?;
        self.track(Method::Post, Call::Post { len });
        debug!(context = %self.id, "posted, work queue has {} items", len);
        Ok(())
    }

    fn send_and_wait(&self, item: WorkItem) -> Result<(), ContextError> {
        let (reply, wait) = handoff();

        let callback: Callback = Box::new(move |_| {
            match panic::catch_unwind(AssertUnwindSafe(move || item.run())) {
                Ok(()) => reply.send(Ok(())),
                Err(payload) => {
                    reply.send(Err(ContextError::CallbackPanicked {
                        count: 1,
                        message: panic_message(payload.as_ref()),
                    }));

                    // The owner thread still sees the failure, the pump policy
                    // decides what happens to it.
                    panic::resume_unwind(payload);
                }
            }
        });

        self.enqueue(WorkItem::new(callback, Box::new(())))?;

        // A dropped reply means the item was discarded undrained.
        wait.wait()
    }

    // Price paid to get introspection on every dispatch call during testing.
    // No-op outside of tests.
    #[allow(unused)]
    #[inline(always)]
    fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }
}
