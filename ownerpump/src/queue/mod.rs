use crate::errors::ContextError;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

/// Opaque payload handed to a callback when its work item runs.
pub type State = Box<dyn Any + Send>;

/// Unary procedure executed on the owner thread.
pub type Callback = Box<dyn FnOnce(State) + Send + 'static>;

/// One unit of deferred execution: a callback and the state it will receive.
/// Immutable once built and consumed by [`WorkItem::run`].
pub struct WorkItem {
    callback: Callback,
    state: State,
}

impl WorkItem {
    pub fn new(callback: Callback, state: State) -> Self {
        Self { callback, state }
    }

    /// Build a work item from an optional callback. A missing callback is the
    /// only way a work item can be rejected at construction time.
    pub fn try_new(callback: Option<Callback>, state: State) -> Result<Self, ContextError> {
        callback
            .map(|callback| Self::new(callback, state))
            .ok_or(ContextError::NullCallback)
    }

    #[inline(always)]
    pub fn run(self) {
        (self.callback)(self.state)
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").finish_non_exhaustive()
    }
}

/// Result of a blocking take on the [`WorkQueue`].
#[derive(Debug)]
pub enum Take {
    Item(WorkItem),

    /// The queue is completed and every admitted item has been handed out.
    EndOfQueue,
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<WorkItem>,
    completed: bool,
}

/// Multi-producer, single-consumer blocking FIFO with an explicit "no more
/// items" signal.
///
/// Producers never block on [`WorkQueue::add`]. The consumer parks on a
/// condition variable inside [`WorkQueue::try_take`] while the queue is empty
/// and not completed, and is woken by the next admission or by
/// [`WorkQueue::complete`].
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a work item at the tail. Returns the queue length after the
    /// admission.
    pub fn add(&self, item: WorkItem) -> Result<usize, ContextError> {
        let len = {
            let mut inner = self.inner.lock();
            if inner.completed {
                return Err(ContextError::AlreadyCompleted);
            }

            inner.items.push_back(item);
            inner.items.len()
        };

        self.not_empty.notify_one();
        Ok(len)
    }

    /// Block until an item can be taken from the head, or until the queue is
    /// completed and empty.
    pub fn try_take(&self) -> Take {
        let mut inner = self.inner.lock();

        loop {
            if let Some(item) = inner.items.pop_front() {
                return Take::Item(item);
            }

            if inner.completed {
                return Take::EndOfQueue;
            }

            // Loop accounts for spurious wakeups.
            self.not_empty.wait(&mut inner);
        }
    }

    /// Signal that no more items will be admitted. Idempotent. Items already
    /// queued stay queued until taken.
    pub fn complete(&self) {
        self.inner.lock().completed = true;
        self.not_empty.notify_all();
    }

    /// Complete the queue and drop every item that was never taken.
    pub(crate) fn clear(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            inner.completed = true;
            std::mem::take(&mut inner.items)
        };

        self.not_empty.notify_all();

        // Dropped outside the lock, item destructors may touch the queue.
        let n = dropped.len();
        drop(dropped);
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().completed
    }
}
