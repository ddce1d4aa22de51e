use crate::errors::ContextError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug)]
enum Slot {
    Waiting,
    Done(Result<(), ContextError>),
    Dropped,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    filled: Condvar,
}

/// Result slot for one synchronous hand-off. The owner side fills it, the
/// sending thread parks on a condvar until it is filled. No executor is
/// involved, so the wait works from any thread, including one that is already
/// inside an async runtime.
pub(crate) fn handoff() -> (Reply, Wait) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Waiting),
        filled: Condvar::new(),
    });

    (Reply(Some(Arc::clone(&shared))), Wait(shared))
}

/// Owner side. Dropping it without replying wakes the waiter with
/// `Abandoned`.
#[derive(Debug)]
pub(crate) struct Reply(Option<Arc<Shared>>);

impl Reply {
    pub(crate) fn send(mut self, res: Result<(), ContextError>) {
        if let Some(shared) = self.0.take() {
            fill(&shared, Slot::Done(res));
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(shared) = self.0.take() {
            fill(&shared, Slot::Dropped);
        }
    }
}

fn fill(shared: &Shared, value: Slot) {
    *shared.slot.lock() = value;
    shared.filled.notify_one();
}

/// Sender side.
#[derive(Debug)]
pub(crate) struct Wait(Arc<Shared>);

impl Wait {
    /// Park until the owner replied or dropped its side.
    pub(crate) fn wait(self) -> Result<(), ContextError> {
        let mut slot = self.0.slot.lock();

        loop {
            match std::mem::replace(&mut *slot, Slot::Waiting) {
                Slot::Done(res) => return res,
                Slot::Dropped => return Err(ContextError::Abandoned),
                // Loop accounts for spurious wakeups.
                Slot::Waiting => self.0.filled.wait(&mut slot),
            }
        }
    }
}
