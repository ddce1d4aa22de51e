use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::thread_local;

// Exports
mod handoff;

mod id;
pub use id::ContextId;

pub(crate) mod single;
pub use single::{PumpStats, SingleThreadContext};

/// Cheap, cloneable reference to an execution context. Can be moved to and
/// shared with any thread. Two handles are equal when they refer to the same
/// context.
#[derive(Debug, Clone)]
pub struct ContextHandle(Arc<SingleThreadContext>);

impl ContextHandle {
    pub(crate) fn new(ctx: SingleThreadContext) -> Self {
        Self(Arc::new(ctx))
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ContextHandle {}

impl Deref for ContextHandle {
    type Target = SingleThreadContext;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// The ambient slot. Everything inside the crate passes its context explicitly;
// this is only consulted through `current()` by code that has no other way to
// reach the context it runs under.
thread_local! {
    static CURRENT: RefCell<Option<ContextHandle>> = const { RefCell::new(None) };
}

/// Returns the execution context installed on this thread, if any.
pub fn current() -> Option<ContextHandle> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Replace the execution context installed on this thread and return the
/// previous one. Prefer [`enter`], which restores the previous value for you.
pub fn set_current(ctx: Option<ContextHandle>) -> Option<ContextHandle> {
    CURRENT.with(|slot| slot.replace(ctx))
}

/// Install `ctx` as the ambient context of this thread until the returned
/// guard is dropped. The previous context is restored on drop, on every exit
/// path including unwinding.
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub fn enter(ctx: ContextHandle) -> EnterGuard {
    EnterGuard {
        previous: set_current(Some(ctx)),
        _not_send: PhantomData,
    }
}

/// Restores the previously installed context when dropped. Bound to the thread
/// that created it.
#[derive(Debug)]
pub struct EnterGuard {
    previous: Option<ContextHandle>,

    _not_send: PhantomData<*const ()>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        set_current(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::new_handle;
    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread;

    assert_impl_all!(ContextHandle: Send, Sync, Clone);
    assert_not_impl_any!(EnterGuard: Send, Sync);

    #[test]
    fn test_enter_restores_previous_context() {
        assert_eq!(current(), None);

        let outer = new_handle();
        let inner = new_handle();

        {
            let _outer = enter(outer.clone());
            assert_eq!(current().as_ref(), Some(&outer));

            {
                let _inner = enter(inner.clone());
                assert_eq!(current().as_ref(), Some(&inner));
            }

            assert_eq!(current().as_ref(), Some(&outer));
        }

        assert_eq!(current(), None);
    }

    #[test]
    fn test_enter_restores_on_unwind() {
        let outer = new_handle();
        let _outer = enter(outer.clone());

        let res = catch_unwind(AssertUnwindSafe(|| {
            let _inner = enter(new_handle());
            panic!("unwinding through the guard");
        }));

        assert!(res.is_err());
        assert_eq!(current().as_ref(), Some(&outer));
    }

    #[test]
    fn test_context_is_thread_local() {
        let handle = new_handle();
        let _guard = enter(handle.clone());

        let other = thread::spawn(|| current().is_none())
            .join()
            .expect("thread panicked");

        assert!(other, "ambient context does not leak to other threads");
        assert_eq!(current().map(|c| c.id()), Some(handle.id()));
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let a = new_handle();
        let b = new_handle();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }
}
