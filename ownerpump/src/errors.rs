use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::thread::ThreadId;

/// Errors raised synchronously by the dispatch and drain operations of a
/// context. None of them are swallowed: each one is returned to the immediate
/// caller of the violating operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Dispatch was called without a callback. Rejected before queueing.
    #[error("dispatch requires a callback")]
    NullCallback,

    /// A work item was admitted after the completion signal fired.
    #[error("work queue already completed, no more items can be admitted")]
    AlreadyCompleted,

    /// Synchronous dispatch on a post-only context.
    #[error("synchronous dispatch is not supported by this context")]
    NotSupported,

    /// An owner-only operation was invoked from another thread.
    #[error("must be called on the owner thread {owner:?}, called from {current:?}")]
    WrongThread { owner: ThreadId, current: ThreadId },

    /// One or more drained callbacks panicked. `message` belongs to the first.
    #[error("{count} callback(s) panicked while draining, first: {message}")]
    CallbackPanicked { count: usize, message: String },

    /// A synchronous hand-off was dropped before the owner thread ran it.
    #[error("context was torn down before the callback could run")]
    Abandoned,
}

/// Outcome of a failed [`Runner::block_on`](crate::runtime::Runner::block_on).
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The computation itself panicked. The payload is kept so the panic can
    /// be resumed by the caller with [`RunError::resume`].
    #[error("computation panicked: {message}")]
    Panicked {
        message: String,
        payload: PanicPayload,
    },

    /// The queue reached its end but the computation never produced an outcome.
    #[error("work queue ended before the computation settled")]
    Unsettled,
}

impl RunError {
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        RunError::Panicked {
            message: panic_message(payload.as_ref()),
            payload: PanicPayload(Mutex::new(payload)),
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, RunError::Panicked { .. })
    }

    /// Re-raise the failure on the current thread. A captured computation
    /// panic is resumed with its original payload.
    #[track_caller]
    pub fn resume(self) -> ! {
        match self {
            RunError::Panicked { payload, .. } => std::panic::resume_unwind(payload.into_inner()),
            other => panic!("failed to drive future to completion: {other}"),
        }
    }
}

/// Payload of a captured panic.
///
/// Panic payloads are only `Send`. The lock makes the error `Sync`, so it
/// converts into `anyhow::Error` and crosses threads like any other error.
pub struct PanicPayload(Mutex<Box<dyn Any + Send>>);

impl PanicPayload {
    pub fn into_inner(self) -> Box<dyn Any + Send> {
        self.0.into_inner()
    }

    /// Runs `f` against the payload, e.g. to downcast it.
    pub fn with<R>(&self, f: impl FnOnce(&(dyn Any + Send)) -> R) -> R {
        f(self.0.lock().as_ref())
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicPayload").finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rstest::rstest;
    use static_assertions::assert_impl_all;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread;

    assert_impl_all!(ContextError: Send, Sync, Clone);
    assert_impl_all!(RunError: Send, Sync);

    #[rstest]
    #[case::static_str(Box::new("boom"), "boom")]
    #[case::string(Box::new(String::from("kaboom")), "kaboom")]
    #[case::other(Box::new(42_u32), "<non-string panic payload>")]
    fn test_panic_message(#[case] payload: Box<dyn Any + Send>, #[case] expected: &str) {
        assert_eq!(panic_message(payload.as_ref()), expected);
    }

    #[test]
    fn test_resume_keeps_original_payload() {
        let err = RunError::panicked(Box::new(7_i64));
        assert!(err.is_panic());

        let payload = catch_unwind(AssertUnwindSafe(move || err.resume())).unwrap_err();
        assert_eq!(payload.downcast_ref::<i64>(), Some(&7));
    }

    #[test]
    fn test_payload_is_readable_before_resume() {
        let err = RunError::panicked(Box::new("boom"));

        match &err {
            RunError::Panicked { message, payload } => {
                assert_eq!(message, "boom");
                assert_eq!(payload.with(|p| p.downcast_ref::<&str>().copied()), Some("boom"));
            }
            other => panic!("expected a panic, got {other:?}"),
        }
    }

    fn fails_with(err: RunError) -> Result<()> {
        Err::<(), _>(err)?;
        Ok(())
    }

    #[test]
    fn test_run_error_converts_into_anyhow() {
        let payload = Box::new(String::from("kaboom"));
        let err = fails_with(RunError::panicked(payload)).unwrap_err();
        assert_eq!(err.to_string(), "computation panicked: kaboom");

        // And moves across threads once boxed.
        let msg = thread::spawn(move || err.to_string())
            .join()
            .expect("thread panicked");
        assert_eq!(msg, "computation panicked: kaboom");
    }

    #[test]
    fn test_context_error_converts_into_run_error() {
        let err: RunError = ContextError::NotSupported.into();
        assert!(matches!(err, RunError::Context(ContextError::NotSupported)));
        assert_eq!(
            err.to_string(),
            "synchronous dispatch is not supported by this context"
        );
    }
}
