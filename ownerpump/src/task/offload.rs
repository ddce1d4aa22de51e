use crate::context;
use futures::channel::oneshot;
use pin_project::pin_project;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::thread;

const FALLBACK_THREAD_NAME: &str = "ownerpump-offload";

/// Future returned by [`offload`]. Resolves to the closure's return value.
#[pin_project]
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Offload<T> {
    #[pin]
    rx: oneshot::Receiver<thread::Result<T>>,
}

/// Run `f` on a dedicated worker thread and resume the awaiting computation
/// once it returns.
///
/// The worker only ever touches `f`. Completion wakes the computation from the
/// worker thread, and under a [`Runner`](crate::runtime::Runner) that wake-up
/// is posted to the owner queue, so the code after `.await` runs on the owner
/// thread again.
///
/// A panic in `f` is resumed inside the awaiting computation.
///
/// Worker threads are named and sized from the configuration of the ambient
/// context, when there is one.
pub fn offload<F, T>(f: F) -> io::Result<Offload<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let mut builder = thread::Builder::new();

    builder = match context::current() {
        Some(ctx) => {
            let cfg = ctx.config();
            let builder = builder.name((cfg.thread_name.0)());
            match cfg.thread_stack_size {
                Some(stack_size) => builder.stack_size(stack_size),
                None => builder,
            }
        }
        None => builder.name(FALLBACK_THREAD_NAME.to_string()),
    };

    let (tx, rx) = oneshot::channel();

    builder.spawn(move || {
        let res = panic::catch_unwind(AssertUnwindSafe(f));
        // The receiver may be gone if the computation was dropped.
        let _ = tx.send(res);
    })?;

    Ok(Offload { rx })
}

impl<T> Future for Offload<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match ready!(this.rx.poll(cx)) {
            Ok(Ok(value)) => Poll::Ready(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(oneshot::Canceled) => {
                panic!("offload thread exited without producing a value")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as ownerpump;
    use crate::errors::RunError;
    use crate::runtime::Builder;
    use anyhow::Result;

    #[ownerpump::test]
    async fn test_offload_runs_off_owner_and_resumes_on_owner() -> io::Result<()> {
        let owner = thread::current().id();

        let worker = offload(|| thread::current().id())?.await;

        assert_ne!(worker, owner);
        assert_eq!(thread::current().id(), owner);
        Ok(())
    }

    #[test]
    fn test_offload_threads_are_named_from_config() -> Result<()> {
        let runner = Builder::new_blocking().thread_name("pump-worker").try_build()?;

        let name = runner.block_on(async {
            offload(|| thread::current().name().map(str::to_string))
                .expect("spawn offload thread")
                .await
        })?;

        assert_eq!(name.as_deref(), Some("pump-worker"));
        Ok(())
    }

    #[test]
    fn test_offload_panic_fails_the_computation() -> Result<()> {
        let runner = Builder::new_blocking().try_build()?;

        let res = runner.block_on(async {
            offload(|| -> u32 { panic!("worker failed") })
                .expect("spawn offload thread")
                .await
        });

        match res {
            Err(RunError::Panicked { message, .. }) => assert_eq!(message, "worker failed"),
            other => panic!("expected a worker panic, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_offload_without_ambient_context() -> Result<()> {
        let value = futures::executor::block_on(offload(|| 7)?);
        assert_eq!(value, 7);
        Ok(())
    }
}
