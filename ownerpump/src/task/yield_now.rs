use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`yield_now`].
#[derive(Debug, Clone, Copy)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

/// Suspend the current computation once and resume it from the back of the
/// owner queue, after everything that was already queued.
///
/// Under a [`Runner`](crate::runtime::Runner) the continuation always runs on
/// the owner thread.
pub fn yield_now() -> YieldNow {
    YieldNow {
        awaiting_first_poll: true,
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Only yield on first poll. Next time the computation is polled we return.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as ownerpump;
    use crate::context;
    use rstest::rstest;
    use std::thread;

    #[ownerpump::test]
    async fn test_yield_requeues_behind_pending_work() {
        let ctx = context::current().expect("runner installs a context");

        let before = ctx.pending();
        let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));

        let order_clone = std::sync::Arc::clone(&order);
        ctx.post_fn(move || order_clone.lock().push("posted"))
            .expect("queue is open");

        yield_now().await;
        order.lock().push("resumed");

        assert_eq!(before, 0);
        assert_eq!(*order.lock(), vec!["posted", "resumed"]);
    }

    #[rstest]
    #[case::once(1)]
    #[case::many(1_000)]
    fn test_yield_resumes_on_owner_thread(#[case] n: usize) {
        let owner = thread::current().id();

        let off_owner = ownerpump::block_on(async move {
            let mut off_owner = 0;
            for _ in 0..n {
                yield_now().await;
                if thread::current().id() != owner {
                    off_owner += 1;
                }
            }
            off_owner
        });

        assert_eq!(off_owner, 0);
    }
}
