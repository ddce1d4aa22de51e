use crate as ownerpump;
use crate::context::{self, ContextHandle};
use crate::errors::{ContextError, RunError};
use crate::runtime::{Builder, OnCallbackPanic, Runner};
use crate::task::{offload, yield_now};
use crate::test_utils::init_tracing;
use anyhow::Result;
use parking_lot::Mutex;
use rstest::rstest;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, ThreadId};

fn ambient() -> ContextHandle {
    context::current().expect("runner installs an ambient context")
}

fn fail() {
    panic!("computation failed");
}

#[rstest]
#[case::single(1)]
#[case::few(16)]
#[case::many(4096)]
fn test_background_posts_round_trip_to_owner(#[case] k: usize) -> Result<()> {
    init_tracing();
    assert!(context::current().is_none());

    let owner = thread::current().id();
    let seen: Arc<Mutex<Vec<(usize, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = Arc::clone(&seen);
    Runner::default().block_on(async move {
        let ctx = ambient();

        offload(move || {
            for i in 0..k {
                let seen = Arc::clone(&seen_clone);
                ctx.post_fn(move || seen.lock().push((i, thread::current().id())))
                    .expect("queue is open while the computation runs");
            }
        })
        .expect("spawn offload thread")
        .await;
    })?;

    let seen = seen.lock();
    assert_eq!(seen.len(), k);
    assert!(seen.iter().enumerate().all(|(i, (n, _))| i == *n));
    assert!(seen.iter().all(|(_, id)| *id == owner));

    assert!(context::current().is_none());
    Ok(())
}

#[test]
fn test_nested_runners_restore_outer_context() -> Result<()> {
    let outer_res = Runner::default().block_on(async {
        let outer = ambient();

        let inner = Runner::default()
            .block_on(async { ambient() })
            .expect("inner run succeeds");

        (outer.clone(), inner, ambient() == outer)
    })?;

    let (outer, inner, restored) = outer_res;
    assert_ne!(outer, inner);
    assert!(restored);
    assert!(context::current().is_none());
    Ok(())
}

#[test]
fn test_post_only_runner_rejects_send() -> Result<()> {
    let runner = Builder::new_post_only().try_build()?;

    let (send, post) = runner.block_on(async {
        let ctx = ambient();
        (ctx.send_fn(|| {}), ctx.post_fn(|| {}))
    })?;

    assert_eq!(send, Err(ContextError::NotSupported));
    assert_eq!(post, Ok(()));
    Ok(())
}

#[test]
fn test_send_from_offload_thread_runs_on_owner() -> Result<()> {
    let owner = thread::current().id();

    let ran_on = Runner::default().block_on(async {
        let ctx = ambient();
        let ran_on = Arc::new(Mutex::new(None));

        let ran_on_clone = Arc::clone(&ran_on);
        let res = offload(move || {
            ctx.send_fn(move || *ran_on_clone.lock() = Some(thread::current().id()))
        })
        .expect("spawn offload thread")
        .await;

        assert_eq!(res, Ok(()));
        let ran_on = *ran_on.lock();
        ran_on
    })?;

    assert_eq!(ran_on, Some(owner));
    Ok(())
}

#[test]
fn test_computation_panic_is_reported_after_restore() {
    let res = Runner::default().block_on(async {
        yield_now().await;
        fail()
    });

    match res {
        Err(RunError::Panicked { message, .. }) => assert_eq!(message, "computation failed"),
        other => panic!("expected a panic, got {:?}", other.map(|_| ())),
    }
    assert!(context::current().is_none());
}

#[test]
#[should_panic(expected = "computation failed")]
fn test_block_on_resumes_computation_panic() {
    ownerpump::block_on(async { fail() });
}

#[test]
fn test_propagated_callback_panic_restores_ambient() {
    let runner = Runner::default();

    let res = catch_unwind(AssertUnwindSafe(|| {
        runner.block_on(async {
            ambient()
                .post_fn(|| panic!("callback failed"))
                .expect("queue is open");
            yield_now().await;
        })
    }));

    assert!(res.is_err());
    assert!(context::current().is_none());
}

#[test]
fn test_collected_callback_panic_wins_over_outcome() -> Result<()> {
    let runner = Builder::new_blocking()
        .on_callback_panic(OnCallbackPanic::Collect)
        .try_build()?;

    let res = runner.block_on(async {
        ambient()
            .post_fn(|| panic!("callback failed"))
            .expect("queue is open");
        yield_now().await;
        42
    });

    match res {
        Err(RunError::Context(ContextError::CallbackPanicked { count, message })) => {
            assert_eq!(count, 1);
            assert_eq!(message, "callback failed");
        }
        other => panic!("expected collected callback panic, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_completing_early_leaves_computation_unsettled() {
    let res = Runner::default().block_on(async {
        ambient().complete();
        yield_now().await;
    });

    assert!(matches!(res, Err(RunError::Unsettled)));
    assert!(context::current().is_none());
}

#[test]
fn test_many_yields_stay_on_one_thread() -> Result<()> {
    let threads = Runner::default().block_on(async {
        let mut threads = HashSet::new();
        for _ in 0..10_000 {
            yield_now().await;
            threads.insert(thread::current().id());
        }
        threads
    })?;

    assert_eq!(threads.len(), 1);
    assert!(threads.contains(&thread::current().id()));
    Ok(())
}

#[ownerpump::test(flavor = "post_only")]
async fn test_macro_installs_post_only_context() {
    assert_eq!(ambient().send_fn(|| {}), Err(ContextError::NotSupported));
}

#[ownerpump::test(on_callback_panic = "collect")]
async fn test_macro_returns_result() -> Result<()> {
    let ctx = ambient();
    ctx.post_fn(|| {})?;
    yield_now().await;
    assert_eq!(ctx.pending(), 0);
    Ok(())
}
