use crate::runtime::Runner;
use anyhow::{Result, anyhow};
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a context answers synchronous dispatch.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// On the owner thread the callback runs in place. Any other thread hands
    /// the callback to the owner and blocks until the owner has executed it.
    #[default]
    Blocking,

    /// Synchronous dispatch is rejected with `NotSupported`. Everything must be
    /// posted.
    Forbidden,
}

/// What the pump does when a drained callback panics.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCallbackPanic {
    /// The panic unwinds out of the pump. Items still queued are not drained
    /// and are dropped when the run tears its context down. Any callback
    /// failure is fatal to the run.
    #[default]
    Propagate,

    /// Every callback runs under `catch_unwind`. The drain carries on and the
    /// pump reports the failures once the queue has ended.
    Collect,
}

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let offload_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = offload_count.fetch_add(1, Ordering::Relaxed);
        format!("ownerpump-offload-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

#[derive(Debug)]
pub struct Builder {
    /// Context flavor
    send_policy: SendPolicy,

    /// Pump behaviour on callback panics.
    on_callback_panic: OnCallbackPanic,

    /// Name fn used for threads spawned by [`offload`](crate::task::offload).
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by `offload`.
    thread_stack_size: Option<usize>,
}

impl Builder {
    fn new(send_policy: SendPolicy) -> Self {
        Self {
            send_policy,
            on_callback_panic: OnCallbackPanic::default(),
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
        }
    }

    /// Returns a builder for a context that accepts synchronous dispatch.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new_blocking() -> Builder {
        Builder::new(SendPolicy::Blocking)
    }

    /// Returns a builder for a context where every dispatch must be posted.
    pub fn new_post_only() -> Builder {
        Builder::new(SendPolicy::Forbidden)
    }

    pub fn on_callback_panic(mut self, policy: OnCallbackPanic) -> Self {
        self.on_callback_panic = policy;
        self
    }

    /// Sets name of threads spawned by `offload`.
    ///
    /// The default name is "ownerpump-offload-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by `offload`.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for offload threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Creates the configured `Runner`.
    ///
    /// Each call to [`Runner::block_on`] builds a fresh context and queue from
    /// this configuration.
    pub fn try_build(self) -> Result<Runner> {
        let cfg = RuntimeConfig::try_from(self)?;
        Ok(Runner::new(cfg))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new_blocking()
    }
}

// Builder exported as a RuntimeConfig object consumed by the runner and by
// each context it creates.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) send_policy: SendPolicy,
    pub(crate) on_callback_panic: OnCallbackPanic,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            send_policy: SendPolicy::default(),
            on_callback_panic: OnCallbackPanic::default(),
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
        }
    }
}

/// Smallest stack we are willing to hand to an offload thread.
const MIN_THREAD_STACK_SIZE: usize = 16 * 1024;

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        match self.thread_stack_size {
            Some(size) if size < MIN_THREAD_STACK_SIZE => Err(anyhow!(
                "thread_stack_size ({}) is below the minimum of {} bytes",
                size,
                MIN_THREAD_STACK_SIZE
            )),
            _ => Ok(()),
        }
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            send_policy: builder.send_policy,
            on_callback_panic: builder.on_callback_panic,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
