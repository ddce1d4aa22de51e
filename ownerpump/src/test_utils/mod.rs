use crate::context::{ContextHandle, SingleThreadContext};
use crate::runtime::RuntimeConfig;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Honors `RUST_LOG`, safe to
/// call from every test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context owned by the calling thread, with the default configuration.
#[must_use]
pub(crate) fn new_handle() -> ContextHandle {
    new_handle_with(&RuntimeConfig::default())
}

#[must_use]
pub(crate) fn new_handle_with(cfg: &RuntimeConfig) -> ContextHandle {
    ContextHandle::new(SingleThreadContext::new(cfg))
}
