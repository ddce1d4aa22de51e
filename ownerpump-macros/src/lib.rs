#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Entry point macros for ownerpump. Both rewrite an `async fn` into a plain
//! `fn` that drives the body to completion on the calling thread with a fresh
//! `ownerpump::runtime::Runner`.
//!
//! Arguments, all optional:
//!
//! * `flavor = "blocking"` (default) or `"post_only"`: whether synchronous
//!   dispatch is accepted by the context.
//! * `on_callback_panic = "propagate"` (default) or `"collect"`: what the pump
//!   does when a queued callback panics.
//!
//! A failed run is raised as a panic, and a panic of the body is resumed with
//! its own payload.

mod entry;
mod parse;

use entry::Entry;

/// Runs `async fn main` on the main thread, which owns the context for the
/// whole run.
///
/// ```ignore
/// #[ownerpump::main(flavor = "post_only")]
/// async fn main() {
///     ownerpump::yield_now().await;
/// }
/// ```
///
/// expands to roughly
///
/// ```ignore
/// fn main() {
///     ownerpump::runtime::Builder::new_post_only()
///         .try_build()
///         .expect("failed to build the ownerpump runner")
///         .block_on(async move { ownerpump::yield_now().await })
///         .unwrap_or_else(|e| e.resume())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::expand(Entry::Main, args.into(), item.into()).into()
}

/// Runs an async test on the test thread, with one context per test. Takes
/// the same arguments as [`macro@main`]. The body must be `Send`.
///
/// ```ignore
/// #[ownerpump::test(on_callback_panic = "collect")]
/// async fn drains() -> anyhow::Result<()> {
///     ownerpump::yield_now().await;
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::expand(Entry::Test, args.into(), item.into()).into()
}
