//! Counts, per thread, where 10 000 consecutive resumptions of one computation
//! ran. Under ownerpump every resumption lands on the thread that called `main`,
//! so the table has a single row. An offloaded blocking call in the middle does
//! not change that.
//!
//! `RUST_LOG=ownerpump=trace cargo run --example thread_affinity` shows the
//! queue traffic.
use anyhow::Result;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ITERATIONS: usize = 10_000;

#[ownerpump::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting runner");

    let mut per_thread: BTreeMap<String, usize> = BTreeMap::new();

    for i in 0..ITERATIONS {
        *per_thread.entry(thread_label()).or_default() += 1;

        if i == ITERATIONS / 2 {
            let slept_on = ownerpump::offload(|| {
                thread::sleep(Duration::from_millis(10));
                thread_label()
            })?
            .await;
            info!(%slept_on, "offloaded call returned");
        }

        ownerpump::yield_now().await;
    }

    for (thread, count) in &per_thread {
        println!("[{thread}, {count}]");
    }

    Ok(())
}

fn thread_label() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => format!("{name} {:?}", current.id()),
        None => format!("{:?}", current.id()),
    }
}
