//! Getting Started Example - Your First Child
//!
//! Demonstrates the complete workflow: build a `Parent`, start one child,
//! observe its exit, and shut the registry down cleanly.
//!
//! Run with: cargo run --example getting_started

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use parentcore::child::{ChildId, ChildRef, ChildSpec, ExitReason, ShutdownPolicy, StartOutcome, StartSpec};
use parentcore::parent::{InitOptions, ParentConfig};
use parentcore::Parent;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let mut parent = Parent::new(ParentConfig::builder().build().expect("valid config"));
    parent
        .initialize(InitOptions::default())
        .expect("first initialize never fails");

    let counter = Arc::new(AtomicI32::new(0));
    let spec = counter_spec(counter.clone());

    match parent.start_child(spec).await.expect("spawn") {
        parentcore::parent::StartChildOutcome::Started(handle) => {
            println!("counter started as {handle}");
        }
        other => panic!("unexpected start outcome: {other:?}"),
    }

    counter.store(41, Ordering::SeqCst);
    println!("counter value before shutdown: {}", counter.load(Ordering::SeqCst));

    let reason = parent
        .shutdown_child(ChildRef::Id(ChildId::new("counter")))
        .await
        .expect("shutdown");
    println!("counter stopped: {reason:?}");
}

fn counter_spec(counter: Arc<AtomicI32>) -> ChildSpec {
    ChildSpec::builder(StartSpec::callable(move |token| {
        let counter = counter.clone();
        Box::pin(async move {
            let task = tokio::spawn(async move {
                token.cancelled().await;
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                ExitReason::Shutdown
            });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id("counter")
    .shutdown(ShutdownPolicy::Graceful(Duration::from_secs(2)))
    .build()
}
