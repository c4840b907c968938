//! Automatic Liveness Detection via Per-Child Timeouts
//!
//! This crate has no background health-polling loop (that belongs to a
//! hierarchical supervisor tree, out of scope here). Instead, a `ChildSpec`
//! may declare a `timeout`: if the child has not exited by then, the
//! `TimeoutTimer` posts `Signal::ChildTimeout` into the parent's own inbox,
//! which `handle_message` treats exactly like any other failure — stopping
//! the child and running it through the ordinary restart plan.
//!
//! Run with: cargo run --example supervisor_automatic_health

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use parentcore::child::{ChildSpec, ExitReason, RestartPolicy, ShutdownPolicy, StartOutcome, StartSpec};
use parentcore::parent::{HandleOutcome, InitOptions, ParentConfig, StartChildOutcome};
use parentcore::Parent;

#[tokio::main]
async fn main() {
    let mut parent = Parent::new(ParentConfig::builder().build().expect("valid config"));
    parent.initialize(InitOptions::default()).expect("first initialize never fails");

    // a child that never exits on its own, paired with a short timeout
    let spec = ChildSpec::builder(StartSpec::callable(|token| {
        Box::pin(async move {
            let task = tokio::spawn(async move {
                token.cancelled().await;
                ExitReason::Shutdown
            });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id("stuck-worker")
    .restart(RestartPolicy::Permanent)
    .shutdown(ShutdownPolicy::Graceful(Duration::from_millis(200)))
    .timeout(Duration::from_millis(100))
    .build();

    let handle = match parent.start_child(spec).await.expect("spawn") {
        StartChildOutcome::Started(handle) => handle,
        other => panic!("unexpected start outcome: {other:?}"),
    };
    println!("stuck-worker started as {handle}, armed with a 100ms timeout");

    // the timer fires on its own; waiting here just gives it time to land
    // in the parent's inbox before we drain it.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let signal = parent.recv_signal().await.expect("timeout signal posted");
    let outcome = parent.handle_message(signal).await.expect("handle_message");
    match outcome {
        HandleOutcome::Exited { reason, .. } => {
            println!("stuck-worker was killed for missing its deadline: {reason:?}");
        }
        other => println!("unexpected: {other:?}"),
    }

    println!(
        "restarted under a fresh handle: {}",
        parent.num_children().expect("initialized") == 1
    );
}
