//! Advanced Parent Patterns - Bindings, Shutdown Groups, Restart Budgets
//!
//! This example demonstrates:
//! - `binds_to`: a dependent child is stopped and restarted whenever the
//!   child it depends on is
//! - `shutdown_group`: children sharing a group stop and restart atomically
//! - Per-child and parent-wide restart budgets, and what happens when one
//!   is exhausted
//!
//! Run with: cargo run --example supervisor_advanced

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use parentcore::child::{ChildId, ChildRef, ChildSpec, ExitReason, RestartPolicy, StartOutcome, StartSpec};
use parentcore::dispatcher::Signal;
use parentcore::parent::{HandleOutcome, InitOptions, ParentConfig, StartChildOutcome};
use parentcore::restart_counter::RestartBudget;
use parentcore::Parent;

fn leaf_spec(id: &str, restart: RestartPolicy) -> ChildSpec {
    ChildSpec::builder(StartSpec::callable(|_token| {
        Box::pin(async {
            let task = tokio::spawn(async { ExitReason::Error("leaf crashed".to_string()) });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id(id)
    .restart(restart)
    .build()
}

fn dependent_spec(id: &str, depends_on: &str) -> ChildSpec {
    ChildSpec::builder(StartSpec::callable(|_token| {
        Box::pin(async {
            let task = tokio::spawn(async { ExitReason::Shutdown });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id(id)
    .restart(RestartPolicy::Permanent)
    .binds_to([ChildRef::Id(ChildId::new(depends_on))])
    .build()
}

fn grouped_spec(id: &str, group: &str) -> ChildSpec {
    ChildSpec::builder(StartSpec::callable(|_token| {
        Box::pin(async {
            let task = tokio::spawn(async { ExitReason::Shutdown });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id(id)
    .restart(RestartPolicy::Permanent)
    .shutdown_group(group)
    .build()
}

#[tokio::main]
async fn main() {
    bindings_cascade().await;
    shutdown_group_membership().await;
    restart_budget_exhaustion().await;
}

/// A failure in `database` restarts `database` and everything bound to it,
/// even though only `database` itself actually crashed.
async fn bindings_cascade() {
    println!("=== bindings cascade ===");
    let mut parent = Parent::new(ParentConfig::builder().build().expect("valid config"));
    parent.initialize(InitOptions::default()).expect("first initialize never fails");

    let database = start(&mut parent, leaf_spec("database", RestartPolicy::Permanent)).await;
    start(&mut parent, dependent_spec("cache", "database")).await;

    let outcome = parent
        .handle_message(Signal::ChildExited {
            handle: database,
            reason: ExitReason::Error("connection lost".to_string()),
        })
        .await
        .expect("handle_message");

    match outcome {
        HandleOutcome::Exited { id, .. } => println!("reported exit for {id:?}"),
        other => println!("unexpected: {other:?}"),
    }
    println!(
        "database and cache both live again: {}",
        parent.num_children().expect("initialized") == 2
    );
}

/// Two children sharing a shutdown group stop and come back together.
async fn shutdown_group_membership() {
    println!("=== shutdown group ===");
    let mut parent = Parent::new(ParentConfig::builder().build().expect("valid config"));
    parent.initialize(InitOptions::default()).expect("first initialize never fails");

    start(&mut parent, grouped_spec("writer", "disk-io")).await;
    start(&mut parent, grouped_spec("flusher", "disk-io")).await;

    let stopped = parent
        .shutdown_child(ChildRef::Id(ChildId::new("writer")))
        .await
        .expect("shutdown_child stops the whole group");
    println!("writer's own exit reason: {stopped:?}");
    println!("remaining after group shutdown: {}", parent.num_children().expect("initialized"));
}

/// A permanent child that keeps crashing faster than its own budget allows
/// exhausts that budget and is given up on rather than restarted forever.
async fn restart_budget_exhaustion() {
    println!("=== restart budget exhaustion ===");
    let mut parent = Parent::new(ParentConfig::builder().build().expect("valid config"));
    parent
        .initialize(InitOptions {
            max_restarts: parentcore::restart_counter::RestartLimit::Bounded(100),
            max_seconds: parentcore::restart_counter::WindowLimit::Bounded(Duration::from_secs(60)),
            ..InitOptions::default()
        })
        .expect("first initialize never fails");

    let spec = ChildSpec::builder(StartSpec::callable(|_token| {
        Box::pin(async {
            let task = tokio::spawn(async { ExitReason::Error("flaky".to_string()) });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id("flaky")
    .restart(RestartPolicy::Permanent)
    .restart_budget(RestartBudget::new(1, Duration::from_secs(60)))
    .build();

    let handle = start(&mut parent, spec).await;
    parent
        .handle_message(Signal::ChildExited {
            handle,
            reason: ExitReason::Error("flaky".to_string()),
        })
        .await
        .expect("first crash still has budget");

    let new_handle = parent
        .child_handle(&ChildId::new("flaky"))
        .expect("initialized")
        .expect("restarted once");
    parent
        .handle_message(Signal::ChildExited {
            handle: new_handle,
            reason: ExitReason::Error("flaky again".to_string()),
        })
        .await
        .expect("the parent budget still tolerates this, even though flaky's own budget does not");

    // flaky's own budget was spent on the first restart; the second crash is
    // recorded but not retried, so the id no longer resolves to anything live.
    println!(
        "given up after its own budget ran out: {}",
        parent.child_handle(&ChildId::new("flaky")).expect("initialized").is_none()
    );
}

async fn start(parent: &mut Parent, spec: ChildSpec) -> parentcore::ChildHandle {
    match parent.start_child(spec).await.expect("spawn") {
        StartChildOutcome::Started(handle) => handle,
        other => panic!("unexpected start outcome: {other:?}"),
    }
}
