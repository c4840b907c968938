//! Basic Parent Usage - Restart Policies
//!
//! Demonstrates the three restart policies a `ChildSpec` can declare, and
//! how a `Parent` drives them from its own inbox.
//!
//! # What You'll Learn
//!
//! - **Permanent**: always restarted, regardless of exit reason
//! - **Transient**: restarted only on an abnormal exit
//! - **Temporary**: never restarted
//! - Feeding a child's own `ExitReason` into `Parent::handle_message`
//! - Observing the resulting `SupervisionEvent`s through `InMemoryMonitor`
//!
//! Run with: cargo run --example supervisor_basic

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use parentcore::child::{ChildSpec, ExitReason, RestartPolicy, StartOutcome, StartSpec};
use parentcore::dispatcher::Signal;
use parentcore::monitoring::{InMemoryMonitor, Monitor, MonitoringConfig, SupervisionEvent};
use parentcore::parent::{HandleOutcome, InitOptions, ParentConfig, StartChildOutcome};
use parentcore::Parent;

fn worker_spec(id: &str, restart: RestartPolicy, reason: ExitReason) -> ChildSpec {
    ChildSpec::builder(StartSpec::callable(move |_token| {
        let reason = reason.clone();
        Box::pin(async move {
            let task = tokio::spawn(async move { reason });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id(id)
    .restart(restart)
    .build()
}

#[tokio::main]
async fn main() {
    let monitor = InMemoryMonitor::<SupervisionEvent>::new(MonitoringConfig::default());
    let mut parent = Parent::with_monitor(
        ParentConfig::builder().build().expect("valid config"),
        monitor.clone(),
    );
    parent.initialize(InitOptions::default()).expect("first initialize never fails");

    let permanent = start(&mut parent, worker_spec("permanent", RestartPolicy::Permanent, ExitReason::Error("boom".into()))).await;
    let transient = start(&mut parent, worker_spec("transient", RestartPolicy::Transient, ExitReason::Normal)).await;
    let temporary = start(&mut parent, worker_spec("temporary", RestartPolicy::Temporary, ExitReason::Error("boom".into()))).await;

    for (label, handle, reason) in [
        ("permanent worker crashed", permanent, ExitReason::Error("boom".into())),
        ("transient worker exited normally", transient, ExitReason::Normal),
        ("temporary worker crashed", temporary, ExitReason::Error("boom".into())),
    ] {
        println!("--- {label} ---");
        let outcome = parent
            .handle_message(Signal::ChildExited { handle, reason })
            .await
            .expect("handle_message");
        report(outcome);
    }

    println!("remaining children: {}", parent.num_children().expect("initialized"));
    let snapshot = monitor.snapshot().await.expect("snapshot");
    println!("supervision events recorded: {}", snapshot.total_events);
}

async fn start(parent: &mut Parent<InMemoryMonitor<SupervisionEvent>>, spec: ChildSpec) -> parentcore::ChildHandle {
    match parent.start_child(spec).await.expect("spawn") {
        StartChildOutcome::Started(handle) => handle,
        other => panic!("unexpected start outcome: {other:?}"),
    }
}

fn report(outcome: HandleOutcome) {
    match outcome {
        HandleOutcome::Exited { id, reason, .. } => {
            println!("exited: id={id:?} reason={reason:?}");
        }
        other => println!("unexpected: {other:?}"),
    }
}
