//! Orchestration Benchmarks
//!
//! Measures the overhead the engine adds around handlers:
//! - Concurrent dispatch fan-out
//! - Conversation branch forking
//! - Deterministic result joining

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use huddle_core::orchestration::{
    BranchFailure, ConcurrentDispatcher, ConversationBranch, DispatchConfig, Handler,
    HandlerAnswer, HandlerName, HandlerRegistry, Query, ResultAggregator, SubQuery, Turn,
};

struct EchoHandler {
    name: HandlerName,
}

#[async_trait]
impl Handler for EchoHandler {
    fn name(&self) -> &HandlerName {
        &self.name
    }

    fn description(&self) -> &str {
        "echoes the sub-query"
    }

    async fn run(
        &self,
        subquery: &SubQuery,
        _branch: ConversationBranch,
    ) -> Result<HandlerAnswer, BranchFailure> {
        Ok(HandlerAnswer::satisfied(self.name.clone(), subquery.text(), 1))
    }
}

fn registry() -> Arc<HandlerRegistry> {
    let mut builder = HandlerRegistry::builder();
    for name in ["game_supervisor", "player_supervisor", "teams_supervisor"] {
        builder = builder
            .register(Arc::new(EchoHandler { name: HandlerName::new(name) }))
            .unwrap();
    }
    Arc::new(builder.build().unwrap())
}

fn subqueries(registry: &HandlerRegistry, count: usize) -> Vec<SubQuery> {
    let handlers = ["game_supervisor", "player_supervisor", "teams_supervisor"];
    (0..count)
        .map(|i| {
            registry
                .sub_query(format!("Sub-question {}", i), handlers[i % handlers.len()])
                .unwrap()
        })
        .collect()
}

/// Benchmark dispatch fan-out
fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = registry();
    let dispatcher = ConcurrentDispatcher::new(
        registry.clone(),
        DispatchConfig {
            max_concurrency: 8,
            deadline: Some(Duration::from_secs(30)),
        },
    );
    let query = Query::new("Lakers score, LeBron's career ppg and the Celtics roster");

    let mut group = c.benchmark_group("dispatch");

    for count in [1usize, 3, 7] {
        let sqs = subqueries(&registry, count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("subqueries", count), &sqs, |b, sqs| {
            b.iter(|| {
                let results = rt.block_on(dispatcher.dispatch(&query, sqs.clone(), CancellationToken::new()));
                black_box(results)
            })
        });
    }

    group.finish();
}

/// Benchmark branch forking with growing transcripts
fn bench_branch_fork(c: &mut Criterion) {
    let mut group = c.benchmark_group("branch_fork");

    for turns in [4usize, 32, 128] {
        let mut branch = ConversationBranch::from_turns(vec![Turn::user("Who won last night?")]);
        for i in 0..turns {
            branch.push(Turn::observation(format!("tool output {}", i)));
        }

        group.bench_with_input(BenchmarkId::new("turns", turns), &branch, |b, branch| {
            b.iter(|| black_box(branch.fork()))
        });
    }

    group.finish();
}

/// Benchmark the synthesis-free aggregation path
fn bench_join(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = registry();
    let dispatcher = ConcurrentDispatcher::new(registry.clone(), DispatchConfig::default());
    let query = Query::new("q");
    let results = rt.block_on(dispatcher.dispatch(&query, subqueries(&registry, 7), CancellationToken::new()));
    let aggregator = ResultAggregator::new(None, Duration::from_secs(5));

    c.bench_function("deterministic_join", |b| {
        b.iter(|| black_box(rt.block_on(aggregator.aggregate(&query, &results))))
    });
}

criterion_group!(benches, bench_dispatch, bench_branch_fork, bench_join);
criterion_main!(benches);
