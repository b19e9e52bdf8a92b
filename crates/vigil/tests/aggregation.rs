//! Aggregation engine behavior over realistic run streams.

use serde_json::{Value, json};
use uuid::Uuid;
use vigil::aggregate::{BucketAggregate, BucketKey, bucket_start, merge_run};
use vigil::strategy::reach::ReachStrategy;
use vigil::{AggregateError, AggregateStore, Run, StatRollup, StrategyRegistry};

fn registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(ReachStrategy, "vigil").unwrap();
    registry
}

fn run_with(metadata: Value, error: Option<&str>, latency_ms: Option<u64>, timestamp: i64) -> Run {
    let run = Run::new(Uuid::new_v4(), "sys-1").at(timestamp);
    match (error, latency_ms) {
        (Some(err), Some(latency)) => run.unhealthy(latency, metadata, err).at(timestamp),
        (Some(err), None) => run.unhealthy(0, metadata, err).at(timestamp),
        (None, Some(latency)) => run.healthy(latency, metadata).at(timestamp),
        (None, None) => run.healthy(0, metadata).at(timestamp),
    }
}

#[test]
fn incremental_fold_matches_from_scratch_aggregation() {
    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let key = BucketKey::new("vigil.reach", "instance-1");

    let runs: Vec<Run> = (0..7)
        .map(|i| {
            run_with(
                json!({"packet_loss": (i * 10) as f64, "avg_latency": 5.0 + i as f64}),
                (i == 3).then_some("all attempts failed"),
                Some(10 + i),
                1000 + i as i64,
            )
        })
        .collect();

    // one at a time
    let mut incremental: Option<BucketAggregate> = None;
    for run in &runs {
        incremental = Some(merge_run(strategy.as_ref(), incremental, run, &key, 300).unwrap());
    }
    let incremental = incremental.unwrap();

    // re-aggregation from scratch, reversed arrival order
    let mut batched: Option<BucketAggregate> = None;
    for run in runs.iter().rev() {
        batched = Some(merge_run(strategy.as_ref(), batched, run, &key, 300).unwrap());
    }
    let batched = batched.unwrap();

    assert_eq!(incremental.run_count, 7);
    assert_eq!(incremental.run_count, batched.run_count);
    assert_eq!(incremental.metadata, batched.metadata);

    let rollup = StatRollup::from_value(&incremental.metadata).unwrap();
    assert_eq!(rollup.availability.total, 7);
    assert_eq!(rollup.availability.successes, 6);
    assert_eq!(rollup.error_count, 1);
}

#[test]
fn packet_loss_scenario_aggregates_over_defined_values_only() {
    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let key = BucketKey::new("vigil.reach", "instance-1");

    // third run errored before measuring latency
    let runs = vec![
        run_with(json!({"packet_loss": 0.0, "avg_latency": 10.0}), None, Some(10), 100),
        run_with(json!({"packet_loss": 50.0, "avg_latency": 20.0}), None, Some(20), 110),
        run_with(json!({"packet_loss": 100.0}), Some("all 4 attempts failed"), Some(1000), 120),
    ];

    let mut aggregate: Option<BucketAggregate> = None;
    for run in &runs {
        aggregate = Some(merge_run(strategy.as_ref(), aggregate, run, &key, 300).unwrap());
    }
    let rollup = StatRollup::from_value(&aggregate.unwrap().metadata).unwrap();

    assert_eq!(rollup.fields["packet_loss"].mean(), Some(50.0));
    assert_eq!(rollup.fields["packet_loss"].count, 3);
    assert_eq!(rollup.fields["avg_latency"].mean(), Some(15.0));
    assert_eq!(rollup.fields["avg_latency"].count, 2);
    assert_eq!(rollup.error_count, 1);
}

#[test]
fn merged_mean_is_exact_over_the_carried_sum_and_count() {
    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let key = BucketKey::new("vigil.reach", "instance-1");

    let mut aggregate: Option<BucketAggregate> = None;
    for value in [12.5, 7.25, 100.0] {
        let run = run_with(json!({"avg_latency": value}), None, Some(5), 50);
        aggregate = Some(merge_run(strategy.as_ref(), aggregate, &run, &key, 300).unwrap());
    }
    let before = StatRollup::from_value(&aggregate.as_ref().unwrap().metadata).unwrap();
    let stat = &before.fields["avg_latency"];
    let (old_sum, old_count) = (stat.sum, stat.count);

    let run = run_with(json!({"avg_latency": 42.0}), None, Some(5), 60);
    let merged = merge_run(strategy.as_ref(), aggregate, &run, &key, 300).unwrap();
    let after = StatRollup::from_value(&merged.metadata).unwrap();

    let expected = (old_sum + 42.0) / (old_count + 1) as f64;
    assert!((after.fields["avg_latency"].mean().unwrap() - expected).abs() < f64::EPSILON);
}

#[test]
fn merges_never_cross_bucket_boundaries() {
    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let key = BucketKey::new("vigil.reach", "instance-1");

    let in_bucket = run_with(json!({"packet_loss": 0.0}), None, Some(5), 100);
    let aggregate = merge_run(strategy.as_ref(), None, &in_bucket, &key, 300).unwrap();
    assert_eq!(aggregate.bucket_start, 0);

    let next_bucket = run_with(json!({"packet_loss": 0.0}), None, Some(5), 300);
    match merge_run(strategy.as_ref(), Some(aggregate), &next_bucket, &key, 300) {
        Err(AggregateError::BucketMismatch { expected_start: 300, bucket_start: 0, .. }) => {}
        other => panic!("expected bucket mismatch, got {other:?}"),
    }
}

#[test]
fn boundary_run_belongs_to_the_bucket_starting_at_its_timestamp() {
    assert_eq!(bucket_start(600, 60), 600);

    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let key = BucketKey::new("vigil.reach", "instance-1");
    let run = run_with(json!({"packet_loss": 0.0}), None, Some(5), 600);
    let aggregate = merge_run(strategy.as_ref(), None, &run, &key, 60).unwrap();
    assert_eq!(aggregate.bucket_start, 600);
}

#[test]
fn store_keeps_series_isolated_and_time_ordered() {
    let registry = registry();
    let strategy = registry.get("vigil.reach").unwrap();
    let store = AggregateStore::new();
    let key_a = BucketKey::new("vigil.reach", "instance-a");
    let key_b = BucketKey::new("vigil.reach", "instance-b");

    // out-of-order arrival across three buckets
    for ts in [700, 100, 400] {
        let run = run_with(json!({"packet_loss": 0.0}), None, Some(5), ts);
        store.record(strategy.as_ref(), &key_a, 300, &run).unwrap();
    }
    let run = run_with(json!({"packet_loss": 100.0}), Some("down"), Some(5), 100);
    store.record(strategy.as_ref(), &key_b, 300, &run).unwrap();

    let series_a = store.get_aggregates(&key_a, 0..900, 300);
    let starts: Vec<i64> = series_a.iter().map(|a| a.bucket_start).collect();
    assert_eq!(starts, vec![0, 300, 600]);

    // restartable: same call, same answer
    let again = store.get_aggregates(&key_a, 0..900, 300);
    assert_eq!(again.len(), series_a.len());

    // a mid-bucket range start still includes that bucket
    let partial = store.get_aggregates(&key_a, 350..600, 300);
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].bucket_start, 300);

    let series_b = store.get_aggregates(&key_b, 0..900, 300);
    assert_eq!(series_b.len(), 1);
    let rollup = StatRollup::from_value(&series_b[0].metadata).unwrap();
    assert_eq!(rollup.error_count, 1);
}

#[tokio::test]
async fn concurrent_merges_for_one_series_lose_no_updates() {
    use std::sync::Arc;

    let registry = Arc::new(registry());
    let strategy = registry.get("vigil.reach").unwrap();
    let store = Arc::new(AggregateStore::new());
    let key = BucketKey::new("vigil.reach", "instance-1");

    let mut handles = Vec::new();
    for i in 0..32u64 {
        let strategy = Arc::clone(&strategy);
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let run = run_with(json!({"packet_loss": (i % 4) as f64}), None, Some(i), 42);
            store.record(strategy.as_ref(), &key, 300, &run).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let aggregates = store.get_aggregates(&key, 0..300, 300);
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].run_count, 32);
    let rollup = StatRollup::from_value(&aggregates[0].metadata).unwrap();
    assert_eq!(rollup.availability.total, 32);
    assert_eq!(rollup.fields["packet_loss"].count, 32);
}
