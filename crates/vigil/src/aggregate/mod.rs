//! Incremental time-bucketed aggregation of run streams.
//!
//! Every statistic carries enough internal state that folding runs in one at
//! a time, in any order or partitioning, lands on the same numbers as a full
//! recomputation: means carry `{sum, count}`, rates carry
//! `{successes, total}`, min/max use comparison.

pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AggregateError;
use crate::run::{Run, RunStatus};
use crate::strategy::erased::ErasedStrategy;

/// Bucket width used when a check does not configure one
pub const DEFAULT_BUCKET_INTERVAL_SECONDS: u32 = 300;

/// Start of the bucket a timestamp belongs to.
///
/// A run exactly on a boundary belongs to the bucket starting there, not the
/// prior one.
pub fn bucket_start(timestamp: i64, interval_seconds: u32) -> i64 {
    let interval = i64::from(interval_seconds.max(1));
    timestamp.div_euclid(interval).saturating_mul(interval)
}

/// Identifies one aggregate series: a strategy plus the check instance it
/// was selected for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    /// Qualified strategy id (`plugin.strategy`)
    pub strategy_id: String,

    /// Check instance the series belongs to; `allow_multiple` strategies get
    /// a generated instance id per selection
    pub instance_id: String,
}

impl BucketKey {
    pub fn new(strategy_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self { strategy_id: strategy_id.into(), instance_id: instance_id.into() }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.strategy_id, self.instance_id)
    }
}

/// One time-windowed rollup for one series.
///
/// A mergeable value object: the engine keeps merging while the bucket
/// window is open and leaves closing/retention to the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketAggregate {
    pub bucket_start: i64,
    pub bucket_interval_seconds: u32,
    pub key: BucketKey,

    /// Strategy-owned aggregated payload
    pub metadata: Value,

    pub run_count: u64,
}

/// Merge one run into an existing aggregate, or open a fresh bucket.
///
/// Never crosses bucket boundaries: a run outside the existing window is an
/// error for the caller to surface, not a silent drop.
pub fn merge_run(
    strategy: &dyn ErasedStrategy,
    existing: Option<BucketAggregate>,
    run: &Run,
    key: &BucketKey,
    interval_seconds: u32,
) -> Result<BucketAggregate, AggregateError> {
    let start = bucket_start(run.timestamp, interval_seconds);
    if let Some(aggregate) = &existing
        && (aggregate.bucket_start != start || aggregate.bucket_interval_seconds != interval_seconds)
    {
        return Err(AggregateError::BucketMismatch {
            run_timestamp: run.timestamp,
            expected_start: start,
            bucket_start: aggregate.bucket_start,
            interval_seconds,
        });
    }

    let metadata = strategy.merge_result(existing.as_ref().map(|a| &a.metadata), run)?;
    Ok(BucketAggregate {
        bucket_start: start,
        bucket_interval_seconds: interval_seconds,
        key: key.clone(),
        metadata,
        run_count: existing.map_or(1, |a| a.run_count + 1),
    })
}

/// Running `{sum, count, min, max}` for one numeric field.
///
/// The mean is derived, never stored, so repeated merges stay exact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStat {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
}

impl NumericStat {
    pub fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    /// Mean over observed values; `None` until something was observed
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Running success rate carrying `{successes, total}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStat {
    pub successes: u64,
    pub total: u64,
}

impl RateStat {
    pub fn observe(&mut self, success: bool) {
        if success {
            self.successes += 1;
        }
        self.total += 1;
    }

    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successes as f64 / self.total as f64)
    }
}

/// Default aggregated payload: per-field numeric stats over the run's
/// top-level numeric result fields, plus latency, availability and error
/// counters.
///
/// Fields are aggregated only over the runs where they are present, so a run
/// that errored before producing a value never skews a mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatRollup {
    pub fields: BTreeMap<String, NumericStat>,
    pub latency_ms: NumericStat,
    pub availability: RateStat,
    pub error_count: u64,
}

impl StatRollup {
    /// Merge entry point used as the default `Strategy::merge_result`
    pub fn merge(existing: Option<&Value>, run: &Run) -> Result<Value, AggregateError> {
        let mut rollup: StatRollup = match existing {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                AggregateError::ShapeMismatch {
                    context: "existing aggregate payload",
                    detail: err.to_string(),
                }
            })?,
            None => StatRollup::default(),
        };
        rollup.observe_run(run);
        serde_json::to_value(&rollup).map_err(|err| AggregateError::ShapeMismatch {
            context: "merged aggregate payload",
            detail: err.to_string(),
        })
    }

    pub fn observe_run(&mut self, run: &Run) {
        if let Some(latency) = run.latency_ms {
            self.latency_ms.observe(latency as f64);
        }
        // Degraded is reachable-but-slow: a success for availability
        self.availability.observe(run.status != RunStatus::Unhealthy);
        if run.error.is_some() {
            self.error_count += 1;
        }
        if let Value::Object(map) = &run.metadata {
            for (field, value) in map {
                if let Some(number) = value.as_f64() {
                    self.fields.entry(field.clone()).or_default().observe(number);
                }
            }
        }
    }

    /// Parse a stored aggregate payload back into the rollup shape
    pub fn from_value(value: &Value) -> Result<Self, AggregateError> {
        serde_json::from_value(value.clone()).map_err(|err| AggregateError::ShapeMismatch {
            context: "aggregate payload",
            detail: err.to_string(),
        })
    }
}
