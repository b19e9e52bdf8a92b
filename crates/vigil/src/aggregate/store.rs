//! In-memory aggregate store with per-series single-writer discipline.
//!
//! State is partitioned by (series key, bucket interval); merges for the same
//! series go through that series' mutex so concurrent runs never lose
//! updates, while different series proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::{Arc, Mutex, RwLock};

use crate::aggregate::{BucketAggregate, BucketKey, bucket_start, merge_run};
use crate::error::AggregateError;
use crate::run::Run;
use crate::strategy::erased::ErasedStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    key: BucketKey,
    interval_seconds: u32,
}

type Series = Arc<Mutex<BTreeMap<i64, BucketAggregate>>>;

/// Holds open bucket aggregates, keyed by series and bucket start
#[derive(Debug, Default)]
pub struct AggregateStore {
    series: RwLock<HashMap<SeriesKey, Series>>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn series(&self, key: &BucketKey, interval_seconds: u32) -> Series {
        let series_key = SeriesKey { key: key.clone(), interval_seconds };
        if let Some(series) = self.read_guard().get(&series_key) {
            return Arc::clone(series);
        }
        let mut map = self.series.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(map.entry(series_key).or_default())
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SeriesKey, Series>> {
        self.series.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge one run into its bucket. Merge failures are logged and returned,
    /// never swallowed: a silent drop would break fold equivalence.
    pub fn record(
        &self,
        strategy: &dyn ErasedStrategy,
        key: &BucketKey,
        interval_seconds: u32,
        run: &Run,
    ) -> Result<BucketAggregate, AggregateError> {
        let series = self.series(key, interval_seconds);
        let mut buckets = series.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let start = bucket_start(run.timestamp, interval_seconds);
        let existing = buckets.get(&start).cloned();
        match merge_run(strategy, existing, run, key, interval_seconds) {
            Ok(merged) => {
                buckets.insert(start, merged.clone());
                Ok(merged)
            }
            Err(err) => {
                tracing::error!(series = %key, bucket_start = start, error = %err, "aggregate merge failed");
                Err(err)
            }
        }
    }

    /// Time-ordered aggregates for one series within `range` (half-open, unix
    /// seconds). Finite and restartable: repeated calls with the same range
    /// see every bucket that existed at the first call.
    pub fn get_aggregates(
        &self,
        key: &BucketKey,
        range: Range<i64>,
        interval_seconds: u32,
    ) -> Vec<BucketAggregate> {
        let series_key = SeriesKey { key: key.clone(), interval_seconds };
        let Some(series) = self.read_guard().get(&series_key).cloned() else {
            return Vec::new();
        };
        let buckets = series.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // include the bucket a mid-bucket range start falls into
        let from = bucket_start(range.start, interval_seconds);
        buckets.range(from..range.end).map(|(_, aggregate)| aggregate.clone()).collect()
    }

    /// Every series currently holding buckets
    pub fn keys(&self) -> Vec<(BucketKey, u32)> {
        self.read_guard().keys().map(|k| (k.key.clone(), k.interval_seconds)).collect()
    }
}
