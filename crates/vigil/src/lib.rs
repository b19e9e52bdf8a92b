//! Vigil - pluggable probe execution and rollup engine
//!
//! This library runs heterogeneous health probes ("strategies") against
//! external targets, validates their versioned configuration formats,
//! evaluates user-declared assertion rules against results, and folds the
//! stream of runs into time-bucketed aggregates that match a full
//! recomputation exactly.

pub mod aggregate;
pub mod assertion;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod run;
pub mod schema;
pub mod strategy;
pub mod validation;

// Re-export main types
pub use aggregate::{BucketAggregate, BucketKey, NumericStat, RateStat, StatRollup, store::AggregateStore};
pub use assertion::{AssertionOperator, AssertionRule, FailedAssertion};
pub use error::{AggregateError, ConnectError, RegistryError, SchemaError};
pub use lifecycle::{CheckSpec, run_probe};
pub use registry::{StrategyMeta, StrategyRegistry};
pub use run::{Run, RunStatus};
pub use schema::{Migration, Versioned, VersionedSchema};
pub use strategy::erased::{ConnectedClient, ErasedStrategy};
pub use strategy::{ProbeClient, ProbeOutcome, Strategy};
