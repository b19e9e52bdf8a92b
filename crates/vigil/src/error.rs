use std::time::Duration;

use thiserror::Error;

/// Errors raised while resolving a versioned payload to its current schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The payload reached the current version but failed to parse.
    #[error("payload failed validation at schema version {version}: {source}")]
    Validation {
        version: u32,
        #[source]
        source: serde_json::Error,
    },

    /// No migration covers an intermediate version. Fatal: the chain must be
    /// linear and complete, a gap is never skipped.
    #[error("no migration registered for version {from} (current version is {current})")]
    MigrationGap { from: u32, current: u32 },

    /// The payload claims a version newer than this build understands.
    #[error("payload version {found} is ahead of current version {current}")]
    VersionAhead { found: u32, current: u32 },

    /// The envelope's version tag is not a positive integer.
    #[error("payload version tag is not a positive integer: {0}")]
    BadVersionTag(serde_json::Value),

    /// The payload parsed, but a strategy-specific check rejected it.
    #[error("invalid configuration: {0}")]
    Semantic(String),
}

/// Registration and lookup failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("strategy `{0}` is already registered")]
    Duplicate(String),
    #[error("no strategy registered under `{0}`")]
    Unknown(String),
}

/// Failure to establish a probe's underlying connection. Per-run fatal: the
/// run is recorded unhealthy and `execute` is never invoked.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connection failed: {0}")]
    Failed(String),
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised when merging a run into a bucket aggregate. Surfaced to the
/// caller and logged, never silently dropped.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The run's timestamp falls outside the existing bucket window.
    #[error(
        "run at {run_timestamp} belongs to bucket {expected_start}, not {bucket_start} \
         ({interval_seconds}s interval)"
    )]
    BucketMismatch {
        run_timestamp: i64,
        expected_start: i64,
        bucket_start: i64,
        interval_seconds: u32,
    },

    /// The existing aggregate (or the merged output) does not have the shape
    /// the strategy's merge expects.
    #[error("aggregate shape mismatch for {context}: {detail}")]
    ShapeMismatch { context: &'static str, detail: String },
}
