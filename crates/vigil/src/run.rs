use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assertion::FailedAssertion;

/// Disposition of a single probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Healthy => write!(f, "healthy"),
            RunStatus::Unhealthy => write!(f, "unhealthy"),
            RunStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Result of one probe invocation
///
/// Created once per invocation and immutable afterwards; the aggregation
/// engine reads runs but never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique id of this run
    pub id: Uuid,

    /// Check configuration this run was executed for
    pub check_id: Uuid,

    /// System/target the check belongs to
    pub system_id: String,

    /// Disposition of the run
    pub status: RunStatus,

    /// Wall-clock time from acquisition to completion (or to failure)
    pub latency_ms: Option<u64>,

    /// Strategy-specific result payload at its current schema version
    pub metadata: Value,

    /// Expected probe failure, if any (timeout, refusal, bad status)
    pub error: Option<String>,

    /// First assertion rule that failed, if any
    pub failed_assertion: Option<FailedAssertion>,

    /// Unix timestamp (seconds) when the run started
    pub timestamp: i64,
}

impl Run {
    /// Create a new run with unknown disposition
    pub fn new(check_id: Uuid, system_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            check_id,
            system_id: system_id.into(),
            status: RunStatus::Unhealthy,
            latency_ms: None,
            metadata: Value::Null,
            error: None,
            failed_assertion: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Mark the run healthy with its result payload
    pub fn healthy(mut self, latency_ms: u64, metadata: Value) -> Self {
        self.status = RunStatus::Healthy;
        self.latency_ms = Some(latency_ms);
        self.metadata = metadata;
        self
    }

    /// Mark the run degraded (successful but slow)
    pub fn degraded(mut self, latency_ms: u64, metadata: Value) -> Self {
        self.status = RunStatus::Degraded;
        self.latency_ms = Some(latency_ms);
        self.metadata = metadata;
        self
    }

    /// Mark the run unhealthy with an expected probe failure
    pub fn unhealthy(mut self, latency_ms: u64, metadata: Value, error: impl Into<String>) -> Self {
        self.status = RunStatus::Unhealthy;
        self.latency_ms = Some(latency_ms);
        self.metadata = metadata;
        self.error = Some(error.into());
        self
    }

    /// Mark the run unhealthy because an assertion rule failed
    pub fn failed_assertion(mut self, latency_ms: u64, metadata: Value, failed: FailedAssertion) -> Self {
        self.status = RunStatus::Unhealthy;
        self.latency_ms = Some(latency_ms);
        self.metadata = metadata;
        self.failed_assertion = Some(failed);
        self
    }

    /// Override the start timestamp (used by replays and tests)
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}
