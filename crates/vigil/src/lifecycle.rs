//! Per-invocation connection lifecycle and run construction.
//!
//! One invocation acquires the client, runs `execute` exactly once, and
//! releases the client on every exit path: success, probe failure, timeout.
//! The whole invocation sits under a caller-enforced deadline so a hung
//! probe never stays pending; a timed-out invocation commits nothing from
//! the in-flight attempt.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::time::timeout;
use uuid::Uuid;

use crate::assertion::{self, AssertionRule};
use crate::run::Run;
use crate::strategy::erased::{ConnectedClient, ErasedStrategy};

/// Everything the runner needs to execute one check instance
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub check_id: Uuid,
    pub system_id: String,

    /// Canonical config, already resolved to the current schema version
    pub config: Value,

    /// Rules evaluated in declaration order against the result payload
    pub assertions: Vec<AssertionRule>,

    /// Deadline for the whole invocation (connect + execute)
    pub timeout: Duration,

    /// Successful runs slower than this are marked degraded
    pub degraded_threshold_ms: Option<u64>,
}

/// Execute one probe invocation end to end and build its run.
///
/// Never returns an error: every failure mode is a disposition on the run.
pub async fn run_probe(strategy: &dyn ErasedStrategy, spec: &CheckSpec) -> Run {
    let started = Instant::now();
    let run = Run::new(spec.check_id, spec.system_id.clone());

    let mut client = match timeout(spec.timeout, strategy.create_client(&spec.config)).await {
        Ok(Ok(client)) => client,
        Ok(Err(err)) => {
            return connection_failure(run, started, err.to_string());
        }
        Err(_) => {
            return connection_failure(
                run,
                started,
                format!("connection attempt timed out after {:?}", spec.timeout),
            );
        }
    };

    let remaining = spec.timeout.saturating_sub(started.elapsed());
    let outcome = match timeout(remaining, strategy.execute(&spec.config, &mut client)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            // in-flight result is discarded, only the timeout itself is recorded
            close_client(&mut client, spec.timeout).await;
            let latency = started.elapsed().as_millis() as u64;
            return run.unhealthy(
                latency,
                json!({"error_kind": "timeout"}),
                format!("probe timed out after {:?}", spec.timeout),
            );
        }
    };
    close_client(&mut client, spec.timeout).await;

    let latency = started.elapsed().as_millis() as u64;
    let metadata = outcome.result.unwrap_or(Value::Null);

    if let Some(error) = outcome.error {
        return run.unhealthy(latency, metadata, error);
    }
    if let Some(failed) = assertion::evaluate(&spec.assertions, &metadata) {
        return run.failed_assertion(latency, metadata, failed);
    }
    if spec.degraded_threshold_ms.is_some_and(|threshold| latency > threshold) {
        return run.degraded(latency, metadata);
    }
    run.healthy(latency, metadata)
}

fn connection_failure(run: Run, started: Instant, message: String) -> Run {
    let latency = started.elapsed().as_millis() as u64;
    let metadata = json!({"error_kind": "connection", "message": &message});
    run.unhealthy(latency, metadata, message)
}

/// Release the client under its own deadline.
///
/// A close that hangs (half-dead peer, full send buffer) is abandoned: the
/// boxed close future is dropped and the socket falls back to `Drop`, so the
/// invocation never stays pending past its budget.
async fn close_client(client: &mut ConnectedClient, grace: Duration) {
    if timeout(grace, client.close()).await.is_err() {
        tracing::warn!(grace = ?grace, "client close did not finish, abandoning connection");
    }
}
