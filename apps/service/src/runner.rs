use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;
use vigil::aggregate::BucketKey;
use vigil::{AggregateStore, CheckSpec, ErasedStrategy, Run, StrategyRegistry, assertion, run_probe};

use crate::config::{CheckConfig, Config};

/// A check resolved against the registry, config validated and ready to run
pub struct PreparedCheck {
    pub name: String,
    pub strategy: Arc<dyn ErasedStrategy>,
    pub key: BucketKey,
    pub spec: CheckSpec,
    pub interval: Duration,
    pub enabled: bool,
}

impl std::fmt::Debug for PreparedCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCheck")
            .field("name", &self.name)
            .field("strategy", &self.strategy.id())
            .field("key", &self.key)
            .field("spec", &self.spec)
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Resolve and validate every configured check.
///
/// This is configuration-save time: schema/migration resolution failures,
/// unknown strategies and broken assertion rules are all fatal here and can
/// never surface during execution.
pub fn prepare_checks(registry: &StrategyRegistry, config: &Config) -> Result<Vec<PreparedCheck>> {
    let mut prepared = Vec::with_capacity(config.checks.len());
    for check in &config.checks {
        prepared.push(
            prepare_check(registry, check, config.engine.degraded_threshold_ms)
                .with_context(|| format!("check `{}`", check.name))?,
        );
    }
    Ok(prepared)
}

fn prepare_check(
    registry: &StrategyRegistry,
    check: &CheckConfig,
    degraded_threshold_ms: u64,
) -> Result<PreparedCheck> {
    let strategy = registry.get(&check.strategy)?;
    let canonical = strategy.validate_config(&check.config)?;
    assertion::validate_rules(&check.assertions)?;

    let check_id = Uuid::new_v4();
    let instance_id = registry.instance_id(&check.strategy, check_id)?;

    Ok(PreparedCheck {
        name: check.name.clone(),
        strategy,
        key: BucketKey::new(check.strategy.clone(), instance_id),
        spec: CheckSpec {
            check_id,
            system_id: check.system_id.clone(),
            config: canonical,
            assertions: check.assertions.clone(),
            timeout: Duration::from_secs(check.timeout_seconds),
            degraded_threshold_ms: Some(degraded_threshold_ms),
        },
        interval: Duration::from_secs(check.interval_seconds.max(1)),
        enabled: check.enabled,
    })
}

/// A completed run on its way to the aggregation store
pub struct RunEnvelope {
    pub strategy: Arc<dyn ErasedStrategy>,
    pub key: BucketKey,
    pub run: Run,
}

/// Coordinates periodic execution of prepared checks
pub struct Scheduler {
    result_tx: mpsc::Sender<RunEnvelope>,
}

impl Scheduler {
    pub fn new(result_tx: mpsc::Sender<RunEnvelope>) -> Self {
        Self { result_tx }
    }

    /// Spawn the periodic loop for one check
    pub fn schedule_check(&self, check: PreparedCheck) -> tokio::task::JoinHandle<()> {
        let result_tx = self.result_tx.clone();

        tokio::spawn(async move {
            if !check.enabled {
                return;
            }

            let mut timer = interval(check.interval);

            loop {
                timer.tick().await;

                let run = run_probe(check.strategy.as_ref(), &check.spec).await;
                tracing::debug!(
                    check = %check.name,
                    status = %run.status,
                    latency_ms = run.latency_ms,
                    "check completed"
                );

                let envelope = RunEnvelope {
                    strategy: Arc::clone(&check.strategy),
                    key: check.key.clone(),
                    run,
                };
                if result_tx.send(envelope).await.is_err() {
                    tracing::debug!(check = %check.name, "result channel closed, stopping");
                    break;
                }
            }
        })
    }

    /// Spawn loops for all checks
    pub fn schedule_checks(&self, checks: Vec<PreparedCheck>) -> Vec<tokio::task::JoinHandle<()>> {
        checks.into_iter().map(|check| self.schedule_check(check)).collect()
    }
}

/// Fold incoming runs into the aggregate store until the channel closes.
///
/// Merge failures are surfaced in the log; the run stream keeps flowing.
pub async fn aggregate_runs(
    store: Arc<AggregateStore>,
    bucket_interval_seconds: u32,
    mut result_rx: mpsc::Receiver<RunEnvelope>,
) {
    while let Some(envelope) = result_rx.recv().await {
        if let Some(error) = &envelope.run.error {
            tracing::warn!(series = %envelope.key, error = %error, "unhealthy run");
        }
        if let Err(err) = store.record(
            envelope.strategy.as_ref(),
            &envelope.key,
            bucket_interval_seconds,
            &envelope.run,
        ) {
            tracing::error!(series = %envelope.key, error = %err, "failed to merge run");
        }
    }
}
