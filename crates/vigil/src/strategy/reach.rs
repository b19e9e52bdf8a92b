//! Multi-attempt reachability probe.
//!
//! A ping-style collector that needs no raw sockets: it makes several
//! connect attempts and reports packet loss and average latency over the
//! attempts that answered. Marked `allow_multiple` so one check can watch
//! several targets, each under its own instance id.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ConnectError;
use crate::schema::VersionedSchema;
use crate::strategy::{ProbeOutcome, Strategy};
use crate::validation;

fn default_attempts() -> u32 {
    4
}

fn default_attempt_timeout_ms() -> u64 {
    1000
}

/// Reachability probe configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReachConfig {
    pub host: String,
    pub port: u16,

    /// Connect attempts per run
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Timeout per attempt; a slower answer counts as lost
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

/// Result payload of one reachability run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachResult {
    /// Lost attempts as a percentage of those sent
    pub packet_loss: f64,

    /// Mean latency over answered attempts; absent when all were lost
    pub avg_latency: Option<f64>,

    pub sent: u32,
    pub received: u32,
}

#[derive(Debug, Default)]
pub struct ReachStrategy;

#[async_trait]
impl Strategy for ReachStrategy {
    type Config = ReachConfig;
    type Output = ReachResult;
    type Client = ();

    fn id(&self) -> &'static str {
        "reach"
    }

    fn display_name(&self) -> &'static str {
        "Reachability"
    }

    fn description(&self) -> &'static str {
        "Repeated connect attempts reporting packet loss and average latency"
    }

    fn allow_multiple(&self) -> bool {
        true
    }

    fn config_schema(&self) -> VersionedSchema<Self::Config> {
        VersionedSchema::new(1)
    }

    fn check_config(&self, config: &Self::Config) -> Result<(), String> {
        validation::validate_host(&config.host)?;
        validation::validate_port(config.port)?;
        if config.attempts == 0 {
            return Err("attempts must be at least 1".into());
        }
        Ok(())
    }

    async fn connect(&self, _config: &Self::Config) -> Result<Self::Client, ConnectError> {
        Ok(())
    }

    async fn execute(
        &self,
        config: &Self::Config,
        _client: &mut Self::Client,
    ) -> ProbeOutcome<Self::Output> {
        let attempt_timeout = Duration::from_millis(config.attempt_timeout_ms);
        let mut latencies = Vec::with_capacity(config.attempts as usize);

        for _ in 0..config.attempts {
            let started = Instant::now();
            let connect = TcpStream::connect((config.host.as_str(), config.port));
            if let Ok(Ok(stream)) = timeout(attempt_timeout, connect).await {
                latencies.push(started.elapsed().as_millis() as f64);
                drop(stream);
            }
        }

        let sent = config.attempts;
        let received = latencies.len() as u32;
        let result = ReachResult {
            packet_loss: f64::from(sent - received) / f64::from(sent) * 100.0,
            avg_latency: (received > 0)
                .then(|| latencies.iter().sum::<f64>() / f64::from(received)),
            sent,
            received,
        };

        if received == 0 {
            ProbeOutcome::partial(result, format!("all {sent} attempts failed"))
        } else {
            ProbeOutcome::ok(result)
        }
    }
}
