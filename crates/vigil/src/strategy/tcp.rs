//! TCP connect probe strategy.
//!
//! The one built-in with a stateful client: `connect` opens the socket, and
//! the lifecycle layer guarantees the stream is shut down on every exit path.

use std::time::Instant;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::ConnectError;
use crate::schema::{Migration, VersionedSchema};
use crate::strategy::{ProbeClient, ProbeOutcome, Strategy};
use crate::validation;

const CONFIG_VERSION: u32 = 2;

/// TCP probe configuration (version 2)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
}

/// Result payload of one TCP probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpResult {
    pub remote_addr: String,
    pub connect_latency_ms: u64,
}

/// Version 1 configs carried a single `target` in `host:port` form
fn migrate_v1(mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        if let Some(target) = map.remove("target").and_then(|t| t.as_str().map(str::to_owned)) {
            let (host, port) = match target.rsplit_once(':') {
                Some((host, port)) => (host.to_owned(), port.parse::<u16>().unwrap_or(0)),
                None => (target, 0),
            };
            map.entry("host").or_insert(json!(host));
            map.entry("port").or_insert(json!(port));
        }
    }
    data
}

/// The connected socket plus connect-phase timing carried into `execute`
pub struct TcpProbeClient {
    stream: TcpStream,
    connect_latency_ms: u64,
}

#[async_trait]
impl ProbeClient for TcpProbeClient {
    async fn close(&mut self) {
        // a peer that already hung up makes shutdown fail; nothing to do then
        let _ = self.stream.shutdown().await;
    }
}

#[derive(Debug, Default)]
pub struct TcpStrategy;

#[async_trait]
impl Strategy for TcpStrategy {
    type Config = TcpConfig;
    type Output = TcpResult;
    type Client = TcpProbeClient;

    fn id(&self) -> &'static str {
        "tcp"
    }

    fn display_name(&self) -> &'static str {
        "TCP connect"
    }

    fn description(&self) -> &'static str {
        "Opens a TCP connection to host:port and reports connect latency"
    }

    fn config_schema(&self) -> VersionedSchema<Self::Config> {
        VersionedSchema::new(CONFIG_VERSION).with_migration(Migration::new(
            1,
            "split target into host and port",
            migrate_v1,
        ))
    }

    fn check_config(&self, config: &Self::Config) -> Result<(), String> {
        validation::validate_host(&config.host)?;
        validation::validate_port(config.port)?;
        Ok(())
    }

    async fn connect(&self, config: &Self::Config) -> Result<Self::Client, ConnectError> {
        let started = Instant::now();
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|err| ConnectError::Failed(format!("TCP connection failed: {err}")))?;
        Ok(TcpProbeClient { stream, connect_latency_ms: started.elapsed().as_millis() as u64 })
    }

    async fn execute(
        &self,
        _config: &Self::Config,
        client: &mut Self::Client,
    ) -> ProbeOutcome<Self::Output> {
        let remote_addr = match client.stream.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(err) => return ProbeOutcome::failed(format!("connection lost: {err}")),
        };
        ProbeOutcome::ok(TcpResult { remote_addr, connect_latency_ms: client.connect_latency_ms })
    }
}
