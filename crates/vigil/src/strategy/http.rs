//! HTTP/HTTPS probe strategy.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ConnectError;
use crate::schema::{Migration, VersionedSchema};
use crate::strategy::{ProbeClient, ProbeOutcome, Strategy};
use crate::validation;

const CONFIG_VERSION: u32 = 2;
const RESULT_VERSION: u32 = 2;

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

/// HTTP probe configuration (version 2)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HttpConfig {
    /// URL to probe
    pub url: String,

    /// HTTP method, `GET` by default
    #[serde(default = "default_method")]
    pub method: String,

    /// Extra request headers
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Optional request body
    #[serde(default)]
    pub body: Option<String>,

    /// Bearer token sent in the Authorization header
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-request timeout applied by the client
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Status codes accepted as success; 2xx and 3xx when unset
    #[serde(default)]
    pub accepted_statuses: Option<Vec<u16>>,
}

/// Result payload of one HTTP probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResult {
    pub status_code: u16,
    pub latency_ms: u64,
    pub response_size: Option<u64>,
}

/// Version 1 configs named the URL field `target` and had no `method`
fn migrate_v1(mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        if let Some(target) = map.remove("target") {
            map.entry("url").or_insert(target);
        }
        map.entry("method").or_insert(json!("GET"));
    }
    data
}

/// Version 1 results reported the status under `code`
fn migrate_result_v1(mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        if let Some(code) = map.remove("code") {
            map.entry("status_code").or_insert(code);
        }
    }
    data
}

#[async_trait]
impl ProbeClient for reqwest::Client {}

#[derive(Debug, Default)]
pub struct HttpStrategy;

#[async_trait]
impl Strategy for HttpStrategy {
    type Config = HttpConfig;
    type Output = HttpResult;
    type Client = reqwest::Client;

    fn id(&self) -> &'static str {
        "http"
    }

    fn display_name(&self) -> &'static str {
        "HTTP(S)"
    }

    fn description(&self) -> &'static str {
        "Sends an HTTP request and checks the response status"
    }

    fn secret_fields(&self) -> &'static [&'static str] {
        &["bearer_token"]
    }

    fn config_schema(&self) -> VersionedSchema<Self::Config> {
        VersionedSchema::new(CONFIG_VERSION).with_migration(Migration::new(
            1,
            "rename target to url, default method to GET",
            migrate_v1,
        ))
    }

    fn result_schema(&self) -> VersionedSchema<Value> {
        VersionedSchema::new(RESULT_VERSION).with_migration(Migration::new(
            1,
            "rename code to status_code",
            migrate_result_v1,
        ))
    }

    fn check_config(&self, config: &Self::Config) -> Result<(), String> {
        validation::validate_http_target(&config.url)?;
        validation::validate_http_method(&config.method)?;
        Ok(())
    }

    async fn connect(&self, config: &Self::Config) -> Result<Self::Client, ConnectError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| ConnectError::Failed(format!("HTTP client build failed: {err}")))
    }

    async fn execute(
        &self,
        config: &Self::Config,
        client: &mut Self::Client,
    ) -> ProbeOutcome<Self::Output> {
        let method = match reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => return ProbeOutcome::failed(format!("unsupported method {}", config.method)),
        };

        let mut request = client.request(method, &config.url);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &config.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            // timeouts and refused connections are expected failures
            Err(err) => return ProbeOutcome::failed(format!("HTTP request failed: {err}")),
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let status = response.status();
        let result = HttpResult {
            status_code: status.as_u16(),
            latency_ms,
            response_size: response.content_length(),
        };

        let accepted = match &config.accepted_statuses {
            Some(statuses) => statuses.contains(&status.as_u16()),
            None => status.is_success() || status.is_redirection(),
        };
        if accepted {
            ProbeOutcome::ok(result)
        } else {
            ProbeOutcome::partial(result, format!("unexpected status code {}", status.as_u16()))
        }
    }
}
