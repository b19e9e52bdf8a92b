//! Probe strategies: the pluggable probe types of the engine.
//!
//! A [`Strategy`] is fully typed per probe (config, result, client). The
//! registry and runner work with the object-safe [`erased::ErasedStrategy`]
//! form, which moves payloads as `serde_json::Value` at the boundary while
//! each strategy keeps its own types internally.

pub mod erased;
pub mod http;
pub mod reach;
pub mod tcp;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::aggregate::StatRollup;
use crate::error::{AggregateError, ConnectError};
use crate::run::Run;
use crate::schema::VersionedSchema;

/// A live handle to a probe's underlying connection.
///
/// Owned by exactly one invocation. `close` must be safe to call on a
/// half-dead connection; it never fails and the erased wrapper makes it
/// idempotent.
#[async_trait]
pub trait ProbeClient: Send + 'static {
    async fn close(&mut self) {}
}

/// Stateless probes carry no connection
#[async_trait]
impl ProbeClient for () {}

/// Outcome of one `execute` call.
///
/// Expected failure modes (timeouts, refused connections, bad status codes)
/// surface through `error`, never as a panic or an `Err` — the runner always
/// gets a value to turn into a run.
#[derive(Debug, Clone)]
pub struct ProbeOutcome<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ProbeOutcome<T> {
    pub fn ok(result: T) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { result: None, error: Some(error.into()) }
    }

    /// A result was produced but the probe still counts as failed
    /// (e.g. the target answered with an unexpected status)
    pub fn partial(result: T, error: impl Into<String>) -> Self {
        Self { result: Some(result), error: Some(error.into()) }
    }
}

/// A probe type: versioned schemas, a connection factory, an execute
/// operation and an aggregation merge. Immutable once registered.
#[async_trait]
pub trait Strategy: Send + Sync + 'static {
    /// Configuration at its current schema version
    type Config: Serialize + DeserializeOwned + JsonSchema + Send + Sync;

    /// Result payload produced by `execute`
    type Output: Serialize + Send;

    /// Connection handle created per invocation
    type Client: ProbeClient;

    /// Identifier within the registering plugin's namespace
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Whether one check may select this strategy more than once; each
    /// selection then gets its own instance id
    fn allow_multiple(&self) -> bool {
        false
    }

    /// Config fields whose values must never be echoed in plaintext
    fn secret_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Current config schema plus the migration chain from older versions
    fn config_schema(&self) -> VersionedSchema<Self::Config>;

    /// Migration chain for stored result payloads
    fn result_schema(&self) -> VersionedSchema<Value> {
        VersionedSchema::new(1)
    }

    /// Semantic checks beyond what the schema can express, run at
    /// config-save time
    fn check_config(&self, _config: &Self::Config) -> Result<(), String> {
        Ok(())
    }

    /// Establish the probe's connection. Failure here is fatal for the run:
    /// `execute` is never invoked.
    async fn connect(&self, config: &Self::Config) -> Result<Self::Client, ConnectError>;

    /// Run the probe once against an acquired client
    async fn execute(
        &self,
        config: &Self::Config,
        client: &mut Self::Client,
    ) -> ProbeOutcome<Self::Output>;

    /// Merge one run into an existing bucket aggregate payload.
    ///
    /// Must be exact under any merge order and partitioning; the default
    /// numeric rollup carries `{sum, count, min, max}` per field.
    fn merge_result(&self, existing: Option<&Value>, run: &Run) -> Result<Value, AggregateError> {
        StatRollup::merge(existing, run)
    }
}
