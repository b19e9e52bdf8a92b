//! Object-safe form of [`Strategy`] for registry storage and dispatch.
//!
//! The erased layer deserializes the canonical config per call and downcasts
//! the boxed client back to the strategy's own client type, so polymorphic
//! dispatch never gives up per-strategy type safety.

use std::any::Any;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{AggregateError, ConnectError, SchemaError};
use crate::run::Run;
use crate::schema::export;
use crate::strategy::{ProbeClient, ProbeOutcome, Strategy};

trait ErasedClient: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn close_boxed(&mut self) -> BoxFuture<'_, ()>;
}

impl<C: ProbeClient> ErasedClient for C {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn close_boxed(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(self.close())
    }
}

/// An acquired connection, exclusively owned by one invocation
pub struct ConnectedClient {
    inner: Option<Box<dyn ErasedClient>>,
}

impl ConnectedClient {
    fn new<C: ProbeClient>(client: C) -> Self {
        Self { inner: Some(Box::new(client)) }
    }

    /// Release the underlying connection. Idempotent and non-throwing:
    /// the first call hands the client to its `close`, later calls are no-ops.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.inner.take() {
            client.close_boxed().await;
        }
    }

    fn downcast_mut<C: 'static>(&mut self) -> Option<&mut C> {
        self.inner.as_mut().and_then(|client| client.as_any_mut().downcast_mut::<C>())
    }
}

impl std::fmt::Debug for ConnectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedClient").field("open", &self.inner.is_some()).finish()
    }
}

/// Object-safe strategy surface consumed by the registry and runner
#[async_trait]
pub trait ErasedStrategy: Send + Sync {
    fn id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn allow_multiple(&self) -> bool;

    /// Resolve a raw config payload (any historical version) to canonical
    /// current-version data. Fatal at configuration-save time, never during
    /// execution.
    fn validate_config(&self, raw: &Value) -> Result<Value, SchemaError>;

    /// Lift a stored result payload to the current result version
    fn validate_result(&self, raw: &Value) -> Result<Value, SchemaError>;

    /// JSON-Schema document for the current config version, secret fields
    /// flagged
    fn config_schema_json(&self) -> Value;

    async fn create_client(&self, config: &Value) -> Result<ConnectedClient, ConnectError>;

    async fn execute(&self, config: &Value, client: &mut ConnectedClient) -> ProbeOutcome<Value>;

    fn merge_result(&self, existing: Option<&Value>, run: &Run) -> Result<Value, AggregateError>;
}

/// Blanket adapter from a typed strategy to the erased surface
pub(crate) struct Erased<S>(pub S);

impl<S: Strategy> Erased<S> {
    fn parse_config(&self, config: &Value) -> Result<S::Config, serde_json::Error> {
        serde_json::from_value(config.clone())
    }
}

#[async_trait]
impl<S: Strategy> ErasedStrategy for Erased<S> {
    fn id(&self) -> &'static str {
        self.0.id()
    }

    fn display_name(&self) -> &'static str {
        self.0.display_name()
    }

    fn description(&self) -> &'static str {
        self.0.description()
    }

    fn allow_multiple(&self) -> bool {
        self.0.allow_multiple()
    }

    fn validate_config(&self, raw: &Value) -> Result<Value, SchemaError> {
        let schema = self.0.config_schema();
        let config: S::Config = schema.validate(raw)?;
        self.0.check_config(&config).map_err(SchemaError::Semantic)?;
        serde_json::to_value(&config)
            .map_err(|source| SchemaError::Validation { version: schema.current_version(), source })
    }

    fn validate_result(&self, raw: &Value) -> Result<Value, SchemaError> {
        self.0.result_schema().validate(raw)
    }

    fn config_schema_json(&self) -> Value {
        let mut doc = export::schema_document::<S::Config>();
        export::flag_secret_fields(&mut doc, self.0.secret_fields());
        doc
    }

    async fn create_client(&self, config: &Value) -> Result<ConnectedClient, ConnectError> {
        // Configs reaching execution were validated at save time; a parse
        // failure here is a wiring defect, not a probe failure.
        let config = self
            .parse_config(config)
            .map_err(|err| ConnectError::Failed(format!("config no longer parses: {err}")))?;
        let client = self.0.connect(&config).await?;
        Ok(ConnectedClient::new(client))
    }

    async fn execute(&self, config: &Value, client: &mut ConnectedClient) -> ProbeOutcome<Value> {
        let config = match self.parse_config(config) {
            Ok(config) => config,
            Err(err) => return ProbeOutcome::failed(format!("config no longer parses: {err}")),
        };
        let Some(typed) = client.downcast_mut::<S::Client>() else {
            return ProbeOutcome::failed("connected client does not belong to this strategy");
        };
        let outcome = self.0.execute(&config, typed).await;
        let result = match outcome.result.map(|r| serde_json::to_value(&r)) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                return ProbeOutcome::failed(format!("result serialization failed: {err}"));
            }
            None => None,
        };
        ProbeOutcome { result, error: outcome.error }
    }

    fn merge_result(&self, existing: Option<&Value>, run: &Run) -> Result<Value, AggregateError> {
        self.0.merge_result(existing, run)
    }
}
