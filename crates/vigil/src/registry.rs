//! Strategy registry keyed by namespaced identifiers.
//!
//! An explicit value constructed at startup and passed by reference to the
//! runner and API layer; there is no hidden global state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::strategy::Strategy;
use crate::strategy::erased::{Erased, ErasedStrategy};

/// Display metadata and the annotated config schema for one strategy,
/// consumed by an external form-rendering layer
#[derive(Debug, Clone, Serialize)]
pub struct StrategyMeta {
    pub qualified_id: String,
    pub display_name: &'static str,
    pub description: &'static str,
    pub allow_multiple: bool,
    pub config_schema: Value,
}

/// Holds registered strategies, immutable after plugin bootstrap
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn ErasedStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy under `plugin_id.strategy_id`. An id collision is
    /// fatal at startup.
    pub fn register<S: Strategy>(&mut self, strategy: S, plugin_id: &str) -> Result<(), RegistryError> {
        let qualified_id = format!("{plugin_id}.{}", strategy.id());
        if self.strategies.contains_key(&qualified_id) {
            return Err(RegistryError::Duplicate(qualified_id));
        }
        tracing::debug!(strategy = %qualified_id, "registered strategy");
        self.strategies.insert(qualified_id, Arc::new(Erased(strategy)));
        Ok(())
    }

    pub fn get(&self, qualified_id: &str) -> Result<Arc<dyn ErasedStrategy>, RegistryError> {
        self.strategies
            .get(qualified_id)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(qualified_id.to_string()))
    }

    /// Metadata export for every registered strategy, ordered by id
    pub fn strategies_with_meta(&self) -> Vec<StrategyMeta> {
        let mut meta: Vec<StrategyMeta> = self
            .strategies
            .iter()
            .map(|(qualified_id, strategy)| StrategyMeta {
                qualified_id: qualified_id.clone(),
                display_name: strategy.display_name(),
                description: strategy.description(),
                allow_multiple: strategy.allow_multiple(),
                config_schema: strategy.config_schema_json(),
            })
            .collect();
        meta.sort_by(|a, b| a.qualified_id.cmp(&b.qualified_id));
        meta
    }

    /// Instance id for one selection of a strategy. Strategies allowing
    /// multiple selections per check get a generated id so their stored
    /// results and aggregates stay distinguishable.
    pub fn instance_id(&self, qualified_id: &str, check_id: Uuid) -> Result<String, RegistryError> {
        let strategy = self.get(qualified_id)?;
        if strategy.allow_multiple() {
            Ok(format!("{check_id}#{}", Uuid::new_v4()))
        } else {
            Ok(check_id.to_string())
        }
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.strategies.keys().collect();
        ids.sort();
        f.debug_struct("StrategyRegistry").field("strategies", &ids).finish()
    }
}
