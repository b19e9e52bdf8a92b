//! Versioned payload validation and linear migration chains.
//!
//! Config and result payloads are stored as `{version, data}` envelopes so a
//! strategy's schema can evolve release-to-release without breaking data
//! written under older versions. Validation walks the payload forward one
//! version at a time through pure transforms, then parses against the current
//! schema. The chain is the single source of truth: a missing step is a fatal
//! [`SchemaError::MigrationGap`], never a silent skip.

pub mod export;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;

/// A payload tagged with the schema version it was written under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    pub data: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u32, data: T) -> Self {
        Self { version, data }
    }
}

/// A pure transform lifting a payload one version forward
pub struct Migration {
    from_version: u32,
    description: &'static str,
    migrate: fn(Value) -> Value,
}

impl Migration {
    pub fn new(from_version: u32, description: &'static str, migrate: fn(Value) -> Value) -> Self {
        Self { from_version, description, migrate }
    }

    pub fn from_version(&self) -> u32 {
        self.from_version
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn apply(&self, data: Value) -> Value {
        (self.migrate)(data)
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("from_version", &self.from_version)
            .field("description", &self.description)
            .finish()
    }
}

/// Schema for one payload type at its current version, plus the migration
/// chain from every historical version
#[derive(Debug)]
pub struct VersionedSchema<T> {
    current_version: u32,
    migrations: Vec<Migration>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> VersionedSchema<T> {
    /// Schema with no history yet
    pub fn new(current_version: u32) -> Self {
        Self { current_version: current_version.max(1), migrations: Vec::new(), _payload: PhantomData }
    }

    /// Add one step to the chain, kept ordered by source version.
    ///
    /// # Panics
    ///
    /// Two steps migrating from the same version would make the chain
    /// ambiguous; chains are authored in code, so registering a duplicate is
    /// a bug caught at strategy construction, not data to tolerate.
    pub fn with_migration(mut self, migration: Migration) -> Self {
        assert!(
            !self.migrations.iter().any(|m| m.from_version == migration.from_version),
            "duplicate migration from version {}",
            migration.from_version
        );
        self.migrations.push(migration);
        self.migrations.sort_by_key(Migration::from_version);
        self
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    /// Lift raw payload data from `version` to the current version without
    /// parsing it. Exposed separately so the equivalence of step-by-step and
    /// chain migration can be verified.
    pub fn migrate(&self, mut version: u32, mut data: Value) -> Result<Value, SchemaError> {
        if version > self.current_version {
            return Err(SchemaError::VersionAhead { found: version, current: self.current_version });
        }
        while version < self.current_version {
            let step = self
                .migrations
                .iter()
                .find(|m| m.from_version == version)
                .ok_or(SchemaError::MigrationGap { from: version, current: self.current_version })?;
            data = step.apply(data);
            version += 1;
        }
        Ok(data)
    }
}

impl<T: DeserializeOwned> VersionedSchema<T> {
    /// Validate raw data tagged with any historical version.
    ///
    /// Accepts either a `{version, data}` envelope or a bare payload, which
    /// is treated as version-1 data. Migrations run first, then the result is
    /// parsed against the current schema.
    pub fn validate(&self, raw: &Value) -> Result<T, SchemaError> {
        let (version, data) = split_envelope(raw)?;
        let migrated = self.migrate(version, data)?;
        serde_json::from_value(migrated)
            .map_err(|source| SchemaError::Validation { version: self.current_version, source })
    }
}

/// Read the version tag off a raw payload, defaulting to 1.
///
/// Only an object carrying both `version` and `data` keys is treated as an
/// envelope; anything else is a bare payload written before envelopes existed.
/// A tag that is present but not a positive integer is rejected rather than
/// guessed at.
fn split_envelope(raw: &Value) -> Result<(u32, Value), SchemaError> {
    if let Value::Object(map) = raw
        && let (Some(version), Some(data)) = (map.get("version"), map.get("data"))
    {
        let tag = version
            .as_u64()
            .filter(|v| (1..=u64::from(u32::MAX)).contains(v))
            .ok_or_else(|| SchemaError::BadVersionTag(version.clone()))?;
        return Ok((tag as u32, data.clone()));
    }
    Ok((1, raw.clone()))
}
