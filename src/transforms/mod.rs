//! Row transforms: pluggable per-record data rewriting.
//!
//! A transform consumes a record and its per-record asset list and returns
//! new ones. Transforms are built by name from a [`TransformRegistry`] and run
//! in order by a [`TransformChain`]; each unit sees only its own arguments and
//! the output of the unit before it.

pub mod builtin;
pub mod registry;

pub use registry::{TransformFactory, TransformRegistry};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assets::Asset;
use crate::error::{ConfigError, RowErrorKind, TransformError};
use crate::record::Record;

/// A single configured transform unit.
pub trait RowTransform: Send + Sync {
    /// Registry name of this transform.
    fn name(&self) -> &str;

    /// Transform one record and its asset list.
    fn process_row(
        &self,
        record: Record,
        assets: Vec<Asset>,
    ) -> Result<(Record, Vec<Asset>), TransformError>;
}

/// One entry of a chain configuration: a registry name plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl TransformSpec {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse a JSON list of specs, e.g.
    /// `[{"name": "code_to_location", "args": {"location_file": "rooms.csv"}}]`.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
            key: "MAILMERGE_TRANSFORMS".into(),
            message: e.to_string(),
        })
    }
}

/// Ordered list of transform units.
#[derive(Default)]
pub struct TransformChain {
    units: Vec<Box<dyn RowTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from specs, in order. Fails on the first unknown name or
    /// invalid argument set.
    pub fn from_specs(
        registry: &TransformRegistry,
        specs: &[TransformSpec],
    ) -> Result<Self, ConfigError> {
        let mut chain = Self::new();
        for spec in specs {
            chain.push(registry.build(&spec.name, &spec.args)?);
        }
        Ok(chain)
    }

    /// Append a unit to the end of the chain.
    pub fn push(&mut self, unit: Box<dyn RowTransform>) {
        debug!(unit = unit.name(), position = self.units.len(), "Added transform to chain");
        self.units.push(unit);
    }

    pub fn with(mut self, unit: Box<dyn RowTransform>) -> Self {
        self.push(unit);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    /// Run every unit in order, feeding each one the previous output.
    pub fn apply(
        &self,
        record: Record,
        assets: Vec<Asset>,
    ) -> Result<(Record, Vec<Asset>), RowErrorKind> {
        self.units
            .iter()
            .try_fold((record, assets), |(record, assets), unit| {
                unit.process_row(record, assets)
                    .map_err(|source| RowErrorKind::Transform {
                        unit: unit.name().to_string(),
                        source,
                    })
            })
    }
}
