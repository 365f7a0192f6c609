//! Transform registry: maps names to constructors.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::transforms::RowTransform;
use crate::transforms::builtin::{CodeToLocation, LocationImage};

/// Builds a configured transform from its JSON arguments.
pub type TransformFactory = fn(&serde_json::Value) -> Result<Box<dyn RowTransform>, ConfigError>;

/// Names of built-in transforms that cannot be shadowed by later registrations.
const PROTECTED_TRANSFORM_NAMES: &[&str] = &[CodeToLocation::NAME, LocationImage::NAME];

/// Registry of available transforms.
pub struct TransformRegistry {
    factories: HashMap<String, TransformFactory>,
    /// Tracks which names were registered as built-in (protected from shadowing).
    builtin_names: HashSet<String>,
}

impl TransformRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            builtin_names: HashSet::new(),
        }
    }

    /// Registry pre-populated with the built-in transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin(CodeToLocation::NAME, CodeToLocation::configure);
        registry.register_builtin(LocationImage::NAME, LocationImage::configure);
        registry
    }

    /// Register a transform. Rejects names that would shadow a built-in.
    /// Returns whether the registration took effect.
    pub fn register(&mut self, name: &str, factory: TransformFactory) -> bool {
        if self.builtin_names.contains(name) {
            tracing::warn!(
                transform = %name,
                "Rejected transform registration: would shadow a built-in transform"
            );
            return false;
        }
        self.factories.insert(name.to_string(), factory);
        tracing::debug!("Registered transform: {}", name);
        true
    }

    fn register_builtin(&mut self, name: &str, factory: TransformFactory) {
        self.factories.insert(name.to_string(), factory);
        if PROTECTED_TRANSFORM_NAMES.contains(&name) {
            self.builtin_names.insert(name.to_string());
        }
        tracing::debug!("Registered built-in transform: {}", name);
    }

    /// Check if a transform exists.
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all transform names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered transforms.
    pub fn count(&self) -> usize {
        self.factories.len()
    }

    /// Construct a configured transform by name.
    pub fn build(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<Box<dyn RowTransform>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTransform {
                name: name.to_string(),
            })?;
        factory(args)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}
