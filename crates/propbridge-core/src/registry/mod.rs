//! Plugin-based data source registry
//!
//! The registry maps a `type` discriminator (`rest_api`, `database`,
//! `csv_file`, `mls`, `crm`) to the factory that builds that kind of source.
//! Adapter crates register themselves; nothing here knows a concrete adapter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use propbridge_core::{SourceConfig, SourceRegistry};
//!
//! let mut registry = SourceRegistry::new();
//! propbridge_csv::register(&mut registry);
//!
//! let source = registry.create_data_source(&SourceConfig::csv_file("listings.csv"))?;
//! ```
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the propbridge-csv crate
//! pub fn register(registry: &mut SourceRegistry) {
//!     registry.register("csv_file", Box::new(CsvFileFactory));
//! }
//! ```

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::traits::{DataSource, DataSourceFactory};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Factory registry for data source creation
///
/// Owned by whoever builds sources; register everything up front, then
/// share it read-only.
#[derive(Default)]
pub struct SourceRegistry {
    factories: HashMap<String, Box<dyn DataSourceFactory>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source factory
    ///
    /// # Parameters
    ///
    /// - `name`: source type name (e.g., "rest_api", "csv_file")
    /// - `factory`: factory for creating source instances
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn DataSourceFactory>) {
        let name = name.into();
        tracing::debug!("Registering data source factory: {}", name);
        self.factories.insert(name, factory);
    }

    /// Create a data source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DataSource>)`: created, not yet connected
    /// - `Err(Error)`: the type is not registered or the factory rejected the config
    pub fn create_data_source(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        let source_type = config.type_name();
        let factory = self
            .factories
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown data source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a data source from a `type`-discriminated mapping
    ///
    /// A missing or unknown `type` and a missing required field are all
    /// configuration errors.
    pub fn create_from_map(&self, values: Map<String, Value>) -> Result<Box<dyn DataSource>> {
        let config = SourceConfig::from_map(values)?;
        self.create_data_source(&config)
    }

    /// List all registered source types
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a source type is registered
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
