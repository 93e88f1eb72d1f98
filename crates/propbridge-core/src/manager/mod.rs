//! Integration manager
//!
//! A name-keyed store of live data sources with a default pointer. The
//! manager is an ordinary value: construct one per process or request
//! context, pass it where it is needed and call
//! [`close_all_connections`](IntegrationManager::close_all_connections) when
//! done.
//!
//! Setup is fail-fast, I/O is fail-soft: [`add`](IntegrationManager::add),
//! [`get`](IntegrationManager::get) and [`remove`](IntegrationManager::remove)
//! return errors, while [`fetch`](IntegrationManager::fetch) and
//! [`push`](IntegrationManager::push) fold every failure (including an
//! unknown name) into their outcome.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::registry::SourceRegistry;
use crate::table::Table;
use crate::traits::{DataSource, FetchOutcome, PushOutcome, Query};

/// Registry of named data source instances
pub struct IntegrationManager {
    registry: SourceRegistry,
    sources: BTreeMap<String, Box<dyn DataSource>>,
    default: Option<String>,
}

impl IntegrationManager {
    /// Create an empty manager building sources through `registry`
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            sources: BTreeMap::new(),
            default: None,
        }
    }

    /// The factory registry sources are built with
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Build a source from `config` and store it under `name`
    ///
    /// The source becomes the default when `make_default` is set or when no
    /// default exists yet, so the first source added is always the default.
    /// An existing source with the same name is replaced.
    ///
    /// # Errors
    ///
    /// A configuration error when the source cannot be built.
    pub fn add(&mut self, name: &str, config: SourceConfig, make_default: bool) -> Result<()> {
        let source = self.registry.create_data_source(&config).map_err(|e| {
            tracing::error!("Failed to add data source {}: {}", name, e);
            Error::config(format!("Failed to add data source {}: {}", name, e))
        })?;

        self.insert(name, source, make_default);
        Ok(())
    }

    /// Same as [`add`](Self::add) for a `type`-discriminated mapping
    pub fn add_from_map(
        &mut self,
        name: &str,
        values: Map<String, Value>,
        make_default: bool,
    ) -> Result<()> {
        let config = SourceConfig::from_map(values).map_err(|e| {
            tracing::error!("Failed to add data source {}: {}", name, e);
            Error::config(format!("Failed to add data source {}: {}", name, e))
        })?;
        self.add(name, config, make_default)
    }

    /// Store an already-built source under `name`
    pub fn insert(&mut self, name: &str, source: Box<dyn DataSource>, make_default: bool) {
        let kind = source.kind();
        self.sources.insert(name.to_string(), source);

        if make_default || self.default.is_none() {
            self.default = Some(name.to_string());
        }

        tracing::info!("Added data source: {} ({})", name, kind);
    }

    /// Look up a source; `None` resolves to the default
    pub fn get(&self, name: Option<&str>) -> Result<&dyn DataSource> {
        let name = self.resolve(name)?;
        match self.sources.get(&name) {
            Some(source) => Ok(source.as_ref()),
            None => Err(Error::not_found(format!("Data source '{}' not found", name))),
        }
    }

    /// Mutable lookup; `None` resolves to the default
    pub fn get_mut(&mut self, name: Option<&str>) -> Result<&mut dyn DataSource> {
        let name = self.resolve(name)?;
        match self.sources.get_mut(&name) {
            Some(source) => Ok(source.as_mut()),
            None => Err(Error::not_found(format!("Data source '{}' not found", name))),
        }
    }

    /// Disconnect and drop the source stored under `name`
    ///
    /// When it was the default, the first remaining name (in sorted order)
    /// becomes the default, or there is none left.
    pub async fn remove(&mut self, name: &str) -> Result<()> {
        let mut source = self
            .sources
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("Data source '{}' not found", name)))?;

        source.disconnect().await;

        if self.default.as_deref() == Some(name) {
            self.default = self.sources.keys().next().cloned();
        }

        tracing::info!("Removed data source: {}", name);
        Ok(())
    }

    /// Fetch through the named (or default) source
    ///
    /// Never fails: lookup errors yield an empty outcome with a diagnostic.
    pub async fn fetch(&mut self, name: Option<&str>, query: Query) -> FetchOutcome {
        match self.get_mut(name) {
            Ok(source) => source.fetch(query).await,
            Err(e) => {
                tracing::error!("Error fetching data: {}", e);
                FetchOutcome::failed(&e)
            }
        }
    }

    /// Push through the named (or default) source
    ///
    /// Never fails: lookup errors yield an unsuccessful outcome.
    pub async fn push(&mut self, data: &Table, name: Option<&str>) -> PushOutcome {
        match self.get_mut(name) {
            Ok(source) => source.push(data).await,
            Err(e) => {
                tracing::error!("Error pushing data: {}", e);
                PushOutcome::failed(&e)
            }
        }
    }

    /// Disconnect every source; the sources stay registered
    pub async fn close_all_connections(&mut self) {
        for (name, source) in self.sources.iter_mut() {
            if source.is_connected() {
                tracing::debug!("Disconnecting data source: {}", name);
            }
            source.disconnect().await;
        }
        tracing::info!("Closed all data source connections");
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Name of the default source, if any
    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn resolve(&self, name: Option<&str>) -> Result<String> {
        match name {
            Some(name) if self.sources.contains_key(name) => Ok(name.to_string()),
            Some(name) => Err(Error::not_found(format!("Data source '{}' not found", name))),
            None => self
                .default
                .clone()
                .ok_or_else(|| Error::not_found("No default data source configured")),
        }
    }
}

impl Default for IntegrationManager {
    fn default() -> Self {
        Self::new(SourceRegistry::new())
    }
}

impl std::fmt::Debug for IntegrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationManager")
            .field("sources", &self.names())
            .field("default", &self.default)
            .finish()
    }
}
