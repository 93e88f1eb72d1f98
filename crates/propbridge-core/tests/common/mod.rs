//! Test doubles and common utilities for manager contract tests
//!
//! Provides an in-memory data source that records how it is driven, plus
//! a factory that builds such sources for every source kind.

#![allow(dead_code)]

use async_trait::async_trait;
use propbridge_core::error::{Error, Result};
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, FetchOutcome, PushOutcome, Query, SourceConfig,
    SourceKind, SourceRegistry, Table,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Call counters shared between a scripted source and the test
#[derive(Clone, Default)]
pub struct Counters {
    pub connect: Arc<AtomicUsize>,
    pub disconnect: Arc<AtomicUsize>,
    pub fetch: Arc<AtomicUsize>,
    pub push: Arc<AtomicUsize>,
    /// Every query the source received
    pub queries: Arc<Mutex<Vec<Query>>>,
    /// Every table the source accepted
    pub pushed: Arc<Mutex<Vec<Table>>>,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connect.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.push.load(Ordering::SeqCst)
    }
}

/// In-memory data source returning a fixed table
pub struct ScriptedSource {
    kind: SourceKind,
    config: Configuration,
    connected: bool,
    rows: Table,
    counters: Counters,
}

impl ScriptedSource {
    pub fn new(rows: Table) -> Self {
        Self {
            kind: SourceKind::CsvFile,
            config: Configuration::new(),
            connected: false,
            rows,
            counters: Counters::default(),
        }
    }

    /// Create a source that shares counters with the test
    pub fn sharing_counters_with(rows: Table, counters: &Counters) -> Self {
        Self {
            counters: counters.clone(),
            ..Self::new(rows)
        }
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn config(&self) -> &Configuration {
        &self.config
    }

    fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> bool {
        self.counters.connect.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        true
    }

    async fn disconnect(&mut self) {
        self.counters.disconnect.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        self.counters.fetch.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            self.connect().await;
        }
        let filtered = match &query {
            Query::Params(conditions) => self.rows.filter(conditions),
            _ => self.rows.clone(),
        };
        self.counters.queries.lock().unwrap().push(query);
        FetchOutcome::ok(filtered)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        self.counters.push.fetch_add(1, Ordering::SeqCst);
        if data.is_empty() {
            return PushOutcome::failed(&Error::unsupported("empty payload"));
        }
        self.counters.pushed.lock().unwrap().push(data.clone());
        PushOutcome::ok()
    }
}

/// Factory building [`ScriptedSource`]s after checking required fields
pub struct ScriptedFactory {
    pub rows: Table,
    pub counters: Counters,
}

impl DataSourceFactory for ScriptedFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        let kind = config.kind();
        let bag = config.clone().into_configuration();
        if !bag.validate() {
            return Err(Error::config(format!("Invalid {} configuration", kind)));
        }
        let mut source = ScriptedSource::sharing_counters_with(self.rows.clone(), &self.counters);
        source.kind = kind;
        source.config = bag;
        Ok(Box::new(source))
    }
}

/// Registry with a scripted factory under every source type
pub fn scripted_registry(rows: Table, counters: &Counters) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for kind in SourceKind::ALL {
        registry.register(
            kind.type_name(),
            Box::new(ScriptedFactory {
                rows: rows.clone(),
                counters: counters.clone(),
            }),
        );
    }
    registry
}

/// A small listings table
pub fn listings() -> Table {
    Table::from_json_value(json!([
        { "id": 1, "city": "Austin", "price": 250000 },
        { "id": 2, "city": "Dallas", "price": 410000 },
        { "id": 3, "city": "Austin", "price": 515000 }
    ]))
    .unwrap()
}

/// Turn a JSON object literal into a map
pub fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
