// # Data Source Trait
//
// Defines the uniform connect/disconnect/fetch/push contract every external
// system is reached through.
//
// ## Implementations
//
// - REST APIs: `propbridge-rest` crate
// - MLS listing services: `propbridge-mls` crate
// - CRM platforms: `propbridge-crm` crate
// - Relational databases: `propbridge-sql` crate
// - CSV files: `propbridge-csv` crate
//
// ## Usage
//
// ```rust,ignore
// use propbridge_core::{DataSource, Query};
//
// async fn listings(source: &mut dyn DataSource) {
//     let outcome = source.fetch(Query::from("SELECT * FROM listings")).await;
//     if let Some(diagnostic) = &outcome.diagnostic {
//         eprintln!("fetch failed: {}", diagnostic);
//     }
//     println!("{} rows", outcome.table.len());
// }
// ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::config::{Configuration, SourceConfig, SourceKind};
use crate::error::{Error, Result};
use crate::table::Table;

/// What to fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Query {
    /// Adapter default (whole file, configured table, configured endpoint)
    #[default]
    None,
    /// Column/parameter mapping
    Params(Map<String, Value>),
    /// Raw SQL text (database sources)
    Sql(String),
}

impl Query {
    /// Whether the query carries nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Query::None => true,
            Query::Params(params) => params.is_empty(),
            Query::Sql(sql) => sql.trim().is_empty(),
        }
    }

    /// The parameter mapping, empty for `None` and SQL queries
    pub fn into_params(self) -> Map<String, Value> {
        match self {
            Query::Params(params) => params,
            Query::None | Query::Sql(_) => Map::new(),
        }
    }
}

impl From<Map<String, Value>> for Query {
    fn from(params: Map<String, Value>) -> Self {
        Query::Params(params)
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::Sql(sql.to_string())
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::Sql(sql)
    }
}

/// Coarse classification of a fetch/push failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Config,
    NotFound,
    Connection,
    Http,
    /// Remote answered with this error status
    Status(u16),
    Decode,
    Unsupported,
    Database,
    Csv,
    Io,
    Other,
}

/// Why a fetch came back empty or a push failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Failure class
    pub kind: DiagnosticKind,
    /// Rendered error
    pub message: String,
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Config(_) => DiagnosticKind::Config,
            Error::NotFound(_) => DiagnosticKind::NotFound,
            Error::Connection(_) => DiagnosticKind::Connection,
            Error::Http(_) => DiagnosticKind::Http,
            Error::Status { status, .. } => DiagnosticKind::Status(*status),
            Error::Decode(_) | Error::Json(_) => DiagnosticKind::Decode,
            Error::Unsupported(_) => DiagnosticKind::Unsupported,
            Error::Database(_) => DiagnosticKind::Database,
            Error::Csv(_) => DiagnosticKind::Csv,
            Error::Io(_) => DiagnosticKind::Io,
            Error::Other(_) => DiagnosticKind::Other,
        };
        Diagnostic {
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a fetch: always a table, possibly with the reason it is empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Fetched rows (empty on failure)
    pub table: Table,
    /// Set when the fetch failed
    pub diagnostic: Option<Diagnostic>,
}

impl FetchOutcome {
    /// Successful fetch
    pub fn ok(table: Table) -> Self {
        Self {
            table,
            diagnostic: None,
        }
    }

    /// Failed fetch: empty table carrying the cause
    pub fn failed(err: &Error) -> Self {
        Self {
            table: Table::new(),
            diagnostic: Some(Diagnostic::from(err)),
        }
    }

    /// Collapse an adapter result, logging the failure under `context`
    pub fn from_result(context: &str, result: Result<Table>) -> Self {
        match result {
            Ok(table) => Self::ok(table),
            Err(err) => {
                log_failure(context, &err);
                Self::failed(&err)
            }
        }
    }

    /// Whether the fetch failed
    pub fn is_failure(&self) -> bool {
        self.diagnostic.is_some()
    }

    /// Drop the diagnostic
    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Result of a push: a success flag, with the cause on failure
#[derive(Debug, Clone, PartialEq)]
pub struct PushOutcome {
    /// Whether the data was accepted
    pub success: bool,
    /// Set when the push failed
    pub diagnostic: Option<Diagnostic>,
}

impl PushOutcome {
    /// Successful push
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: None,
        }
    }

    /// Failed push carrying the cause
    pub fn failed(err: &Error) -> Self {
        Self {
            success: false,
            diagnostic: Some(Diagnostic::from(err)),
        }
    }

    /// Collapse an adapter result, logging the failure under `context`
    pub fn from_result(context: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(err) => {
                log_failure(context, &err);
                Self::failed(&err)
            }
        }
    }
}

fn log_failure(context: &str, err: &Error) {
    if err.is_soft() {
        tracing::warn!("{}: {}", context, err);
    } else {
        tracing::error!("{}: {}", context, err);
    }
}

/// Trait for data source implementations
///
/// One implementing type per external system kind. A source owns its
/// [`Configuration`] exclusively and holds a transient connection handle that
/// exists between `connect()` and `disconnect()`.
///
/// # Failure Contract
///
/// `connect`, `fetch` and `push` never return errors and never panic. Any
/// failure is logged and folded into the return value: `false` for connect,
/// an empty [`FetchOutcome`] with a diagnostic for fetch, an unsuccessful
/// [`PushOutcome`] for push. Only construction (through a
/// [`DataSourceFactory`]) reports errors to the caller.
///
/// # Concurrency
///
/// Operations take `&mut self`: one caller at a time per source. Share a
/// source across tasks by wrapping it in a mutex at the owner.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The kind of system this source talks to
    fn kind(&self) -> SourceKind;

    /// The parameter bag this source reads at I/O time
    fn config(&self) -> &Configuration;

    /// Mutable access to the parameter bag
    ///
    /// Changes apply to subsequent operations; they are not re-validated.
    fn config_mut(&mut self) -> &mut Configuration;

    /// Whether a connection handle is currently held
    fn is_connected(&self) -> bool;

    /// Establish the connection handle
    ///
    /// # Returns
    ///
    /// `true` if the source is usable, `false` otherwise (the cause is logged)
    async fn connect(&mut self) -> bool;

    /// Drop the connection handle. Idempotent.
    async fn disconnect(&mut self);

    /// Read rows
    ///
    /// Connects first when no handle is held.
    ///
    /// # Parameters
    ///
    /// - `query`: adapter-specific query; [`Query::None`] means the adapter default
    async fn fetch(&mut self, query: Query) -> FetchOutcome;

    /// Write rows
    ///
    /// Connects first when no handle is held.
    async fn push(&mut self, data: &Table) -> PushOutcome;
}

/// Helper trait for constructing data sources from configuration
pub trait DataSourceFactory: Send + Sync {
    /// Create a DataSource instance from configuration
    ///
    /// # Errors
    ///
    /// A configuration error when `config` is the wrong kind for this factory
    /// or lacks a required field. No connection is attempted.
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>>;
}
