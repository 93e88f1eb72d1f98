// # propbridge-core
//
// Core library for reading from and writing to the external systems a
// real-estate application depends on.
//
// ## Architecture Overview
//
// - **Configuration / SourceConfig**: parameter bag and typed per-kind configuration
// - **Table**: the tabular payload every fetch returns and every push accepts
// - **DataSource**: trait for connect/disconnect/fetch/push against one system
// - **SourceRegistry**: plugin-based registry of data source factories
// - **IntegrationManager**: named, live data sources with a default
//
// ## Design Principles
//
// 1. **Plugin-Based**: adapters register factories, no hard-coded dispatch
// 2. **Fail Fast at Setup**: construction and registration return errors
// 3. **Fail Soft at I/O**: fetch/push return outcomes carrying a diagnostic

pub mod config;
pub mod error;
pub mod fs;
pub mod manager;
pub mod registry;
pub mod table;
pub mod traits;

// Re-export core types for convenience
pub use config::{Configuration, SourceConfig, SourceKind};
pub use error::{Error, Result};
pub use manager::IntegrationManager;
pub use registry::SourceRegistry;
pub use table::{Record, Table, value_text};
pub use traits::{
    DataSource, DataSourceFactory, Diagnostic, DiagnosticKind, FetchOutcome, PushOutcome, Query,
};
