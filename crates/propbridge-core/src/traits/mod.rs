//! Core traits for propbridge
//!
//! - [`DataSource`]: connect/disconnect/fetch/push against one external system
//! - [`DataSourceFactory`]: build a source from a [`SourceConfig`](crate::config::SourceConfig)

pub mod data_source;

pub use data_source::{
    DataSource, DataSourceFactory, Diagnostic, DiagnosticKind, FetchOutcome, PushOutcome, Query,
};
