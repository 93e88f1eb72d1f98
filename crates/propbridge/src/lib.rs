// # propbridge
//
// Batteries-included entry point: every built-in data source registered,
// the convenience constructors callers use to set up integrations, and the
// persisted integrations file.
//
// ## Usage
//
// ```rust,no_run
// use propbridge::helpers::{FileIntegration, create_file_integration};
//
// #[tokio::main]
// async fn main() {
//     let mut manager = propbridge::manager();
//     let params = FileIntegration::new("listings.csv");
//     if create_file_integration(&mut manager, "listings", params, true) {
//         let outcome = manager.fetch(None, Default::default()).await;
//         println!("{} rows", outcome.table.len());
//     }
//     manager.close_all_connections().await;
// }
// ```
//
// ## Built-in Sources
//
// | Type | Crate |
// |---|---|
// | `rest_api` | `propbridge-rest` |
// | `database` | `propbridge-sql` |
// | `csv_file` | `propbridge-csv` |
// | `mls` | `propbridge-mls` |
// | `crm` | `propbridge-crm` |

pub mod helpers;
pub mod settings;

pub use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Diagnostic, DiagnosticKind, Error,
    FetchOutcome, IntegrationManager, PushOutcome, Query, Record, Result, SourceConfig,
    SourceKind, SourceRegistry, Table,
};
pub use propbridge_csv::WriteMode;

/// Registry with every built-in data source registered
pub fn builtin_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    propbridge_rest::register(&mut registry);
    propbridge_sql::register(&mut registry);
    propbridge_csv::register(&mut registry);
    propbridge_mls::register(&mut registry);
    propbridge_crm::register(&mut registry);

    tracing::debug!("Registered data sources: {}", registry.list().join(", "));
    registry
}

/// Empty integration manager over the built-in registry
pub fn manager() -> IntegrationManager {
    IntegrationManager::new(builtin_registry())
}

/// Build a standalone data source from its typed configuration
///
/// # Errors
///
/// A configuration error when a required field is missing.
pub fn create_data_source(config: &SourceConfig) -> Result<Box<dyn DataSource>> {
    builtin_registry().create_data_source(config)
}

/// Build a standalone data source from a `type`-discriminated mapping
///
/// # Errors
///
/// A configuration error for a missing or unknown `type`, or a missing
/// required field.
pub fn create_data_source_from_map(
    values: serde_json::Map<String, serde_json::Value>,
) -> Result<Box<dyn DataSource>> {
    builtin_registry().create_from_map(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registry_lists_every_kind() {
        let registry = builtin_registry();
        for kind in SourceKind::ALL {
            assert!(registry.has(kind.type_name()), "{} missing", kind);
        }
    }

    #[test]
    fn test_create_data_source_dispatches_on_type() {
        let source = create_data_source(&SourceConfig::csv_file("x.csv")).unwrap();
        assert_eq!(source.kind(), SourceKind::CsvFile);

        let values = match json!({
            "type": "crm",
            "base_url": "https://crm.test",
            "auth_type": "oauth2",
            "crm_provider": "zoho"
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let source = create_data_source_from_map(values).unwrap();
        assert_eq!(source.kind(), SourceKind::Crm);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let values = match json!({ "type": "ftp", "host": "h" }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(matches!(
            create_data_source_from_map(values),
            Err(Error::Config(_))
        ));
    }
}
