//! Configuration types for propbridge
//!
//! Two layers live here:
//!
//! - [`Configuration`]: the key/value parameter bag an adapter owns and reads
//!   at I/O time. Callers and adapters mutate it after construction (table
//!   name, endpoint, write mode, ...). Validation is presence-only.
//! - [`SourceConfig`]: a typed, `type`-discriminated description of one data
//!   source. Required fields are constructor parameters; provider-specific
//!   extras (headers, `data_path`, ...) stay untyped.

use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Keys whose values never appear in logs or `Debug` output
const SECRET_KEYS: &[&str] = &[
    "api_key",
    "access_token",
    "password",
    "client_secret",
    "refresh_token",
    "connection_string",
];

/// Mutable parameter bag with declared required fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    values: Map<String, Value>,
    required_fields: Vec<String>,
}

impl Configuration {
    /// Create an empty configuration with no required fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration over `values` that requires `required_fields`
    pub fn with_required<I, S>(values: Map<String, Value>, required_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values,
            required_fields: required_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a configuration from a mapping (no required fields)
    pub fn from_map(values: Map<String, Value>) -> Self {
        let mut config = Self::new();
        for (key, value) in values {
            config.set(key, value);
        }
        config
    }

    /// Load a configuration from a JSON file holding a single object
    ///
    /// I/O failures and malformed content both surface as configuration errors.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!("Error loading configuration from {}: {}", path.display(), e);
            Error::config(format!("Failed to load configuration: {}", e))
        })?;

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(values)) => Ok(Self::from_map(values)),
            Ok(other) => Err(Error::config(format!(
                "Failed to load configuration: expected a JSON object in {}, got {}",
                path.display(),
                json_type_name(&other)
            ))),
            Err(e) => {
                tracing::error!("Error loading configuration from {}: {}", path.display(), e);
                Err(Error::config(format!("Failed to load configuration: {}", e)))
            }
        }
    }

    /// Overwrite or insert a parameter
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a parameter, falling back to `default`
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.values.get(key).unwrap_or(default)
    }

    /// Look up a parameter rendered as text
    ///
    /// Strings are returned verbatim, other scalars are rendered, null and
    /// missing keys yield `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Whether the key is present (a null value counts)
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove a parameter, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Declared required field names
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Required fields absent from the bag
    pub fn missing_fields(&self) -> Vec<&str> {
        self.required_fields
            .iter()
            .filter(|field| !self.values.contains_key(field.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// True iff every required field key is present, regardless of its value
    pub fn validate(&self) -> bool {
        let missing = self.missing_fields();
        for field in &missing {
            tracing::error!("Missing required configuration field: {}", field);
        }
        missing.is_empty()
    }

    /// Declare additional required fields, keeping existing ones
    pub fn require<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.required_fields.contains(&field) {
                self.required_fields.push(field);
            }
        }
    }

    /// Validate, failing with a configuration error naming every missing field
    pub fn ensure_valid(&self, what: &str) -> Result<()> {
        if self.validate() {
            return Ok(());
        }
        Err(Error::config(format!(
            "Invalid {} configuration: missing required field(s): {}",
            what,
            self.missing_fields().join(", ")
        )))
    }

    /// Copy of the mapping with secret values masked, for `Debug` output
    pub fn redacted(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, value)| {
                if SECRET_KEYS.contains(&key.as_str()) {
                    (key.clone(), Value::String("<REDACTED>".to_string()))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Copy of the underlying mapping
    pub fn to_map(&self) -> Map<String, Value> {
        self.values.clone()
    }

    /// Borrow the underlying mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// The five data source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Generic REST API
    RestApi,
    /// Relational database
    Database,
    /// CSV file on disk
    CsvFile,
    /// MLS listing service (REST specialization)
    Mls,
    /// CRM platform (REST specialization)
    Crm,
}

impl SourceKind {
    /// All kinds, in registration order
    pub const ALL: [SourceKind; 5] = [
        SourceKind::RestApi,
        SourceKind::Database,
        SourceKind::CsvFile,
        SourceKind::Mls,
        SourceKind::Crm,
    ];

    /// The `type` discriminator value for this kind
    pub fn type_name(&self) -> &'static str {
        match self {
            SourceKind::RestApi => "rest_api",
            SourceKind::Database => "database",
            SourceKind::CsvFile => "csv_file",
            SourceKind::Mls => "mls",
            SourceKind::Crm => "crm",
        }
    }

    /// Fields every configuration of this kind must carry
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            SourceKind::RestApi => &["base_url", "auth_type"],
            SourceKind::Database => &["connection_string", "driver"],
            SourceKind::CsvFile => &["file_path"],
            SourceKind::Mls => &["base_url", "auth_type", "mls_provider"],
            SourceKind::Crm => &["base_url", "auth_type", "crm_provider"],
        }
    }

    /// Build a configuration bag of this kind and check it
    ///
    /// Fails with a configuration error naming every missing field.
    pub fn configuration(&self, values: Map<String, Value>) -> Result<Configuration> {
        let config = Configuration::with_required(values, self.required_fields().iter().copied());
        config.ensure_valid(self.type_name())?;
        Ok(config)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.type_name() == s)
            .ok_or_else(|| Error::config(format!("Invalid data source type: {}", s)))
    }
}

/// Typed description of one data source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    /// REST API source
    RestApi {
        /// Base URL every endpoint is appended to
        base_url: String,
        /// `api_key`, `oauth2`, `basic` or anything else for no auth
        auth_type: String,
        /// Provider-specific extras
        extra: Map<String, Value>,
    },

    /// Database source
    Database {
        /// Driver-specific connection string
        connection_string: String,
        /// `any`, `sqlite`, `postgres` or `mysql`
        driver: String,
        /// Extras such as `table`
        extra: Map<String, Value>,
    },

    /// CSV file source
    CsvFile {
        /// Path of the CSV file
        file_path: String,
        /// Extras such as `write_mode`
        extra: Map<String, Value>,
    },

    /// MLS listing service
    Mls {
        /// Base URL
        base_url: String,
        /// Auth type, as for REST
        auth_type: String,
        /// `rets`, `spark`, `bridge` or any other name for pass-through
        mls_provider: String,
        /// Provider-specific extras
        extra: Map<String, Value>,
    },

    /// CRM platform
    Crm {
        /// Base URL
        base_url: String,
        /// Auth type, as for REST
        auth_type: String,
        /// `salesforce`, `hubspot`, `zoho` or any other name for the generic mapping
        crm_provider: String,
        /// Provider-specific extras
        extra: Map<String, Value>,
    },
}

impl SourceConfig {
    /// REST API configuration
    pub fn rest_api(base_url: impl Into<String>, auth_type: impl Into<String>) -> Self {
        SourceConfig::RestApi {
            base_url: base_url.into(),
            auth_type: auth_type.into(),
            extra: Map::new(),
        }
    }

    /// Database configuration
    pub fn database(connection_string: impl Into<String>, driver: impl Into<String>) -> Self {
        SourceConfig::Database {
            connection_string: connection_string.into(),
            driver: driver.into(),
            extra: Map::new(),
        }
    }

    /// CSV file configuration
    pub fn csv_file(file_path: impl Into<String>) -> Self {
        SourceConfig::CsvFile {
            file_path: file_path.into(),
            extra: Map::new(),
        }
    }

    /// MLS configuration
    pub fn mls(
        base_url: impl Into<String>,
        auth_type: impl Into<String>,
        mls_provider: impl Into<String>,
    ) -> Self {
        SourceConfig::Mls {
            base_url: base_url.into(),
            auth_type: auth_type.into(),
            mls_provider: mls_provider.into(),
            extra: Map::new(),
        }
    }

    /// CRM configuration
    pub fn crm(
        base_url: impl Into<String>,
        auth_type: impl Into<String>,
        crm_provider: impl Into<String>,
    ) -> Self {
        SourceConfig::Crm {
            base_url: base_url.into(),
            auth_type: auth_type.into(),
            crm_provider: crm_provider.into(),
            extra: Map::new(),
        }
    }

    /// Set a provider-specific extra parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_mut().insert(key.into(), value.into());
        self
    }

    /// The kind of source this configuration describes
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::RestApi { .. } => SourceKind::RestApi,
            SourceConfig::Database { .. } => SourceKind::Database,
            SourceConfig::CsvFile { .. } => SourceKind::CsvFile,
            SourceConfig::Mls { .. } => SourceKind::Mls,
            SourceConfig::Crm { .. } => SourceKind::Crm,
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    /// Provider-specific extras
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            SourceConfig::RestApi { extra, .. }
            | SourceConfig::Database { extra, .. }
            | SourceConfig::CsvFile { extra, .. }
            | SourceConfig::Mls { extra, .. }
            | SourceConfig::Crm { extra, .. } => extra,
        }
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            SourceConfig::RestApi { extra, .. }
            | SourceConfig::Database { extra, .. }
            | SourceConfig::CsvFile { extra, .. }
            | SourceConfig::Mls { extra, .. }
            | SourceConfig::Crm { extra, .. } => extra,
        }
    }

    /// Parse a `type`-discriminated mapping
    ///
    /// # Errors
    ///
    /// - missing or unknown `type`
    /// - any required field of that type absent (presence only: `null` counts)
    pub fn from_map(mut values: Map<String, Value>) -> Result<Self> {
        let type_name = match values.shift_remove("type") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(Error::config(format!(
                    "Invalid data source type: {}",
                    other
                )));
            }
            None => {
                return Err(Error::config(
                    "Invalid data source configuration: missing 'type'",
                ));
            }
        };

        let kind: SourceKind = type_name.parse()?;
        let config = kind.configuration(values)?;
        Ok(Self::from_configuration(kind, config))
    }

    /// Split a validated bag back into typed fields
    fn from_configuration(kind: SourceKind, config: Configuration) -> Self {
        let mut extra = config.to_map();
        let mut take = |field: &str| -> String {
            match extra.shift_remove(field) {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };

        match kind {
            SourceKind::RestApi => {
                let base_url = take("base_url");
                let auth_type = take("auth_type");
                SourceConfig::RestApi {
                    base_url,
                    auth_type,
                    extra,
                }
            }
            SourceKind::Database => {
                let connection_string = take("connection_string");
                let driver = take("driver");
                SourceConfig::Database {
                    connection_string,
                    driver,
                    extra,
                }
            }
            SourceKind::CsvFile => {
                let file_path = take("file_path");
                SourceConfig::CsvFile { file_path, extra }
            }
            SourceKind::Mls => {
                let base_url = take("base_url");
                let auth_type = take("auth_type");
                let mls_provider = take("mls_provider");
                SourceConfig::Mls {
                    base_url,
                    auth_type,
                    mls_provider,
                    extra,
                }
            }
            SourceKind::Crm => {
                let base_url = take("base_url");
                let auth_type = take("auth_type");
                let crm_provider = take("crm_provider");
                SourceConfig::Crm {
                    base_url,
                    auth_type,
                    crm_provider,
                    extra,
                }
            }
        }
    }

    /// Flatten into the `type`-less bag an adapter owns
    pub fn into_configuration(self) -> Configuration {
        let kind = self.kind();
        let (required, extra): (Vec<(&str, String)>, Map<String, Value>) = match self {
            SourceConfig::RestApi {
                base_url,
                auth_type,
                extra,
            } => (vec![("base_url", base_url), ("auth_type", auth_type)], extra),
            SourceConfig::Database {
                connection_string,
                driver,
                extra,
            } => (
                vec![("connection_string", connection_string), ("driver", driver)],
                extra,
            ),
            SourceConfig::CsvFile { file_path, extra } => (vec![("file_path", file_path)], extra),
            SourceConfig::Mls {
                base_url,
                auth_type,
                mls_provider,
                extra,
            } => (
                vec![
                    ("base_url", base_url),
                    ("auth_type", auth_type),
                    ("mls_provider", mls_provider),
                ],
                extra,
            ),
            SourceConfig::Crm {
                base_url,
                auth_type,
                crm_provider,
                extra,
            } => (
                vec![
                    ("base_url", base_url),
                    ("auth_type", auth_type),
                    ("crm_provider", crm_provider),
                ],
                extra,
            ),
        };

        let mut values = Map::new();
        for (key, value) in required {
            values.insert(key.to_string(), Value::String(value));
        }
        for (key, value) in extra {
            values.insert(key, value);
        }

        Configuration::with_required(values, kind.required_fields().iter().copied())
    }

    /// Mapping form including the `type` discriminator
    pub fn to_map(&self) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("type".to_string(), Value::String(self.type_name().to_string()));
        for (key, value) in self.clone().into_configuration().to_map() {
            values.insert(key, value);
        }
        values
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_validate_is_presence_only() {
        let config = Configuration::with_required(
            map(json!({ "base_url": "", "auth_type": null })),
            ["base_url", "auth_type"],
        );
        assert!(config.validate());

        let config = Configuration::with_required(map(json!({ "base_url": "x" })), [
            "base_url",
            "auth_type",
        ]);
        assert!(!config.validate());
        assert_eq!(config.missing_fields(), vec!["auth_type"]);
    }

    #[test]
    fn test_set_get_and_round_trip() {
        let mut config = Configuration::new();
        config.set("table", "listings");
        config.set("limit", 5);

        assert_eq!(config.get("table"), Some(&json!("listings")));
        assert_eq!(config.get("missing"), None);
        assert_eq!(config.get_or("missing", &json!("fallback")), &json!("fallback"));
        assert_eq!(config.get_str("limit"), Some("5".to_string()));

        let restored = Configuration::from_map(config.to_map());
        assert_eq!(restored.to_map(), config.to_map());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        std::fs::write(&path, r#"{"file_path": "listings.csv", "write_mode": "append"}"#).unwrap();

        let config = Configuration::from_json_file(&path).unwrap();
        assert_eq!(config.get_str("file_path").as_deref(), Some("listings.csv"));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Configuration::from_json_file(&path),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            Configuration::from_json_file(dir.path().join("absent.json")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_require_and_redacted() {
        let mut config = Configuration::from_map(map(json!({
            "base_url": "https://api.test",
            "api_key": "secret"
        })));
        config.require(["base_url", "auth_type"]);
        config.require(["base_url"]);

        assert_eq!(config.required_fields().len(), 2);
        match config.ensure_valid("rest_api") {
            Err(Error::Config(msg)) => assert!(msg.contains("auth_type")),
            other => panic!("expected config error, got {:?}", other),
        }

        let shown = config.redacted();
        assert_eq!(shown.get("api_key"), Some(&json!("<REDACTED>")));
        assert_eq!(shown.get("base_url"), Some(&json!("https://api.test")));
    }

    #[test]
    fn test_source_config_from_map() {
        let config = SourceConfig::from_map(map(json!({
            "type": "mls",
            "base_url": "https://mls.test",
            "auth_type": "api_key",
            "mls_provider": "rets",
            "api_key": "k"
        })))
        .unwrap();

        assert_eq!(config.kind(), SourceKind::Mls);
        assert_eq!(config.extra().get("api_key"), Some(&json!("k")));

        let bag = config.into_configuration();
        assert!(bag.validate());
        assert_eq!(bag.get_str("mls_provider").as_deref(), Some("rets"));
    }

    #[test]
    fn test_source_config_type_errors() {
        let missing = SourceConfig::from_map(map(json!({ "file_path": "x.csv" })));
        assert!(matches!(missing, Err(Error::Config(_))));

        let unknown = SourceConfig::from_map(map(json!({ "type": "ftp" })));
        assert!(matches!(unknown, Err(Error::Config(_))));

        let incomplete = SourceConfig::from_map(map(json!({
            "type": "crm",
            "base_url": "https://crm.test",
            "auth_type": "oauth2"
        })));
        match incomplete {
            Err(Error::Config(msg)) => assert!(msg.contains("crm_provider")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_required_field_counts_as_present() {
        let config = SourceConfig::from_map(map(json!({
            "type": "csv_file",
            "file_path": null
        })))
        .unwrap();

        assert_eq!(config, SourceConfig::csv_file(""));
    }

    #[test]
    fn test_to_map_includes_type() {
        let config = SourceConfig::database("sqlite:///tmp/x.db", "sqlite").with("table", "leads");
        let values = config.to_map();

        assert_eq!(values.get("type"), Some(&json!("database")));
        assert_eq!(values.get("table"), Some(&json!("leads")));
        assert_eq!(SourceConfig::from_map(values).unwrap(), config);
    }
}
