//! Persisted integrations file
//!
//! A JSON object keyed by integration name, optionally nested under
//! `data_sources`:
//!
//! ```json
//! {
//!   "listings": {
//!     "type": "mls",
//!     "config": { "mls_provider": "rets", "base_url": "https://mls.example", "api_key": "..." },
//!     "default": true
//!   },
//!   "exports": { "type": "file", "config": { "file_path": "exports/leads.csv" } }
//! }
//! ```
//!
//! An entry without a `config` object is read flat: every key other than
//! `type` and `default` is configuration. Entries are loaded in file order
//! through the matching convenience constructor, so provider defaults apply
//! exactly as they do for programmatic setup.

use propbridge_core::{Error, IntegrationManager, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::helpers::{
    create_api_integration, create_crm_integration, create_database_integration,
    create_file_integration, create_mls_integration,
};

/// Default integrations file name
pub const DEFAULT_INTEGRATIONS_FILE: &str = "integrations.json";

/// One stored integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEntry {
    /// `api`/`rest_api`, `database`, `file`/`csv_file`, `mls` or `crm`
    #[serde(rename = "type")]
    pub kind: String,

    /// Parameters for the matching `create_*_integration` function
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Whether the integration becomes the default once loaded
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl IntegrationEntry {
    /// Entry of `kind` with `config`
    pub fn new(kind: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            config,
            default: false,
        }
    }

    /// Mark as the default integration
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    fn from_value(name: &str, value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::config(format!(
                "Integration {} must be a JSON object",
                name
            )));
        };

        if matches!(object.get("config"), Some(Value::Object(_))) {
            return serde_json::from_value(Value::Object(object))
                .map_err(|e| Error::config(format!("Invalid integration {}: {}", name, e)));
        }

        let kind = match object.shift_remove("type") {
            Some(Value::String(kind)) => kind,
            _ => {
                return Err(Error::config(format!(
                    "Integration {} has no 'type'",
                    name
                )));
            }
        };
        let default = matches!(object.shift_remove("default"), Some(Value::Bool(true)));

        Ok(Self {
            kind,
            config: object,
            default,
        })
    }
}

/// Contents of an integrations file, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationsFile {
    entries: Vec<(String, IntegrationEntry)>,
}

impl IntegrationsFile {
    /// Empty file
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `name`
    pub fn insert(&mut self, name: impl Into<String>, entry: IntegrationEntry) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = entry,
            None => self.entries.push((name, entry)),
        }
    }

    /// Entries in file order
    pub fn entries(&self) -> &[(String, IntegrationEntry)] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the file has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse decoded JSON, unwrapping a `data_sources` object when present
    ///
    /// # Errors
    ///
    /// A configuration error when the document or an entry has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(Error::config("Integrations file must contain a JSON object"));
        };

        let sources = match root.shift_remove("data_sources") {
            Some(Value::Object(sources)) => sources,
            Some(_) => return Err(Error::config("'data_sources' must be a JSON object")),
            None => root,
        };

        let mut file = Self::new();
        for (name, value) in sources {
            let entry = IntegrationEntry::from_value(&name, value)?;
            file.insert(name, entry);
        }
        Ok(file)
    }

    /// Nested JSON form, keyed by name
    pub fn to_value(&self) -> Result<Value> {
        let mut root = Map::new();
        for (name, entry) in &self.entries {
            root.insert(name.clone(), serde_json::to_value(entry)?);
        }
        Ok(Value::Object(root))
    }
}

/// Read and parse an integrations file
///
/// # Errors
///
/// - not found when the file does not exist
/// - configuration error when it is not valid JSON of the expected shape
pub async fn read_integrations_file(path: &Path) -> Result<IntegrationsFile> {
    if !path.exists() {
        return Err(Error::not_found(format!(
            "Integration configuration file not found: {}",
            path.display()
        )));
    }

    let text = tokio::fs::read_to_string(path).await?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        Error::config(format!(
            "Failed to parse integrations file {}: {}",
            path.display(),
            e
        ))
    })?;
    IntegrationsFile::from_value(value)
}

/// Write `file` as pretty-printed JSON, replacing `path` atomically
pub async fn write_integrations_file(path: &Path, file: &IntegrationsFile) -> Result<()> {
    let mut text = serde_json::to_string_pretty(&file.to_value()?)?;
    text.push('\n');
    propbridge_core::fs::write_atomic(path, text.as_bytes()).await?;

    tracing::info!("Saved {} integrations to {}", file.len(), path.display());
    Ok(())
}

/// Add one entry to `manager` through its convenience constructor
///
/// Returns whether the integration was created.
pub fn load_entry(manager: &mut IntegrationManager, name: &str, entry: &IntegrationEntry) -> bool {
    let config = Value::Object(entry.config.clone());
    let default = entry.default;

    let created = match entry.kind.as_str() {
        "api" | "rest_api" => serde_json::from_value(config)
            .map(|params| create_api_integration(manager, name, params, default)),
        "database" => serde_json::from_value(config)
            .map(|params| create_database_integration(manager, name, params, default)),
        "file" | "csv_file" => serde_json::from_value(config)
            .map(|params| create_file_integration(manager, name, params, default)),
        "mls" => serde_json::from_value(config)
            .map(|params| create_mls_integration(manager, name, params, default)),
        "crm" => serde_json::from_value(config)
            .map(|params| create_crm_integration(manager, name, params, default)),
        other => {
            tracing::error!("Unknown integration type {} for {}", other, name);
            return false;
        }
    };

    created.unwrap_or_else(|e| {
        tracing::error!("Invalid configuration for integration {}: {}", name, e);
        false
    })
}

/// Load every integration stored at `path` into `manager`
///
/// Returns the names that were created. A missing file loads nothing; an
/// entry that cannot be created is logged and skipped.
///
/// # Errors
///
/// A configuration error when the file exists but cannot be parsed.
pub async fn load_integrations(
    manager: &mut IntegrationManager,
    path: &Path,
) -> Result<Vec<String>> {
    let file = match read_integrations_file(path).await {
        Ok(file) => file,
        Err(Error::NotFound(msg)) => {
            tracing::warn!("{}", msg);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut loaded = Vec::new();
    for (name, entry) in file.entries() {
        if load_entry(manager, name, entry) {
            loaded.push(name.clone());
        }
    }

    tracing::info!(
        "Loaded {} of {} integrations from {}",
        loaded.len(),
        file.len(),
        path.display()
    );
    Ok(loaded)
}
