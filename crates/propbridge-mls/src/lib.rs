// # MLS Data Source
//
// Property searches against MLS listing services. A provider-neutral query
//
// ```text
// { city, state, min_price, max_price, min_bedrooms, min_bathrooms, property_type, limit }
// ```
//
// is rewritten for the configured `mls_provider` and sent through an
// embedded [`RestApiSource`]:
//
// - `rets`: `SearchType` / `Class` / `Query` / `Limit` envelope around a
//   comma-joined filter string
// - `spark`: flat renamed keys plus `includetypes=A` (active listings)
// - `bridge`: JSON-encoded `filter` parameter, `access_token`, `offset`, `limit`
// - anything else: the query is sent unchanged
//
// Required configuration: `base_url`, `auth_type`, `mls_provider`. Everything
// else is as for the REST source.

use async_trait::async_trait;
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Error, FetchOutcome, PushOutcome, Query, Result,
    SourceConfig, SourceKind, SourceRegistry, Table, value_text,
};
use propbridge_rest::RestApiSource;
use serde_json::{Map, Value};
use std::fmt;

/// Page size used when the query carries no `limit`
const DEFAULT_LIMIT: u64 = 100;

/// Known MLS providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlsProvider {
    /// Real Estate Transaction Standard servers
    Rets,
    /// Spark API
    Spark,
    /// Bridge Interactive API
    Bridge,
    /// Unknown provider: queries pass through untranslated
    Other(String),
}

impl From<&str> for MlsProvider {
    fn from(name: &str) -> Self {
        match name {
            "rets" => MlsProvider::Rets,
            "spark" => MlsProvider::Spark,
            "bridge" => MlsProvider::Bridge,
            other => MlsProvider::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MlsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlsProvider::Rets => f.write_str("rets"),
            MlsProvider::Spark => f.write_str("spark"),
            MlsProvider::Bridge => f.write_str("bridge"),
            MlsProvider::Other(name) => f.write_str(name),
        }
    }
}

/// RETS search envelope
///
/// An empty query translates to an empty parameter set.
pub fn format_rets_query(query: &Map<String, Value>) -> Map<String, Value> {
    let mut params = Map::new();
    if query.is_empty() {
        return params;
    }

    params.insert("SearchType".to_string(), Value::from("Property"));
    params.insert(
        "Class".to_string(),
        query
            .get("property_type")
            .cloned()
            .unwrap_or_else(|| Value::from("ALL")),
    );
    params.insert("Query".to_string(), Value::from(build_rets_filter(query)));
    params.insert("Limit".to_string(), limit_or_default(query));
    params
}

/// RETS filter string: recognised keys in query order, joined with `,`
pub fn build_rets_filter(query: &Map<String, Value>) -> String {
    let mut filters = Vec::new();
    for (key, value) in query {
        let value = value_text(value);
        let clause = match key.as_str() {
            "city" => format!("City = {}", value),
            "state" => format!("StateOrProvince = {}", value),
            "min_price" => format!("ListPrice >= {}", value),
            "max_price" => format!("ListPrice <= {}", value),
            "min_bedrooms" => format!("Bedrooms >= {}", value),
            "min_bathrooms" => format!("Bathrooms >= {}", value),
            "property_type" => format!("PropertyType = {}", value),
            _ => continue,
        };
        filters.push(clause);
    }
    filters.join(",")
}

/// Spark API parameters
pub fn format_spark_query(query: &Map<String, Value>) -> Map<String, Value> {
    let mut params = Map::new();
    if query.is_empty() {
        return params;
    }

    params.insert("includetypes".to_string(), Value::from("A"));
    for (from, to) in [
        ("city", "city"),
        ("state", "state"),
        ("min_price", "minimalprice"),
        ("max_price", "maximalprice"),
        ("min_bedrooms", "minimalbeds"),
        ("min_bathrooms", "minimalbaths"),
        ("property_type", "propertytype"),
    ] {
        if let Some(value) = query.get(from) {
            params.insert(to.to_string(), value.clone());
        }
    }
    params
}

/// Bridge API parameters
///
/// `access_token` is taken from the source configuration; the filter object
/// is JSON-encoded into a single `filter` parameter when non-empty.
pub fn format_bridge_query(
    query: &Map<String, Value>,
    access_token: Option<&Value>,
) -> Map<String, Value> {
    let mut params = Map::new();
    if query.is_empty() {
        return params;
    }

    params.insert(
        "access_token".to_string(),
        access_token.cloned().unwrap_or(Value::Null),
    );
    params.insert("offset".to_string(), Value::from(0));
    params.insert("limit".to_string(), limit_or_default(query));

    let mut filter = Map::new();
    for (from, to) in [
        ("city", "City"),
        ("state", "StateOrProvince"),
        ("min_price", "ListPrice.min"),
        ("max_price", "ListPrice.max"),
        ("min_bedrooms", "BedroomsTotal.min"),
        ("min_bathrooms", "BathroomsTotalDecimal.min"),
        ("property_type", "PropertyType"),
    ] {
        if let Some(value) = query.get(from) {
            filter.insert(to.to_string(), value.clone());
        }
    }

    if !filter.is_empty() {
        params.insert(
            "filter".to_string(),
            Value::String(Value::Object(filter).to_string()),
        );
    }
    params
}

fn limit_or_default(query: &Map<String, Value>) -> Value {
    query
        .get("limit")
        .cloned()
        .unwrap_or_else(|| Value::from(DEFAULT_LIMIT))
}

/// MLS data source
pub struct MlsSource {
    rest: RestApiSource,
    provider: MlsProvider,
}

impl fmt::Debug for MlsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlsSource")
            .field("provider", &self.provider)
            .field("rest", &self.rest)
            .finish()
    }
}

impl MlsSource {
    /// Create an MLS source over `config`
    ///
    /// # Errors
    ///
    /// A configuration error when `base_url`, `auth_type` or `mls_provider`
    /// is absent.
    pub fn new(mut config: Configuration) -> Result<Self> {
        config.require(SourceKind::Mls.required_fields().iter().copied());
        config.ensure_valid(SourceKind::Mls.type_name())?;

        let provider = MlsProvider::from(
            config
                .get_str("mls_provider")
                .unwrap_or_default()
                .as_str(),
        );

        Ok(Self {
            rest: RestApiSource::new(config)?,
            provider,
        })
    }

    /// The provider queries are translated for
    pub fn provider(&self) -> &MlsProvider {
        &self.provider
    }

    /// Translate a provider-neutral query into this provider's parameters
    pub fn translate(&self, query: Map<String, Value>) -> Map<String, Value> {
        match &self.provider {
            MlsProvider::Rets => format_rets_query(&query),
            MlsProvider::Spark => format_spark_query(&query),
            MlsProvider::Bridge => {
                format_bridge_query(&query, self.rest.config().get("access_token"))
            }
            MlsProvider::Other(_) => query,
        }
    }
}

#[async_trait]
impl DataSource for MlsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Mls
    }

    fn config(&self) -> &Configuration {
        self.rest.config()
    }

    fn config_mut(&mut self) -> &mut Configuration {
        self.rest.config_mut()
    }

    fn is_connected(&self) -> bool {
        self.rest.is_connected()
    }

    async fn connect(&mut self) -> bool {
        self.rest.connect().await
    }

    async fn disconnect(&mut self) {
        self.rest.disconnect().await;
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        let result = match query {
            Query::Sql(_) => Err(Error::unsupported("MLS sources take property search queries")),
            other => {
                let params = self.translate(other.into_params());
                tracing::debug!("Translated {} query: {:?}", self.provider, params);
                self.rest.fetch_params(&params).await
            }
        };
        FetchOutcome::from_result("Error fetching data from MLS", result)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        self.rest.push(data).await
    }
}

/// Factory for creating MLS sources
pub struct MlsFactory;

impl DataSourceFactory for MlsFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        match config {
            SourceConfig::Mls { .. } => Ok(Box::new(MlsSource::new(
                config.clone().into_configuration(),
            )?)),
            other => Err(Error::config(format!(
                "MLS factory cannot build a {} source",
                other.type_name()
            ))),
        }
    }
}

/// Register the MLS source with a registry
pub fn register(registry: &mut SourceRegistry) {
    registry.register(SourceKind::Mls.type_name(), Box::new(MlsFactory));
}
