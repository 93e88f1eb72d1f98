// # CSV File Data Source
//
// Reads and writes a table stored in one CSV file.
//
// ## Configuration
//
// Required: `file_path`.
//
// | Key | Meaning | Default |
// |---|---|---|
// | `file_path` | the CSV file, header row first | |
// | `write_mode` | `append` or `overwrite` when the file already exists | `append` |
//
// There is no handle to hold: `connect` only reports whether the file
// exists. Fetch loads the whole file; a parameter query then keeps the rows
// whose cells equal (or, for a list, are one of) the given values, ignoring
// columns the file does not have.

use async_trait::async_trait;
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Error, FetchOutcome, PushOutcome, Query, Result,
    SourceConfig, SourceKind, SourceRegistry, Table,
};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What a push does to a file that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Existing rows first, pushed rows after
    #[default]
    Append,
    /// Pushed rows replace the file
    Overwrite,
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append" => Ok(WriteMode::Append),
            "overwrite" => Ok(WriteMode::Overwrite),
            other => Err(Error::config(format!("Invalid write mode: {}", other))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => f.write_str("append"),
            WriteMode::Overwrite => f.write_str("overwrite"),
        }
    }
}

/// CSV file data source
#[derive(Debug)]
pub struct CsvFileSource {
    config: Configuration,

    /// Result of the last existence check
    connected: bool,
}

impl CsvFileSource {
    /// Create a CSV source over `config`
    ///
    /// # Errors
    ///
    /// A configuration error when `file_path` is absent.
    pub fn new(mut config: Configuration) -> Result<Self> {
        config.require(SourceKind::CsvFile.required_fields().iter().copied());
        config.ensure_valid(SourceKind::CsvFile.type_name())?;

        Ok(Self {
            config,
            connected: false,
        })
    }

    /// The configured file path
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.config.get_str("file_path").unwrap_or_default())
    }

    /// The configured write mode
    ///
    /// # Errors
    ///
    /// A configuration error for anything but `append` or `overwrite`.
    pub fn write_mode(&self) -> Result<WriteMode> {
        match self.config.get_str("write_mode") {
            Some(mode) => mode.parse(),
            None => Ok(WriteMode::default()),
        }
    }

    /// Load the whole file
    ///
    /// # Errors
    ///
    /// Not found when the file does not exist, otherwise I/O or CSV errors.
    pub async fn read_table(&self) -> Result<Table> {
        let path = self.path();
        if !path.exists() {
            return Err(Error::not_found(format!(
                "CSV file not found: {}",
                path.display()
            )));
        }

        let text = tokio::fs::read_to_string(&path).await?;
        Table::from_csv(&text)
    }

    /// Write `data` to the file according to the write mode
    ///
    /// A missing file is always written fresh; the write mode only applies
    /// once the file exists.
    pub async fn write_table(&self, data: &Table) -> Result<()> {
        let path = self.path();

        let contents = if path.exists() {
            match self.write_mode()? {
                WriteMode::Append => {
                    let existing = self.read_table().await?;
                    tracing::debug!(
                        "Appending {} rows to {} existing rows in {}",
                        data.len(),
                        existing.len(),
                        path.display()
                    );
                    existing.concat(data.clone()).to_csv()?
                }
                WriteMode::Overwrite => data.to_csv()?,
            }
        } else {
            data.to_csv()?
        };

        propbridge_core::fs::write_atomic(&path, contents.as_bytes()).await?;
        tracing::debug!("Wrote {} rows to {}", data.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl DataSource for CsvFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CsvFile
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
        self.connected = self.path().exists();
        if !self.connected {
            tracing::debug!("CSV file {} does not exist yet", self.path().display());
        }
        self.connected
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        let result = match query {
            Query::Sql(_) => Err(Error::unsupported("CSV sources take column filters")),
            Query::None => self.read_table().await,
            Query::Params(conditions) => self
                .read_table()
                .await
                .map(|table| table.filter(&conditions)),
        };
        FetchOutcome::from_result("Error fetching data from CSV file", result)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        let result = self.write_table(data).await;
        PushOutcome::from_result("Error pushing data to CSV file", result)
    }
}

/// Factory for creating CSV file sources
pub struct CsvFileFactory;

impl DataSourceFactory for CsvFileFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        match config {
            SourceConfig::CsvFile { .. } => Ok(Box::new(CsvFileSource::new(
                config.clone().into_configuration(),
            )?)),
            other => Err(Error::config(format!(
                "CSV file factory cannot build a {} source",
                other.type_name()
            ))),
        }
    }
}

/// Register the CSV file source with a registry
pub fn register(registry: &mut SourceRegistry) {
    registry.register(SourceKind::CsvFile.type_name(), Box::new(CsvFileFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_parsing() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("overwrite".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
        assert!(matches!("merge".parse::<WriteMode>(), Err(Error::Config(_))));
        assert_eq!(WriteMode::default().to_string(), "append");
    }

    #[test]
    fn test_default_write_mode() {
        let config = SourceConfig::csv_file("x.csv").into_configuration();
        let source = CsvFileSource::new(config).unwrap();
        assert_eq!(source.write_mode().unwrap(), WriteMode::Append);
        assert_eq!(source.path(), PathBuf::from("x.csv"));
    }

    #[test]
    fn test_factory_rejects_other_kinds() {
        let config = SourceConfig::rest_api("https://api.test", "none");
        assert!(CsvFileFactory.create(&config).is_err());
    }
}
