// # propbridge - integration fetch tool
//
// Thin integration layer: loads the integrations file, fetches from one
// integration and prints the rows as JSON. Query translation, provider
// handling and I/O all live in the library crates.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `PROPBRIDGE_INTEGRATIONS`: integrations file (default `integrations.json`)
// - `PROPBRIDGE_SOURCE`: integration to fetch from (default integration when unset)
// - `PROPBRIDGE_QUERY`: a JSON object is sent as parameters, any other text as SQL
// - `PROPBRIDGE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// Logs go to stderr, rows to stdout.
//
// ## Example
//
// ```bash
// export PROPBRIDGE_INTEGRATIONS=/etc/propbridge/integrations.json
// export PROPBRIDGE_SOURCE=listings
// export PROPBRIDGE_QUERY='{"city": "Austin", "max_price": 300000}'
//
// propbridge > listings.json
// ```

use anyhow::Result;
use propbridge::Query;
use propbridge::settings::{DEFAULT_INTEGRATIONS_FILE, load_integrations};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Rows fetched and printed
/// - 1: Configuration error (environment or integrations file)
/// - 2: Runtime error (the fetch failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliExitCode {
    /// Rows fetched and printed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<CliExitCode> for ExitCode {
    fn from(code: CliExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    integrations_path: PathBuf,
    source: Option<String>,
    query: Query,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let query = match env::var("PROPBRIDGE_QUERY") {
            Ok(text) => parse_query(&text)?,
            Err(_) => Query::None,
        };

        Ok(Self {
            integrations_path: env::var("PROPBRIDGE_INTEGRATIONS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_INTEGRATIONS_FILE)),
            source: env::var("PROPBRIDGE_SOURCE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            query,
            log_level: env::var("PROPBRIDGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.integrations_path.as_os_str().is_empty() {
            anyhow::bail!("PROPBRIDGE_INTEGRATIONS cannot be empty");
        }

        if parse_level(&self.log_level).is_none() {
            anyhow::bail!(
                "PROPBRIDGE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }
}

/// JSON object text becomes parameters, anything else SQL
fn parse_query(text: &str) -> Result<Query> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Query::None);
    }

    if text.starts_with('{') {
        let params: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("PROPBRIDGE_QUERY is not a valid JSON object: {}", e))?;
        return Ok(Query::Params(params));
    }

    Ok(Query::Sql(text.to_string()))
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CliExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CliExitCode::ConfigError.into();
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CliExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CliExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("propbridge error: {:#}", e);
                CliExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Load integrations, fetch once, print the rows
async fn run(config: Config) -> Result<CliExitCode> {
    let mut manager = propbridge::manager();

    let loaded = match load_integrations(&mut manager, &config.integrations_path).await {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{}", e);
            return Ok(CliExitCode::ConfigError);
        }
    };
    if manager.is_empty() {
        error!(
            "No integrations loaded from {}",
            config.integrations_path.display()
        );
        return Ok(CliExitCode::ConfigError);
    }
    info!("Loaded integrations: {}", loaded.join(", "));

    let source = config.source.as_deref();
    let outcome = manager.fetch(source, config.query).await;
    manager.close_all_connections().await;

    if let Some(diagnostic) = &outcome.diagnostic {
        error!("Fetch from {} failed: {}", source.unwrap_or("default integration"), diagnostic);
        return Ok(CliExitCode::RuntimeError);
    }

    let rows = serde_json::to_string_pretty(&outcome.table.to_json_value())?;
    println!("{}", rows);
    info!("Fetched {} rows", outcome.table.len());

    Ok(CliExitCode::Success)
}
