// # Database Data Source
//
// Reads and writes tables in a relational database through sqlx, holding a
// pool of the backend the driver selects (SQLite, Postgres or MySQL).
//
// ## Configuration
//
// Required: `connection_string`, `driver`.
//
// | Key | Meaning | Default |
// |---|---|---|
// | `driver` | `any`, `sqlite`, `postgres`, `mysql` (see [`DatabaseDriver`]) | |
// | `connection_string` | URL, file path or DSN, depending on the driver | |
// | `table` | table read when no SQL is given, and the push target | |
//
// An unknown driver is not a construction error: `connect` reports it and
// returns false, and every fetch or push on the source fails softly.
//
// ## Reads
//
// Result cells are decoded per backend type. Integers, floats, decimals,
// dates, timestamps, UUIDs, JSON and binary columns all come back as JSON
// values; a column type with no mapping fails the fetch with a decode
// diagnostic naming the column.
//
// ## Writes
//
// Push creates `table` when it does not exist, with column types taken from
// the first non-null value in each column, then inserts every row. Every
// driver except `sqlite` runs the inserts inside one transaction.

mod cell;
pub mod driver;

pub use driver::{DatabaseDriver, Dialect};

use async_trait::async_trait;
use propbridge_core::{
    Configuration, DataSource, DataSourceFactory, Error, FetchOutcome, PushOutcome, Query, Record,
    Result, SourceConfig, SourceKind, SourceRegistry, Table,
};
use serde_json::Value;
use sqlx::database::HasArguments;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query::Query as SqlQuery;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::cell::{decode_mysql_row, decode_postgres_row, decode_sqlite_row};

/// Pool of the backend a driver resolved to
enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl Pool {
    async fn connect(dialect: Dialect, url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = match dialect {
            Dialect::Sqlite => Pool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await?,
            ),
            Dialect::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await?,
            ),
            Dialect::MySql => Pool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await?,
            ),
        };
        Ok(pool)
    }

    async fn close(&self) {
        match self {
            Pool::Sqlite(pool) => pool.close().await,
            Pool::Postgres(pool) => pool.close().await,
            Pool::MySql(pool) => pool.close().await,
        }
    }
}

/// Open connection and the rules for talking to it
struct Connection {
    pool: Pool,
    driver: DatabaseDriver,
    dialect: Dialect,
}

/// Relational database data source
pub struct DatabaseSource {
    config: Configuration,
    connection: Option<Connection>,
}

// Custom Debug implementation that hides the connection string
impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSource")
            .field("config", &self.config.redacted())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

/// Run the CREATE and INSERT statements on one pool, inside a transaction
/// when `$transactional` is set
macro_rules! execute_writes {
    ($pool:expr, $transactional:expr, $create:expr, $statements:expr) => {{
        if $transactional {
            let mut tx = $pool.begin().await.map_err(database_error)?;
            sqlx::query($create)
                .execute(&mut *tx)
                .await
                .map_err(database_error)?;
            for (sql, binds) in $statements {
                bind_all(sqlx::query(sql), binds)
                    .execute(&mut *tx)
                    .await
                    .map_err(database_error)?;
            }
            tx.commit().await.map_err(database_error)?;
        } else {
            sqlx::query($create)
                .execute($pool)
                .await
                .map_err(database_error)?;
            for (sql, binds) in $statements {
                bind_all(sqlx::query(sql), binds)
                    .execute($pool)
                    .await
                    .map_err(database_error)?;
            }
        }
    }};
}

impl DatabaseSource {
    /// Create a database source over `config`
    ///
    /// # Errors
    ///
    /// A configuration error when `connection_string` or `driver` is absent.
    pub fn new(mut config: Configuration) -> Result<Self> {
        config.require(SourceKind::Database.required_fields().iter().copied());
        config.ensure_valid(SourceKind::Database.type_name())?;

        Ok(Self {
            config,
            connection: None,
        })
    }

    /// The configured driver name
    pub fn driver_name(&self) -> String {
        self.config.get_str("driver").unwrap_or_default()
    }

    async fn open(&self) -> Result<Connection> {
        let driver = DatabaseDriver::parse(&self.driver_name())?;
        let connection_string = self.config.get_str("connection_string").unwrap_or_default();
        let url = driver.connection_url(&connection_string)?;
        let dialect = driver.dialect(&url)?;

        let pool = Pool::connect(dialect, &url).await.map_err(|e| {
            Error::connection(format!("Failed to open {} connection: {}", driver, e))
        })?;

        tracing::debug!("Opened {} connection", driver);
        Ok(Connection {
            pool,
            driver,
            dialect,
        })
    }

    async fn connection(&mut self) -> Result<&Connection> {
        if self.connection.is_none() {
            self.connect().await;
        }
        self.connection
            .as_ref()
            .ok_or_else(|| Error::connection("Not connected to database"))
    }

    fn table(&self) -> Option<String> {
        self.config.get_str("table").filter(|table| !table.is_empty())
    }

    /// Run `sql`, or `SELECT * FROM table` when it is empty
    ///
    /// # Errors
    ///
    /// - no SQL and no `table` configured
    /// - the connection cannot be opened or the statement fails
    /// - a result column has a type with no JSON mapping
    pub async fn fetch_sql(&mut self, sql: Option<&str>) -> Result<Table> {
        let sql = match sql.map(str::trim).filter(|sql| !sql.is_empty()) {
            Some(sql) => sql.to_string(),
            None => {
                let table = self
                    .table()
                    .ok_or_else(|| Error::config("No query or table specified for fetch"))?;
                format!("SELECT * FROM {}", table)
            }
        };

        let connection = self.connection().await?;
        tracing::debug!("Running query on {}: {}", connection.driver, sql);

        let records = match &connection.pool {
            Pool::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map_err(database_error)?
                .iter()
                .map(decode_sqlite_row)
                .collect::<Result<Vec<Record>>>()?,
            Pool::Postgres(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map_err(database_error)?
                .iter()
                .map(decode_postgres_row)
                .collect::<Result<Vec<Record>>>()?,
            Pool::MySql(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map_err(database_error)?
                .iter()
                .map(decode_mysql_row)
                .collect::<Result<Vec<Record>>>()?,
        };

        Ok(Table::from_records(records))
    }

    /// Append the rows of `data` to the configured `table`
    ///
    /// # Errors
    ///
    /// - no `table` configured
    /// - the connection cannot be opened or a statement fails
    pub async fn insert_table(&mut self, data: &Table) -> Result<()> {
        let table = self
            .table()
            .ok_or_else(|| Error::config("No table specified for push"))?;
        if data.is_empty() {
            tracing::debug!("Nothing to insert into {}", table);
            return Ok(());
        }

        let connection = self.connection().await?;
        let columns = data.columns();
        let create = create_table_sql(connection.dialect, &table, &columns, data);
        let statements: Vec<(String, Vec<Bind>)> = data
            .rows()
            .iter()
            .map(|row| insert_sql(connection.dialect, &table, &columns, row))
            .collect();
        let transactional = connection.driver.commits();

        match &connection.pool {
            Pool::Sqlite(pool) => execute_writes!(pool, transactional, &create, &statements),
            Pool::Postgres(pool) => execute_writes!(pool, transactional, &create, &statements),
            Pool::MySql(pool) => execute_writes!(pool, transactional, &create, &statements),
        }

        tracing::info!("Inserted {} rows into {}", statements.len(), table);
        Ok(())
    }
}

#[async_trait]
impl DataSource for DatabaseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Database
    }

    fn config(&self) -> &Configuration {
        &self.config
    }

    fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn connect(&mut self) -> bool {
        match self.open().await {
            Ok(connection) => {
                self.connection = Some(connection);
                true
            }
            Err(e) => {
                tracing::error!("Error connecting to database: {}", e);
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.pool.close().await;
            tracing::debug!("Closed {} connection", connection.driver);
        }
    }

    async fn fetch(&mut self, query: Query) -> FetchOutcome {
        let result = match query {
            Query::None => self.fetch_sql(None).await,
            Query::Sql(sql) => self.fetch_sql(Some(&sql)).await,
            Query::Params(_) => Err(Error::unsupported("Database sources take SQL queries")),
        };
        FetchOutcome::from_result("Error fetching data from database", result)
    }

    async fn push(&mut self, data: &Table) -> PushOutcome {
        let result = self.insert_table(data).await;
        PushOutcome::from_result("Error pushing data to database", result)
    }
}

/// A value bound to an insert placeholder
#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Bind {
    /// `None` for null, which is written inline as `NULL`
    fn from_value(value: &Value) -> Option<Bind> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Bind::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Bind::Int(i),
                None => Bind::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Some(Bind::Text(s.clone())),
            other => Some(Bind::Text(other.to_string())),
        }
    }
}

fn bind_all<'q, DB>(
    mut query: SqlQuery<'q, DB, <DB as HasArguments<'q>>::Arguments>,
    binds: &'q [Bind],
) -> SqlQuery<'q, DB, <DB as HasArguments<'q>>::Arguments>
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for bind in binds {
        query = match bind {
            Bind::Int(i) => query.bind(*i),
            Bind::Float(f) => query.bind(*f),
            Bind::Bool(b) => query.bind(*b),
            Bind::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

/// Column type for `column`, from its first non-null value
fn column_type(data: &Table, column: &str) -> &'static str {
    let first = data
        .rows()
        .iter()
        .filter_map(|row| row.get(column))
        .find(|value| !value.is_null());

    match first {
        Some(Value::Number(n)) if n.is_i64() => "BIGINT",
        Some(Value::Number(_)) => "DOUBLE PRECISION",
        Some(Value::Bool(_)) => "BOOLEAN",
        _ => "TEXT",
    }
}

fn create_table_sql(dialect: Dialect, table: &str, columns: &[String], data: &Table) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .map(|column| format!("{} {}", dialect.quote(column), column_type(data, column)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        definitions.join(", ")
    )
}

/// INSERT statement for one row; absent and null cells become `NULL`
fn insert_sql(
    dialect: Dialect,
    table: &str,
    columns: &[String],
    row: &Record,
) -> (String, Vec<Bind>) {
    let mut binds = Vec::new();
    let mut values = Vec::with_capacity(columns.len());

    for column in columns {
        match row.get(column).and_then(Bind::from_value) {
            Some(bind) => {
                binds.push(bind);
                values.push(dialect.placeholder(binds.len()));
            }
            None => values.push("NULL".to_string()),
        }
    }

    let names: Vec<String> = columns.iter().map(|column| dialect.quote(column)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(", "),
        values.join(", ")
    );
    (sql, binds)
}

fn database_error(err: sqlx::Error) -> Error {
    Error::database(err.to_string())
}

/// Factory for creating database sources
pub struct DatabaseFactory;

impl DataSourceFactory for DatabaseFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn DataSource>> {
        match config {
            SourceConfig::Database { .. } => Ok(Box::new(DatabaseSource::new(
                config.clone().into_configuration(),
            )?)),
            other => Err(Error::config(format!(
                "Database factory cannot build a {} source",
                other.type_name()
            ))),
        }
    }
}

/// Register the database source with a registry
pub fn register(registry: &mut SourceRegistry) {
    registry.register(SourceKind::Database.type_name(), Box::new(DatabaseFactory));
}
